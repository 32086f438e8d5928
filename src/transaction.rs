//! Transaction module split into types and assembly

pub mod assembly;
pub mod types;

pub use assembly::{assemble_expenditure, assemble_genesis_expenditure};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Address, NetworkMagic, ProtocolMagic, RequiresNetworkMagic, SigningKey};
    use crate::error::CliError;

    const MAGIC: ProtocolMagic = ProtocolMagic {
        id: 764824073,
        requires_network_magic: RequiresNetworkMagic::RequiresNoMagic,
    };

    fn address_of(key: &SigningKey) -> Address {
        Address::from_verification_key(&key.verification_key(), NetworkMagic::NetworkMainOrStage)
    }

    fn outputs(amounts: &[u64]) -> NonEmpty<TxOut> {
        let recipient = address_of(&SigningKey::generate());
        NonEmpty::new(
            amounts
                .iter()
                .map(|a| TxOut {
                    address: recipient,
                    amount: Lovelace(*a),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_non_empty_rejects_empty() {
        assert!(NonEmpty::<u8>::new(vec![]).is_none());
        let one = NonEmpty::new(vec![7u8]).unwrap();
        assert_eq!(*one.first(), 7);
        assert_eq!(one.len(), 1);

        let err = serde_json::from_str::<NonEmpty<u8>>("[]");
        assert!(err.is_err());
        let ok: NonEmpty<u8> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(ok.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_parse_tx_in_and_out() {
        let id = "ab".repeat(32);
        let input: TxIn = format!("{}#3", id).parse().unwrap();
        assert_eq!(input.index, 3);
        assert_eq!(input.to_string(), format!("{}#3", id));
        assert!("nohash".parse::<TxIn>().is_err());
        assert!(format!("{}#x", id).parse::<TxIn>().is_err());

        let address = address_of(&SigningKey::generate());
        let output: TxOut = format!("{}+1000", address).parse().unwrap();
        assert_eq!(output.amount, Lovelace(1000));
        assert_eq!(output.address, address);
        assert!(format!("{}+{}", address, MAX_LOVELACE + 1)
            .parse::<TxOut>()
            .is_err());
    }

    #[test]
    fn test_genesis_expenditure_spends_genesis_input() {
        let owner = SigningKey::generate();
        let address = address_of(&owner);
        let tx = assemble_genesis_expenditure(MAGIC, &address, &owner, outputs(&[10, 20])).unwrap();

        assert_eq!(tx.tx.inputs.as_slice(), &[TxIn::genesis(&address)]);
        assert_eq!(tx.tx.total_output(), Some(Lovelace(30)));
        assert_eq!(tx.witnesses.len(), 1);
        assert!(tx.verify_witnesses(MAGIC).is_ok());
    }

    #[test]
    fn test_expenditure_has_one_witness_per_input() {
        let underwriter = SigningKey::generate();
        let inputs = NonEmpty::new(vec![
            TxIn {
                tx_id: TxId::from_bytes([1; 32]),
                index: 0,
            },
            TxIn {
                tx_id: TxId::from_bytes([2; 32]),
                index: 5,
            },
        ])
        .unwrap();

        let tx = assemble_expenditure(MAGIC, inputs, outputs(&[1]), &underwriter).unwrap();
        assert_eq!(tx.witnesses.len(), 2);
        assert!(tx
            .witnesses
            .iter()
            .all(|w| w.verification_key == underwriter.verification_key()));
        assert!(tx.verify_witnesses(MAGIC).is_ok());

        let other = ProtocolMagic::new(MAGIC.id + 1, RequiresNetworkMagic::RequiresNoMagic);
        assert!(tx.verify_witnesses(other).is_err());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let owner = SigningKey::generate();
        let address = address_of(&owner);
        let outs = outputs(&[5, 6, 7]);

        let a = assemble_genesis_expenditure(MAGIC, &address, &owner, outs.clone()).unwrap();
        let b = assemble_genesis_expenditure(MAGIC, &address, &owner, outs).unwrap();
        assert_eq!(encode_tx(&a).unwrap(), encode_tx(&b).unwrap());
    }

    #[test]
    fn test_oversized_tx_file_is_rejected() {
        let bytes = vec![0u8; MAX_TRANSACTION_SIZE + 1];
        match decode_tx(&bytes) {
            Err(CliError::Serialization(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected Serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_tx_file_decodes_to_same_tx() {
        let owner = SigningKey::generate();
        let tx = assemble_genesis_expenditure(MAGIC, &address_of(&owner), &owner, outputs(&[1]))
            .unwrap();
        let decoded = decode_tx(&encode_tx(&tx).unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.tx.id().unwrap(), tx.tx.id().unwrap());
    }
}
