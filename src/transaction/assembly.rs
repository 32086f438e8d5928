//! Building signed transactions from explicit inputs or a genesis allocation.
//!
//! Assembly does not look at chain state: whether the inputs exist and are
//! spendable by the signing key is the caller's concern. There is no change
//! output and no fee computation.

use super::types::{NonEmpty, Tx, TxAux, TxIn, TxInWitness, TxOut};
use crate::crypto::{Address, ProtocolMagic, SignTag, SigningKey};
use crate::error::Result;
use tracing::debug;

fn sign_tx(magic: ProtocolMagic, tx: Tx, key: &SigningKey) -> Result<TxAux> {
    let id = tx.id()?;
    let witness = TxInWitness {
        verification_key: key.verification_key(),
        signature: key.sign(SignTag::Tx, magic.id, id.as_bytes()),
    };
    let witnesses = vec![witness; tx.inputs.len()];
    debug!(
        "Assembled tx {} with {} inputs, {} outputs",
        id,
        tx.inputs.len(),
        tx.outputs.len()
    );
    let aux = TxAux { tx, witnesses };
    aux.validate_size()?;
    Ok(aux)
}

/// Spends the genesis UTxO of `genesis_address`, signed by its owner.
pub fn assemble_genesis_expenditure(
    magic: ProtocolMagic,
    genesis_address: &Address,
    owner: &SigningKey,
    outputs: NonEmpty<TxOut>,
) -> Result<TxAux> {
    let tx = Tx {
        inputs: NonEmpty::singleton(TxIn::genesis(genesis_address)),
        outputs,
    };
    sign_tx(magic, tx, owner)
}

/// Spends `inputs`, all assumed to belong to `underwriter`.
pub fn assemble_expenditure(
    magic: ProtocolMagic,
    inputs: NonEmpty<TxIn>,
    outputs: NonEmpty<TxOut>,
    underwriter: &SigningKey,
) -> Result<TxAux> {
    sign_tx(magic, Tx { inputs, outputs }, underwriter)
}
