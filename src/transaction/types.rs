/// Transaction types: inputs, outputs, witnesses and the on-disk tx file
use crate::crypto::{sha256, Address, ProtocolMagic, SignTag, Signature, VerificationKey};
use crate::error::{CliError, Result};
use crate::persistence::{InputFile, TxFile};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Upper bound on any single amount: the total supply.
pub const MAX_LOVELACE: u64 = 45_000_000_000_000_000;

/// A sequence with at least one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmpty<T>(Vec<T>);

impl<T> NonEmpty<T> {
    pub fn new(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(NonEmpty(items))
        }
    }

    pub fn singleton(item: T) -> Self {
        NonEmpty(vec![item])
    }

    pub fn first(&self) -> &T {
        &self.0[0]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<'a, T> IntoIterator for &'a NonEmpty<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: Serialize> Serialize for NonEmpty<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NonEmpty<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        NonEmpty::new(items).ok_or_else(|| de::Error::custom("expected at least one element"))
    }
}

/// An amount of the chain's base currency unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lovelace(pub u64);

impl Lovelace {
    pub fn new(amount: u64) -> Result<Self> {
        if amount > MAX_LOVELACE {
            return Err(CliError::Serialization(format!(
                "Amount {} exceeds the maximum of {}",
                amount, MAX_LOVELACE
            )));
        }
        Ok(Lovelace(amount))
    }

    pub fn checked_add(self, other: Lovelace) -> Option<Lovelace> {
        self.0
            .checked_add(other.0)
            .filter(|sum| *sum <= MAX_LOVELACE)
            .map(Lovelace)
    }
}

impl fmt::Display for Lovelace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TxId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for TxId {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CliError::Serialization(format!("Invalid hex transaction id: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CliError::Serialization(format!("Transaction id must be 32 bytes, got {}", v.len()))
        })?;
        Ok(TxId(bytes))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A reference to an unspent output: `<txid hex>#<index>` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxIn {
    pub tx_id: TxId,
    pub index: u32,
}

impl TxIn {
    /// The input standing for the genesis allocation of `address`.
    pub fn genesis(address: &Address) -> Self {
        TxIn {
            tx_id: TxId(sha256(&[b"genesis-utxo", address.as_bytes()])),
            index: 0,
        }
    }
}

impl FromStr for TxIn {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        let (tx_id, index) = s.split_once('#').ok_or_else(|| {
            CliError::Serialization(format!("Expected <txid>#<index>, got '{}'", s))
        })?;
        let index = index
            .parse()
            .map_err(|e| CliError::Serialization(format!("Invalid input index '{}': {}", index, e)))?;
        Ok(TxIn {
            tx_id: tx_id.parse()?,
            index,
        })
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// A new output: `<address hex>+<amount>` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: Address,
    pub amount: Lovelace,
}

impl FromStr for TxOut {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        let (address, amount) = s.split_once('+').ok_or_else(|| {
            CliError::Serialization(format!("Expected <address>+<amount>, got '{}'", s))
        })?;
        let amount: u64 = amount
            .parse()
            .map_err(|e| CliError::Serialization(format!("Invalid amount '{}': {}", amount, e)))?;
        Ok(TxOut {
            address: address.parse()?,
            amount: Lovelace::new(amount)?,
        })
    }
}

impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.address, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub inputs: NonEmpty<TxIn>,
    pub outputs: NonEmpty<TxOut>,
}

impl Tx {
    /// Hash of the bincode encoding; what witnesses sign.
    pub fn id(&self) -> Result<TxId> {
        let bytes = bincode::serialize(self)?;
        Ok(TxId(sha256(&[&bytes])))
    }

    pub fn total_output(&self) -> Option<Lovelace> {
        self.outputs
            .iter()
            .try_fold(Lovelace::default(), |acc, out| acc.checked_add(out.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInWitness {
    pub verification_key: VerificationKey,
    pub signature: Signature,
}

/// A transaction together with one witness per input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAux {
    pub tx: Tx,
    pub witnesses: Vec<TxInWitness>,
}

impl TxAux {
    /// Checks that every input carries a witness whose signature covers the tx id.
    pub fn verify_witnesses(&self, magic: ProtocolMagic) -> Result<()> {
        if self.witnesses.len() != self.tx.inputs.len() {
            return Err(CliError::Crypto(format!(
                "Transaction has {} inputs but {} witnesses",
                self.tx.inputs.len(),
                self.witnesses.len()
            )));
        }
        let id = self.tx.id()?;
        for witness in &self.witnesses {
            witness
                .verification_key
                .verify(SignTag::Tx, magic.id, id.as_bytes(), &witness.signature)?;
        }
        Ok(())
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<()> {
        let size = bincode::serialized_size(self)? as usize;
        if size > MAX_TRANSACTION_SIZE {
            return Err(CliError::Serialization(format!(
                "Transaction too large: {} bytes (max: {})",
                size, MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

/// Encoder for tx files, suitable for [`crate::persistence::ensure_new_file`].
pub fn encode_tx(tx: &TxAux) -> Result<Vec<u8>> {
    tx.validate_size()?;
    Ok(bincode::serialize(tx)?)
}

pub fn decode_tx(bytes: &[u8]) -> Result<TxAux> {
    if bytes.len() > MAX_TRANSACTION_SIZE {
        return Err(CliError::Serialization(format!(
            "Transaction file too large: {} bytes (max: {})",
            bytes.len(),
            MAX_TRANSACTION_SIZE
        )));
    }
    bincode::deserialize(bytes)
        .map_err(|e| CliError::Serialization(format!("Invalid transaction file: {}", e)))
}

pub fn read_tx(file: &TxFile) -> Result<TxAux> {
    decode_tx(&file.read_bytes()?)
}
