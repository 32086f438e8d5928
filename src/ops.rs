//! Protocol capability providers
//!
//! Everything that differs between protocol versions sits behind [`CliOps`]:
//! the persisted signing-key and delegation-certificate formats and network
//! submission. The dispatcher resolves one provider per command with
//! [`decide_cli_ops`] and stays protocol-agnostic otherwise.

use crate::config::ChainConfig;
use crate::crypto::{SigningKey, VerificationKey};
use crate::delegation::Certificate;
use crate::error::{CliError, Result};
use crate::keys::{EncodedSigningKey, EncryptedSigningKey, ProtectedSigningKey};
use crate::network::{self, Topology};
use crate::transaction::{TxAux, TxId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol identifiers understood on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    ByronLegacy,
    #[default]
    RealPbft,
    Bft,
    MockPbft,
    Praos,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::ByronLegacy => "byron-legacy",
            Protocol::RealPbft => "real-pbft",
            Protocol::Bft => "bft",
            Protocol::MockPbft => "mock-pbft",
            Protocol::Praos => "praos",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "byron-legacy" => Ok(Protocol::ByronLegacy),
            "real-pbft" => Ok(Protocol::RealPbft),
            "bft" => Ok(Protocol::Bft),
            "mock-pbft" => Ok(Protocol::MockPbft),
            "praos" => Ok(Protocol::Praos),
            other => Err(CliError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Protocol-specific serialization and submission.
pub trait CliOps {
    fn protocol(&self) -> Protocol;

    fn serialise_signing_key(&self, key: &ProtectedSigningKey) -> Result<Vec<u8>>;

    fn deserialise_signing_key(&self, bytes: &[u8]) -> Result<EncodedSigningKey>;

    fn serialise_delegation_cert(&self, cert: &Certificate) -> Result<Vec<u8>>;

    fn deserialise_delegation_cert(&self, bytes: &[u8]) -> Result<Certificate>;

    /// Sends a transaction to the first producer in `topology`.
    fn submit_tx(&self, topology: &Topology, config: &ChainConfig, tx: &TxAux) -> Result<TxId> {
        network::submit_transaction(self.protocol(), topology, config.protocol_magic, tx)
    }
}

/// Resolves the provider for `protocol`. Pure: the same identifier always
/// yields an equivalent provider.
pub fn decide_cli_ops(protocol: Protocol) -> Result<Box<dyn CliOps>> {
    match protocol {
        Protocol::ByronLegacy => Ok(Box::new(ByronLegacyOps)),
        Protocol::RealPbft => Ok(Box::new(RealPbftOps)),
        Protocol::Bft | Protocol::MockPbft | Protocol::Praos => {
            Err(CliError::UnsupportedProtocol(protocol.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// byron-legacy: compact bincode formats
// ---------------------------------------------------------------------------

const LEGACY_KEY_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
enum LegacySecret {
    Plain(Vec<u8>),
    Encrypted(EncryptedSigningKey),
}

#[derive(Serialize, Deserialize)]
struct LegacyKeyFile {
    version: u32,
    secret: LegacySecret,
}

pub struct ByronLegacyOps;

impl CliOps for ByronLegacyOps {
    fn protocol(&self) -> Protocol {
        Protocol::ByronLegacy
    }

    fn serialise_signing_key(&self, key: &ProtectedSigningKey) -> Result<Vec<u8>> {
        let secret = match EncodedSigningKey::seal(key)? {
            EncodedSigningKey::Plain(key) => LegacySecret::Plain(key.to_bytes().to_vec()),
            EncodedSigningKey::Encrypted(sealed) => LegacySecret::Encrypted(sealed),
        };
        Ok(bincode::serialize(&LegacyKeyFile {
            version: LEGACY_KEY_VERSION,
            secret,
        })?)
    }

    fn deserialise_signing_key(&self, bytes: &[u8]) -> Result<EncodedSigningKey> {
        let file: LegacyKeyFile = bincode::deserialize(bytes)
            .map_err(|e| CliError::KeyDeserialization(format!("Not a legacy key file: {}", e)))?;
        if file.version != LEGACY_KEY_VERSION {
            return Err(CliError::KeyDeserialization(format!(
                "Unknown legacy key version {}",
                file.version
            )));
        }
        match file.secret {
            LegacySecret::Plain(bytes) => Ok(EncodedSigningKey::Plain(SigningKey::from_bytes(&bytes)?)),
            LegacySecret::Encrypted(sealed) => Ok(EncodedSigningKey::Encrypted(sealed)),
        }
    }

    fn serialise_delegation_cert(&self, cert: &Certificate) -> Result<Vec<u8>> {
        Ok(bincode::serialize(cert)?)
    }

    fn deserialise_delegation_cert(&self, bytes: &[u8]) -> Result<Certificate> {
        bincode::deserialize(bytes)
            .map_err(|e| CliError::Serialization(format!("Invalid delegation certificate: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// real-pbft: JSON envelopes
// ---------------------------------------------------------------------------

const SIGNING_KEY_TYPE: &str = "PBftSigningKey";

#[derive(Serialize, Deserialize)]
struct SigningKeyEnvelope {
    #[serde(rename = "type")]
    kind: String,
    verification_key: VerificationKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted: Option<EncryptedSigningKey>,
}

pub struct RealPbftOps;

impl CliOps for RealPbftOps {
    fn protocol(&self) -> Protocol {
        Protocol::RealPbft
    }

    fn serialise_signing_key(&self, key: &ProtectedSigningKey) -> Result<Vec<u8>> {
        let envelope = match EncodedSigningKey::seal(key)? {
            EncodedSigningKey::Plain(key) => SigningKeyEnvelope {
                kind: SIGNING_KEY_TYPE.to_string(),
                verification_key: key.verification_key(),
                secret: Some(hex::encode(key.to_bytes())),
                encrypted: None,
            },
            EncodedSigningKey::Encrypted(sealed) => SigningKeyEnvelope {
                kind: SIGNING_KEY_TYPE.to_string(),
                verification_key: sealed.verification_key,
                secret: None,
                encrypted: Some(sealed),
            },
        };
        let mut bytes = serde_json::to_vec_pretty(&envelope)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialise_signing_key(&self, bytes: &[u8]) -> Result<EncodedSigningKey> {
        let envelope: SigningKeyEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| CliError::KeyDeserialization(format!("Not a signing key envelope: {}", e)))?;
        if envelope.kind != SIGNING_KEY_TYPE {
            return Err(CliError::KeyDeserialization(format!(
                "Expected key type {}, found {}",
                SIGNING_KEY_TYPE, envelope.kind
            )));
        }

        match (envelope.secret, envelope.encrypted) {
            (Some(secret), None) => {
                let bytes = hex::decode(secret.trim())
                    .map_err(|e| CliError::KeyDeserialization(format!("Invalid hex secret: {}", e)))?;
                let key = SigningKey::from_bytes(&bytes)?;
                if key.verification_key() != envelope.verification_key {
                    return Err(CliError::KeyDeserialization(
                        "Secret does not match the envelope's verification key".to_string(),
                    ));
                }
                Ok(EncodedSigningKey::Plain(key))
            }
            (None, Some(sealed)) => {
                if sealed.verification_key != envelope.verification_key {
                    return Err(CliError::KeyDeserialization(
                        "Sealed key does not match the envelope's verification key".to_string(),
                    ));
                }
                Ok(EncodedSigningKey::Encrypted(sealed))
            }
            _ => Err(CliError::KeyDeserialization(
                "Envelope must carry exactly one of 'secret' or 'encrypted'".to_string(),
            )),
        }
    }

    fn serialise_delegation_cert(&self, cert: &Certificate) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(cert)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialise_delegation_cert(&self, bytes: &[u8]) -> Result<Certificate> {
        serde_json::from_slice(bytes)
            .map_err(|e| CliError::Serialization(format!("Invalid delegation certificate: {}", e)))
    }
}
