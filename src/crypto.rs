//! Cryptographic primitives: secp256k1 keys, tagged signatures, addresses

use crate::error::CliError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa, All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub type Sha256Hash = [u8; 32];

/// Length of a stakeholder id (a truncated verification-key hash).
pub const STAKEHOLDER_ID_SIZE: usize = 28;

/// SHA-256 over the concatenation of `parts`.
pub fn sha256(parts: &[&[u8]]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// Protocol and network magic
// ---------------------------------------------------------------------------

/// Whether addresses on this chain embed the network magic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequiresNetworkMagic {
    #[default]
    RequiresNoMagic,
    RequiresMagic,
}

impl FromStr for RequiresNetworkMagic {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RequiresNoMagic" | "no-magic" => Ok(RequiresNetworkMagic::RequiresNoMagic),
            "RequiresMagic" | "magic" => Ok(RequiresNetworkMagic::RequiresMagic),
            other => Err(CliError::Config(format!(
                "unknown network magic requirement '{}'",
                other
            ))),
        }
    }
}

/// Identifies a chain instance; mixed into every signature to prevent
/// cross-network replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolMagic {
    pub id: u32,
    pub requires_network_magic: RequiresNetworkMagic,
}

impl ProtocolMagic {
    pub fn new(id: u32, requires_network_magic: RequiresNetworkMagic) -> Self {
        ProtocolMagic {
            id,
            requires_network_magic,
        }
    }

    pub fn network_magic(&self) -> NetworkMagic {
        match self.requires_network_magic {
            RequiresNetworkMagic::RequiresNoMagic => NetworkMagic::NetworkMainOrStage,
            RequiresNetworkMagic::RequiresMagic => NetworkMagic::NetworkTestnet(self.id),
        }
    }
}

/// The network discriminant embedded in addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMagic {
    NetworkMainOrStage,
    NetworkTestnet(u32),
}

impl NetworkMagic {
    fn address_attribute(&self) -> Vec<u8> {
        match self {
            NetworkMagic::NetworkMainOrStage => vec![0],
            NetworkMagic::NetworkTestnet(id) => {
                let mut bytes = vec![1];
                bytes.extend_from_slice(&id.to_le_bytes());
                bytes
            }
        }
    }
}

/// Domain separation for signed payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignTag {
    Tx,
    ProxyVk,
}

impl SignTag {
    fn prefix(&self) -> u8 {
        match self {
            SignTag::Tx => 0x01,
            SignTag::ProxyVk => 0x09,
        }
    }
}

fn signing_message(tag: SignTag, magic: u32, payload: &[u8]) -> Message {
    let digest = sha256(&[&[tag.prefix()], &magic.to_le_bytes(), payload]);
    Message::from_digest(digest)
}

// ---------------------------------------------------------------------------
// Signing key
// ---------------------------------------------------------------------------

/// Private key material. Not `Serialize`; `Debug` is redacted.
#[derive(Clone)]
pub struct SigningKey {
    secret: SecretKey,
}

impl SigningKey {
    /// Generates a new random key using the OS random number generator.
    pub fn generate() -> Self {
        Self::from_rng(&mut OsRng)
    }

    /// Generates a key from the supplied RNG (seeded generation for genesis).
    pub fn from_rng<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        SigningKey {
            secret: SecretKey::new(rng),
        }
    }

    /// Creates a key from raw secret key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CliError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CliError::KeyDeserialization(format!(
                "Secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid secret key bytes: {}", e)))?;
        Ok(SigningKey { secret })
    }

    /// Raw secret bytes, for the persistence formats only.
    pub(crate) fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret.secret_bytes()
    }

    pub fn verification_key(&self) -> VerificationKey {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &self.secret);
        VerificationKey(public_key.serialize())
    }

    /// Signs `payload` under `tag` and protocol magic `magic` (RFC 6979, deterministic).
    pub fn sign(&self, tag: SignTag, magic: u32, payload: &[u8]) -> Signature {
        let message = signing_message(tag, magic, payload);
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret);
        Signature(signature.serialize_compact())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<private>)")
    }
}

// ---------------------------------------------------------------------------
// Verification key
// ---------------------------------------------------------------------------

/// A compressed secp256k1 public key; always a valid curve point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerificationKey([u8; PUBLIC_KEY_SIZE]);

impl VerificationKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CliError> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CliError::KeyDeserialization(format!(
                "Verification key must be exactly {} bytes (compressed), got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        let public_key = PublicKey::from_slice(bytes)
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid verification key: {}", e)))?;
        Ok(VerificationKey(public_key.serialize()))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CliError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid hex verification key: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Truncated hash identifying this key as a stakeholder.
    pub fn stakeholder_id(&self) -> StakeholderId {
        let digest = sha256(&[&self.0]);
        let mut id = [0u8; STAKEHOLDER_ID_SIZE];
        id.copy_from_slice(&digest[..STAKEHOLDER_ID_SIZE]);
        StakeholderId(id)
    }

    /// Verifies a signature produced by [`SigningKey::sign`] with the same tag and magic.
    pub fn verify(
        &self,
        tag: SignTag,
        magic: u32,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<(), CliError> {
        let public_key = PublicKey::from_slice(&self.0)
            .map_err(|e| CliError::Crypto(format!("Invalid verification key: {}", e)))?;
        let signature = ecdsa::Signature::from_compact(&signature.0)
            .map_err(|e| CliError::Crypto(format!("Invalid signature: {}", e)))?;
        let message = signing_message(tag, magic, payload);
        SECP256K1_CONTEXT
            .verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| CliError::Crypto("Signature verification failed".to_string()))
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({}...)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A compact ECDSA signature. Not validated on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; COMPACT_SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; COMPACT_SIGNATURE_SIZE]) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMPACT_SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CliError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CliError::Serialization(format!("Invalid hex signature: {}", e)))?;
        let bytes: [u8; COMPACT_SIGNATURE_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            CliError::Serialization(format!(
                "Signature must be exactly {} bytes (compact), got {}",
                COMPACT_SIGNATURE_SIZE,
                v.len()
            ))
        })?;
        Ok(Signature(bytes))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..4]))
    }
}

// ---------------------------------------------------------------------------
// Address and stakeholder id
// ---------------------------------------------------------------------------

/// A spending address: hash of the owner's verification key and network attribute.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub fn from_verification_key(vk: &VerificationKey, network: NetworkMagic) -> Self {
        Address(sha256(&[b"addr", vk.as_bytes(), &network.address_attribute()]))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CliError::Crypto(format!("Invalid hex address: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CliError::Crypto(format!("Address must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Address(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StakeholderId([u8; STAKEHOLDER_ID_SIZE]);

impl StakeholderId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for StakeholderId {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CliError::Crypto(format!("Invalid hex stakeholder id: {}", e)))?;
        let bytes: [u8; STAKEHOLDER_ID_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            CliError::Crypto(format!(
                "Stakeholder id must be {} bytes, got {}",
                STAKEHOLDER_ID_SIZE,
                v.len()
            ))
        })?;
        Ok(StakeholderId(bytes))
    }
}

impl fmt::Debug for StakeholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StakeholderId({})", self.to_hex())
    }
}

impl fmt::Display for StakeholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serde as a hex string, for map keys and JSON readability.
macro_rules! hex_string_serde {
    ($ty:ty, $parse:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $parse(s.as_str()).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_string_serde!(VerificationKey, VerificationKey::from_hex);
hex_string_serde!(Signature, Signature::from_hex);
hex_string_serde!(Address, Address::from_str);
hex_string_serde!(StakeholderId, StakeholderId::from_str);

// ---------------------------------------------------------------------------
// Terminal rendering
// ---------------------------------------------------------------------------

pub fn render_verification_key(vk: &VerificationKey) -> String {
    vk.to_hex()
}

pub fn render_verification_key_base64(vk: &VerificationKey) -> String {
    BASE64.encode(vk.as_bytes())
}

pub fn render_address(address: &Address) -> String {
    address.to_hex()
}

pub fn render_hash(hash: &Sha256Hash) -> String {
    hex::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 633343913;

    #[test]
    fn test_key_generation() {
        let key = SigningKey::generate();
        assert_eq!(key.verification_key().as_bytes().len(), PUBLIC_KEY_SIZE);
        assert_eq!(key.to_bytes().len(), SECRET_KEY_SIZE);
    }

    #[test]
    fn test_verification_key_is_stable() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key.verification_key(), key.verification_key());
        assert_eq!(key.verification_key(), restored.verification_key());
    }

    #[test]
    fn test_signing_and_verification() {
        let key = SigningKey::generate();
        let payload = b"Hello, delegate!";

        let signature = key.sign(SignTag::Tx, MAGIC, payload);
        let result = key
            .verification_key()
            .verify(SignTag::Tx, MAGIC, payload, &signature);
        assert!(result.is_ok());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = SigningKey::generate();
        let a = key.sign(SignTag::ProxyVk, MAGIC, b"payload");
        let b = key.sign(SignTag::ProxyVk, MAGIC, b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn test_tag_and_magic_are_bound() {
        let key = SigningKey::generate();
        let vk = key.verification_key();
        let signature = key.sign(SignTag::Tx, MAGIC, b"payload");

        assert!(vk.verify(SignTag::ProxyVk, MAGIC, b"payload", &signature).is_err());
        assert!(vk.verify(SignTag::Tx, MAGIC + 1, b"payload", &signature).is_err());
        assert!(vk.verify(SignTag::Tx, MAGIC, b"tampered", &signature).is_err());
    }

    #[test]
    fn test_invalid_signature_with_other_key() {
        let key1 = SigningKey::generate();
        let key2 = SigningKey::generate();
        let signature = key1.sign(SignTag::Tx, MAGIC, b"Test message");

        let result = key2
            .verification_key()
            .verify(SignTag::Tx, MAGIC, b"Test message", &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_from_bytes_invalid_length() {
        let short_bytes = [0u8; SECRET_KEY_SIZE - 1];
        let result = SigningKey::from_bytes(&short_bytes);
        assert!(result.unwrap_err().to_string().contains("Secret key must be"));

        let result = VerificationKey::from_bytes(&[2u8; PUBLIC_KEY_SIZE - 1]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Verification key must be exactly"));
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let key = SigningKey::generate();
        let debug = format!("{:?}", key);
        assert_eq!(debug, "SigningKey(<private>)");
        assert!(!debug.contains(&hex::encode(key.to_bytes())));
    }

    #[test]
    fn test_address_depends_on_network_magic() {
        let vk = SigningKey::generate().verification_key();
        let mainnet = Address::from_verification_key(&vk, NetworkMagic::NetworkMainOrStage);
        let testnet = Address::from_verification_key(&vk, NetworkMagic::NetworkTestnet(42));
        assert_ne!(mainnet, testnet);

        let parsed: Address = mainnet.to_hex().parse().unwrap();
        assert_eq!(parsed, mainnet);
        assert!("abcd".parse::<Address>().is_err());
    }

    #[test]
    fn test_protocol_magic_selects_network() {
        let no_magic = ProtocolMagic::new(7, RequiresNetworkMagic::RequiresNoMagic);
        let magic = ProtocolMagic::new(7, RequiresNetworkMagic::RequiresMagic);
        assert_eq!(no_magic.network_magic(), NetworkMagic::NetworkMainOrStage);
        assert_eq!(magic.network_magic(), NetworkMagic::NetworkTestnet(7));
    }

    #[test]
    fn test_verification_key_json_is_hex_string() {
        let vk = SigningKey::generate().verification_key();
        let json = serde_json::to_string(&vk).unwrap();
        assert_eq!(json.len(), PUBLIC_KEY_SIZE * 2 + 2);
        let back: VerificationKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vk);
    }

    #[test]
    fn test_render_helpers() {
        let vk = SigningKey::generate().verification_key();
        assert_eq!(render_verification_key(&vk), vk.to_hex());
        assert_eq!(
            BASE64.decode(render_verification_key_base64(&vk)).unwrap(),
            vk.as_bytes().to_vec()
        );
        assert_eq!(render_hash(&[0xab; 32]), "ab".repeat(32));
    }
}
