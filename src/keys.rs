//! Signing and verification key operations
//!
//! Signing keys are persisted through a [`CliOps`] provider, which owns the
//! on-disk format. A key may be passphrase-protected: the secret is sealed
//! with AES-256-GCM under an Argon2id-derived key, and the verification key
//! is kept in the clear so it can be checked after unlocking.

use crate::crypto::{SigningKey, VerificationKey};
use crate::error::{CliError, Result};
use crate::ops::CliOps;
use crate::persistence::{InputFile, SigningKeyFile, VerificationKeyFile};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;

/// Environment variable consulted by the binary for a non-interactive passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "CHAIN_CLI_PASSPHRASE";

/// A passphrase held in memory for the duration of one command.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Passphrase(passphrase.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// What the operator asked for on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseRequirement {
    EmptyPassphrase,
    GetPassphrase,
}

/// How a signing key is protected at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassphrasePolicy {
    Empty,
    Protected(Passphrase),
}

/// A signing key together with the protection it is stored under.
#[derive(Debug, Clone)]
pub struct ProtectedSigningKey {
    pub key: SigningKey,
    pub protection: PassphrasePolicy,
}

impl ProtectedSigningKey {
    pub fn unprotected(key: SigningKey) -> Self {
        ProtectedSigningKey {
            key,
            protection: PassphrasePolicy::Empty,
        }
    }
}

/// A signing key as decoded from disk, before any unlocking.
#[derive(Debug, Clone)]
pub enum EncodedSigningKey {
    Plain(SigningKey),
    Encrypted(EncryptedSigningKey),
}

impl EncodedSigningKey {
    /// Encodes a protected key, sealing it when a passphrase is set.
    pub fn seal(key: &ProtectedSigningKey) -> Result<Self> {
        match &key.protection {
            PassphrasePolicy::Empty => Ok(EncodedSigningKey::Plain(key.key.clone())),
            PassphrasePolicy::Protected(passphrase) => Ok(EncodedSigningKey::Encrypted(
                EncryptedSigningKey::seal(&key.key, passphrase)?,
            )),
        }
    }
}

/// A passphrase-sealed signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSigningKey {
    pub verification_key: VerificationKey,
    /// hex
    pub salt: String,
    /// hex
    pub nonce: String,
    /// base64
    pub ciphertext: String,
}

impl EncryptedSigningKey {
    pub fn seal(key: &SigningKey, passphrase: &Passphrase) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let cipher = cipher_for(passphrase, &salt)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), key.to_bytes().as_slice())
            .map_err(|_| CliError::Crypto("Failed to encrypt signing key".to_string()))?;

        Ok(EncryptedSigningKey {
            verification_key: key.verification_key(),
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    pub fn open(&self, passphrase: &Passphrase) -> Result<SigningKey> {
        let salt = hex::decode(&self.salt)
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid salt: {}", e)))?;
        let nonce = hex::decode(&self.nonce)
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid nonce: {}", e)))?;
        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|e| CliError::KeyDeserialization(format!("Invalid ciphertext: {}", e)))?;
        if salt.len() != SALT_SIZE || nonce.len() != NONCE_SIZE {
            return Err(CliError::KeyDeserialization(
                "Malformed encrypted key parameters".to_string(),
            ));
        }

        let cipher = cipher_for(passphrase, &salt)?;
        let secret = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CliError::Passphrase("Incorrect passphrase".to_string()))?;

        let key = SigningKey::from_bytes(&secret)?;
        if key.verification_key() != self.verification_key {
            return Err(CliError::KeyDeserialization(
                "Decrypted key does not match its stored verification key".to_string(),
            ));
        }
        Ok(key)
    }
}

fn cipher_for(passphrase: &Passphrase, salt: &[u8]) -> Result<Aes256Gcm> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CliError::Crypto(format!("Key derivation failed: {}", e)))?;
    Aes256Gcm::new_from_slice(&key).map_err(|e| CliError::Crypto(format!("Invalid cipher key: {}", e)))
}

// ---------------------------------------------------------------------------
// Passphrase sources
// ---------------------------------------------------------------------------

/// Supplies passphrases for new keys and for unlocking protected keys.
pub trait PassphraseSource {
    fn new_passphrase(&self, target: &Path) -> Result<Passphrase>;
    fn unlock_passphrase(&self, key_file: &Path) -> Result<Passphrase>;
}

/// Refuses every request; used when no passphrase can be obtained.
pub struct NoPassphrase;

impl PassphraseSource for NoPassphrase {
    fn new_passphrase(&self, target: &Path) -> Result<Passphrase> {
        Err(CliError::Passphrase(format!(
            "A passphrase is required for {} but none is available",
            target.display()
        )))
    }

    fn unlock_passphrase(&self, key_file: &Path) -> Result<Passphrase> {
        Err(CliError::Passphrase(format!(
            "{} is passphrase-protected but no passphrase is available",
            key_file.display()
        )))
    }
}

/// Always answers with the same passphrase.
pub struct FixedPassphrase(pub Passphrase);

impl PassphraseSource for FixedPassphrase {
    fn new_passphrase(&self, _target: &Path) -> Result<Passphrase> {
        Ok(self.0.clone())
    }

    fn unlock_passphrase(&self, _key_file: &Path) -> Result<Passphrase> {
        Ok(self.0.clone())
    }
}

/// Prompts on the terminal without echo.
pub struct PromptPassphrase;

impl PassphraseSource for PromptPassphrase {
    fn new_passphrase(&self, target: &Path) -> Result<Passphrase> {
        let first = rpassword::prompt_password(format!(
            "Enter passphrase for {}: ",
            target.display()
        ))?;
        if first.is_empty() {
            return Err(CliError::Passphrase(
                "Empty passphrase; use --no-passphrase for an unprotected key".to_string(),
            ));
        }
        let second = rpassword::prompt_password("Repeat passphrase: ")?;
        if first != second {
            return Err(CliError::Passphrase("Passphrases do not match".to_string()));
        }
        Ok(Passphrase::new(first))
    }

    fn unlock_passphrase(&self, key_file: &Path) -> Result<Passphrase> {
        let passphrase =
            rpassword::prompt_password(format!("Passphrase for {}: ", key_file.display()))?;
        Ok(Passphrase::new(passphrase))
    }
}

/// Turns the operator's requirement into a concrete policy.
pub fn resolve_policy(
    requirement: PassphraseRequirement,
    source: &dyn PassphraseSource,
    target: &Path,
) -> Result<PassphrasePolicy> {
    match requirement {
        PassphraseRequirement::EmptyPassphrase => Ok(PassphrasePolicy::Empty),
        PassphraseRequirement::GetPassphrase => {
            Ok(PassphrasePolicy::Protected(source.new_passphrase(target)?))
        }
    }
}

// ---------------------------------------------------------------------------
// Key operations
// ---------------------------------------------------------------------------

/// Produces fresh key material under the given protection policy.
pub fn generate_signing_key(policy: PassphrasePolicy) -> ProtectedSigningKey {
    ProtectedSigningKey {
        key: SigningKey::generate(),
        protection: policy,
    }
}

pub fn derive_verification_key(key: &SigningKey) -> VerificationKey {
    key.verification_key()
}

/// Reads a signing key in `ops`' format, unlocking it through `unlock` if sealed.
pub fn read_protected_signing_key(
    ops: &dyn CliOps,
    file: &SigningKeyFile,
    unlock: &dyn PassphraseSource,
) -> Result<ProtectedSigningKey> {
    let bytes = file.read_bytes()?;
    debug!(
        "Decoding signing key {} as {}",
        file.path().display(),
        ops.protocol()
    );
    match ops.deserialise_signing_key(&bytes)? {
        EncodedSigningKey::Plain(key) => Ok(ProtectedSigningKey::unprotected(key)),
        EncodedSigningKey::Encrypted(sealed) => {
            let passphrase = unlock.unlock_passphrase(file.path())?;
            let key = sealed.open(&passphrase)?;
            Ok(ProtectedSigningKey {
                key,
                protection: PassphrasePolicy::Protected(passphrase),
            })
        }
    }
}

pub fn read_signing_key(
    ops: &dyn CliOps,
    file: &SigningKeyFile,
    unlock: &dyn PassphraseSource,
) -> Result<SigningKey> {
    read_protected_signing_key(ops, file, unlock).map(|protected| protected.key)
}

/// Verification keys are stored as a single line of hex in every protocol.
pub fn encode_verification_key(vk: &VerificationKey) -> Result<Vec<u8>> {
    Ok(format!("{}\n", vk.to_hex()).into_bytes())
}

pub fn read_verification_key(file: &VerificationKeyFile) -> Result<VerificationKey> {
    VerificationKey::from_hex(&file.read_string()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{decide_cli_ops, Protocol};
    use crate::persistence::{ensure_new_file, FileMode};
    use tempfile::TempDir;

    #[test]
    fn test_seal_and_open() {
        let key = SigningKey::generate();
        let passphrase = Passphrase::new("correct horse");
        let sealed = EncryptedSigningKey::seal(&key, &passphrase).unwrap();

        assert_eq!(sealed.verification_key, key.verification_key());
        let opened = sealed.open(&passphrase).unwrap();
        assert_eq!(opened.verification_key(), key.verification_key());
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let key = SigningKey::generate();
        let sealed = EncryptedSigningKey::seal(&key, &Passphrase::new("right")).unwrap();
        let result = sealed.open(&Passphrase::new("wrong"));
        assert!(matches!(result, Err(CliError::Passphrase(_))));
    }

    #[test]
    fn test_swapped_verification_key_is_rejected() {
        let key = SigningKey::generate();
        let passphrase = Passphrase::new("pass");
        let mut sealed = EncryptedSigningKey::seal(&key, &passphrase).unwrap();
        sealed.verification_key = SigningKey::generate().verification_key();
        assert!(matches!(
            sealed.open(&passphrase),
            Err(CliError::KeyDeserialization(_))
        ));
    }

    #[test]
    fn test_resolve_policy() {
        let target = Path::new("new.sk");
        assert_eq!(
            resolve_policy(PassphraseRequirement::EmptyPassphrase, &NoPassphrase, target).unwrap(),
            PassphrasePolicy::Empty
        );
        assert!(resolve_policy(PassphraseRequirement::GetPassphrase, &NoPassphrase, target).is_err());

        let fixed = FixedPassphrase(Passphrase::new("pw"));
        assert_eq!(
            resolve_policy(PassphraseRequirement::GetPassphrase, &fixed, target).unwrap(),
            PassphrasePolicy::Protected(Passphrase::new("pw"))
        );
    }

    #[test]
    fn test_protected_key_needs_unlock() {
        let dir = TempDir::new().unwrap();
        let ops = decide_cli_ops(Protocol::RealPbft).unwrap();
        let path = dir.path().join("protected.sk");

        let generated = generate_signing_key(PassphrasePolicy::Protected(Passphrase::new("pw")));
        ensure_new_file(
            |k: &ProtectedSigningKey| ops.serialise_signing_key(k),
            &path,
            &generated,
            FileMode::Secret,
        )
        .unwrap();

        let file = SigningKeyFile(path);
        assert!(matches!(
            read_signing_key(ops.as_ref(), &file, &NoPassphrase),
            Err(CliError::Passphrase(_))
        ));

        let unlocked =
            read_signing_key(ops.as_ref(), &file, &FixedPassphrase(Passphrase::new("pw"))).unwrap();
        assert_eq!(unlocked.verification_key(), generated.key.verification_key());
    }

    #[test]
    fn test_verification_key_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.vk");
        let vk = SigningKey::generate().verification_key();

        ensure_new_file(encode_verification_key, &path, &vk, FileMode::Public).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{}\n", vk.to_hex()));

        let back = read_verification_key(&VerificationKeyFile(path)).unwrap();
        assert_eq!(back, vk);
    }

    #[test]
    fn test_malformed_verification_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.vk");
        std::fs::write(&path, "not a key").unwrap();
        assert!(matches!(
            read_verification_key(&VerificationKeyFile(path)),
            Err(CliError::KeyDeserialization(_))
        ));
    }
}
