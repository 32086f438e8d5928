//! Error types for chain-bootstrap

use std::path::PathBuf;
use thiserror::Error;

use crate::delegation::CertificateFailure;

#[derive(Debug, Error)]
pub enum CliError {
    /// A `New*` output target was already present on disk.
    #[error("output file must not already exist: {}", .0.display())]
    OutputMustNotAlreadyExist(PathBuf),

    #[error("failed to deserialise signing key: {0}")]
    KeyDeserialization(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Produced by the certificate check; the dispatcher turns it into a report.
    #[error("delegation certificate check failed: {reason}")]
    CertificateVerificationFailed { reason: CertificateFailure },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction rejected by node: {0}")]
    SubmissionRejected(String),

    #[error("failed to read genesis data: {0}")]
    GenesisRead(String),

    #[error("failed to build genesis data: {0}")]
    GenesisBuild(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("passphrase error: {0}")]
    Passphrase(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Wraps a read failure with the path that was being read.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Read {
            path: path.into(),
            source,
        }
    }

    /// True when a read failed because the input path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CliError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<Box<bincode::ErrorKind>> for CliError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CliError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_exists_message_names_path() {
        let err = CliError::OutputMustNotAlreadyExist(PathBuf::from("/tmp/tx.bin"));
        assert_eq!(
            err.to_string(),
            "output file must not already exist: /tmp/tx.bin"
        );
    }

    #[test]
    fn test_not_found_classification() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(CliError::read("key.sk", missing).is_not_found());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(!CliError::read("key.sk", denied).is_not_found());
    }
}
