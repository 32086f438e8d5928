//! Heavyweight delegation certificates
//!
//! A certificate states that the issuer delegates block-signing rights to the
//! delegate from a given epoch on. The issuer signs, under the `ProxyVk` tag
//! and the chain's protocol magic, the payload
//! `epoch (le u64) || issuer vk || delegate vk`.

use crate::crypto::{ProtocolMagic, SignTag, Signature, SigningKey, VerificationKey};
use crate::error::CliError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochNumber(pub u64);

impl fmt::Display for EpochNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub protocol_magic: u32,
    pub epoch: EpochNumber,
    pub issuer: VerificationKey,
    pub delegate: VerificationKey,
    pub signature: Signature,
}

/// Why a certificate did not check out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateFailure {
    #[error("protocol magic mismatch: certificate has {found}, expected {expected}")]
    ProtocolMagicMismatch { expected: u32, found: u32 },

    #[error("issuer key mismatch: certificate names {found}, expected {expected}")]
    IssuerMismatch {
        expected: VerificationKey,
        found: VerificationKey,
    },

    #[error("delegate key mismatch: certificate names {found}, expected {expected}")]
    DelegateMismatch {
        expected: VerificationKey,
        found: VerificationKey,
    },

    #[error("certificate signature does not verify against the issuer key")]
    SignatureMismatch,
}

impl CertificateFailure {
    pub fn is_field_mismatch(&self) -> bool {
        !self.is_signature_mismatch()
    }

    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, CertificateFailure::SignatureMismatch)
    }
}

fn signed_payload(
    epoch: EpochNumber,
    issuer: &VerificationKey,
    delegate: &VerificationKey,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + 2 * issuer.as_bytes().len());
    payload.extend_from_slice(&epoch.0.to_le_bytes());
    payload.extend_from_slice(issuer.as_bytes());
    payload.extend_from_slice(delegate.as_bytes());
    payload
}

/// Creates a certificate delegating from `issuer` to `delegate` starting at `epoch`.
///
/// Deterministic for identical inputs. Does not consult chain state.
pub fn issue_delegation_certificate(
    magic: ProtocolMagic,
    epoch: EpochNumber,
    issuer: &SigningKey,
    delegate: &VerificationKey,
) -> Certificate {
    let issuer_vk = issuer.verification_key();
    let payload = signed_payload(epoch, &issuer_vk, delegate);
    Certificate {
        protocol_magic: magic.id,
        epoch,
        issuer: issuer_vk,
        delegate: *delegate,
        signature: issuer.sign(SignTag::ProxyVk, magic.id, &payload),
    }
}

/// Checks `cert` against the expected magic and keys.
///
/// Field mismatches are reported before the signature is examined; the
/// signature is verified over the payload rebuilt from the supplied values.
pub fn check_delegation_certificate(
    cert: &Certificate,
    magic: ProtocolMagic,
    issuer: &VerificationKey,
    delegate: &VerificationKey,
) -> Result<(), CliError> {
    let fail = |reason| Err(CliError::CertificateVerificationFailed { reason });

    if cert.protocol_magic != magic.id {
        return fail(CertificateFailure::ProtocolMagicMismatch {
            expected: magic.id,
            found: cert.protocol_magic,
        });
    }
    if cert.issuer != *issuer {
        return fail(CertificateFailure::IssuerMismatch {
            expected: *issuer,
            found: cert.issuer,
        });
    }
    if cert.delegate != *delegate {
        return fail(CertificateFailure::DelegateMismatch {
            expected: *delegate,
            found: cert.delegate,
        });
    }

    let payload = signed_payload(cert.epoch, issuer, delegate);
    if issuer
        .verify(SignTag::ProxyVk, magic.id, &payload, &cert.signature)
        .is_err()
    {
        return fail(CertificateFailure::SignatureMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RequiresNetworkMagic;

    fn magic(id: u32) -> ProtocolMagic {
        ProtocolMagic::new(id, RequiresNetworkMagic::RequiresNoMagic)
    }

    fn failure(result: Result<(), CliError>) -> CertificateFailure {
        match result {
            Err(CliError::CertificateVerificationFailed { reason }) => reason,
            other => panic!("Expected CertificateVerificationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_issue_then_check() {
        let issuer = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();
        let cert = issue_delegation_certificate(magic(1097911063), EpochNumber(0), &issuer, &delegate);

        assert_eq!(cert.issuer, issuer.verification_key());
        assert_eq!(cert.delegate, delegate);
        assert!(check_delegation_certificate(
            &cert,
            magic(1097911063),
            &issuer.verification_key(),
            &delegate
        )
        .is_ok());
    }

    #[test]
    fn test_issuance_is_deterministic() {
        let issuer = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();
        let a = issue_delegation_certificate(magic(7), EpochNumber(12), &issuer, &delegate);
        let b = issue_delegation_certificate(magic(7), EpochNumber(12), &issuer, &delegate);
        assert_eq!(a, b);
    }

    #[test]
    fn test_magic_mismatch_is_a_field_mismatch() {
        let issuer = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();
        let cert = issue_delegation_certificate(magic(5), EpochNumber(5), &issuer, &delegate);

        let reason = failure(check_delegation_certificate(
            &cert,
            magic(6),
            &issuer.verification_key(),
            &delegate,
        ));
        assert_eq!(
            reason,
            CertificateFailure::ProtocolMagicMismatch {
                expected: 6,
                found: 5
            }
        );
        assert!(reason.is_field_mismatch());
    }

    #[test]
    fn test_swapped_keys_are_field_mismatches() {
        let issuer = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();
        let cert = issue_delegation_certificate(magic(5), EpochNumber(1), &issuer, &delegate);

        let reason = failure(check_delegation_certificate(
            &cert,
            magic(5),
            &delegate,
            &issuer.verification_key(),
        ));
        assert!(matches!(reason, CertificateFailure::IssuerMismatch { .. }));

        let stranger = SigningKey::generate().verification_key();
        let reason = failure(check_delegation_certificate(
            &cert,
            magic(5),
            &issuer.verification_key(),
            &stranger,
        ));
        assert!(matches!(reason, CertificateFailure::DelegateMismatch { .. }));
    }

    #[test]
    fn test_edited_epoch_breaks_signature() {
        let issuer = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();
        let mut cert = issue_delegation_certificate(magic(5), EpochNumber(1), &issuer, &delegate);
        cert.epoch = EpochNumber(0);

        let reason = failure(check_delegation_certificate(
            &cert,
            magic(5),
            &issuer.verification_key(),
            &delegate,
        ));
        assert_eq!(reason, CertificateFailure::SignatureMismatch);
    }

    #[test]
    fn test_forged_certificate_with_matching_fields() {
        let issuer = SigningKey::generate();
        let forger = SigningKey::generate();
        let delegate = SigningKey::generate().verification_key();

        let mut cert = issue_delegation_certificate(magic(5), EpochNumber(2), &forger, &delegate);
        cert.issuer = issuer.verification_key();

        let reason = failure(check_delegation_certificate(
            &cert,
            magic(5),
            &issuer.verification_key(),
            &delegate,
        ));
        assert!(reason.is_signature_mismatch());
    }
}
