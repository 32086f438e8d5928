//! Operator intents: one variant per sub-command, each with typed parameters

use crate::config::CommonOverrides;
use crate::crypto::{Address, ProtocolMagic};
use crate::delegation::EpochNumber;
use crate::keys::PassphraseRequirement;
use crate::ops::Protocol;
use crate::persistence::{
    CertificateFile, GenesisFile, NewCertificateFile, NewDirectory, NewSigningKeyFile, NewTxFile,
    NewVerificationKeyFile, ProtocolParametersFile, SigningKeyFile, TopologyFile, TxFile,
    VerificationKeyFile,
};
use crate::transaction::{Lovelace, NonEmpty, TxIn, TxOut};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Where a command's chain configuration comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainSource {
    pub config_file: Option<PathBuf>,
    pub overrides: CommonOverrides,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Genesis {
        out_dir: NewDirectory,
        /// Defaults to the current time.
        start_time: Option<DateTime<Utc>>,
        protocol_parameters: ProtocolParametersFile,
        k: u64,
        protocol_magic: ProtocolMagic,
        n_genesis_keys: usize,
        n_poor: usize,
        total_balance: Lovelace,
        delegate_share: f64,
        seed: Option<u64>,
    },
    PrintGenesisHash {
        genesis: GenesisFile,
    },
    DumpHardcodedGenesis {
        out_dir: NewDirectory,
    },
    Keygen {
        out: NewSigningKeyFile,
        passphrase: PassphraseRequirement,
    },
    ToVerification {
        signing_key: SigningKeyFile,
        out: NewVerificationKeyFile,
    },
    PrettyPrintSigningKeyPublic {
        signing_key: SigningKeyFile,
    },
    /// Re-encodes a key written under `from_protocol` in the ambient protocol's format.
    MigrateDelegateKeyFrom {
        from_protocol: Protocol,
        from_key: SigningKeyFile,
        out: NewSigningKeyFile,
    },
    IssueDelegationCertificate {
        chain: ChainSource,
        epoch: EpochNumber,
        issuer_key: SigningKeyFile,
        delegate_key: VerificationKeyFile,
        out: NewCertificateFile,
    },
    CheckDelegation {
        chain: ChainSource,
        certificate: CertificateFile,
        issuer_key: VerificationKeyFile,
        delegate_key: VerificationKeyFile,
    },
    SubmitTx {
        chain: ChainSource,
        topology: TopologyFile,
        tx: TxFile,
    },
    SpendGenesisUtxo {
        chain: ChainSource,
        out: NewTxFile,
        genesis_key: SigningKeyFile,
        /// Defaults to the address of `genesis_key` on the configured network.
        genesis_address: Option<Address>,
        outputs: NonEmpty<TxOut>,
    },
    SpendUtxo {
        chain: ChainSource,
        out: NewTxFile,
        underwriter_key: SigningKeyFile,
        inputs: NonEmpty<TxIn>,
        outputs: NonEmpty<TxOut>,
    },
}

impl Command {
    /// Sub-command name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Genesis { .. } => "genesis",
            Command::PrintGenesisHash { .. } => "print-genesis-hash",
            Command::DumpHardcodedGenesis { .. } => "dump-hardcoded-genesis",
            Command::Keygen { .. } => "keygen",
            Command::ToVerification { .. } => "to-verification",
            Command::PrettyPrintSigningKeyPublic { .. } => "signing-key-public",
            Command::MigrateDelegateKeyFrom { .. } => "migrate-delegate-key-from",
            Command::IssueDelegationCertificate { .. } => "issue-delegation-certificate",
            Command::CheckDelegation { .. } => "check-delegation",
            Command::SubmitTx { .. } => "submit-tx",
            Command::SpendGenesisUtxo { .. } => "issue-genesis-utxo-expenditure",
            Command::SpendUtxo { .. } => "issue-utxo-expenditure",
        }
    }
}
