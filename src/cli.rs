//! Command-line surface of `chain-cli`
//!
//! Parses arguments with clap and lowers them into a [`Command`].

use crate::command::{ChainSource, Command};
use crate::config::CommonOverrides;
use crate::crypto::{Address, ProtocolMagic, RequiresNetworkMagic};
use crate::delegation::EpochNumber;
use crate::error::{CliError, Result};
use crate::keys::{
    FixedPassphrase, Passphrase, PassphraseRequirement, PassphraseSource, PromptPassphrase,
    PASSPHRASE_ENV_VAR,
};
use crate::ops::Protocol;
use crate::persistence::{
    CertificateFile, GenesisFile, NewCertificateFile, NewDirectory, NewSigningKeyFile, NewTxFile,
    NewVerificationKeyFile, ProtocolParametersFile, SigningKeyFile, TopologyFile, TxFile,
    VerificationKeyFile,
};
use crate::transaction::{Lovelace, NonEmpty, TxIn, TxOut};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chain-cli", author, version, about = "Genesis, key and delegation tooling", long_about = None)]
pub struct Cli {
    /// Protocol whose key and certificate formats to use
    #[arg(long, global = true, default_value = "real-pbft")]
    pub protocol: Protocol,

    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options selecting the chain a command acts on.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Genesis JSON, overriding the configuration file
    #[arg(long)]
    pub genesis_json: Option<PathBuf>,
    /// Expected genesis hash (hex)
    #[arg(long)]
    pub genesis_hash: Option<String>,
    /// `magic` or `no-magic`
    #[arg(long)]
    pub network_magic: Option<RequiresNetworkMagic>,
}

impl From<ChainArgs> for ChainSource {
    fn from(args: ChainArgs) -> Self {
        ChainSource {
            config_file: args.config,
            overrides: CommonOverrides {
                genesis_file: args.genesis_json,
                genesis_hash: args.genesis_hash,
                requires_network_magic: args.network_magic,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Generates genesis data and the keys it refers to
    Genesis {
        #[arg(long)]
        genesis_output_dir: PathBuf,
        /// Unix time in seconds; defaults to now
        #[arg(long)]
        start_time: Option<i64>,
        #[arg(long)]
        protocol_parameters_file: PathBuf,
        #[arg(long)]
        k: u64,
        #[arg(long)]
        protocol_magic: u32,
        #[arg(long, default_value = "no-magic")]
        network_magic: RequiresNetworkMagic,
        #[arg(long, default_value_t = 1)]
        n_genesis_keys: usize,
        #[arg(long, default_value_t = 0)]
        n_poor: usize,
        #[arg(long)]
        total_balance: u64,
        /// Fraction of the balance given to the genesis keys
        #[arg(long, default_value_t = 1.0)]
        delegate_share: f64,
        #[arg(long)]
        secret_seed: Option<u64>,
    },
    /// Prints the hash of a genesis file
    PrintGenesisHash {
        #[arg(long)]
        genesis_json: PathBuf,
    },
    /// Writes the built-in genesis to a new directory
    DumpHardcodedGenesis {
        #[arg(long)]
        genesis_output_dir: PathBuf,
    },
    /// Generates a new signing key
    Keygen {
        #[arg(long)]
        secret: PathBuf,
        /// Store the key without a passphrase
        #[arg(long)]
        no_passphrase: bool,
    },
    /// Writes the verification key of a signing key
    ToVerification {
        #[arg(long)]
        secret: PathBuf,
        #[arg(long)]
        to: PathBuf,
    },
    /// Prints the public parts of a signing key
    SigningKeyPublic {
        #[arg(long)]
        secret: PathBuf,
    },
    /// Re-encodes a signing key from another protocol's format
    MigrateDelegateKeyFrom {
        #[arg(long)]
        from: Protocol,
        #[arg(long)]
        secret: PathBuf,
        #[arg(long)]
        to: PathBuf,
    },
    /// Issues a heavyweight delegation certificate
    IssueDelegationCertificate {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long)]
        since_epoch: u64,
        #[arg(long)]
        secret: PathBuf,
        #[arg(long)]
        delegate_key: PathBuf,
        #[arg(long)]
        certificate: PathBuf,
    },
    /// Checks a delegation certificate against the expected keys
    CheckDelegation {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long)]
        certificate: PathBuf,
        #[arg(long)]
        issuer_key: PathBuf,
        #[arg(long)]
        delegate_key: PathBuf,
    },
    /// Sends a transaction file to the first producer of a topology
    SubmitTx {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long)]
        topology: PathBuf,
        #[arg(long)]
        tx: PathBuf,
    },
    /// Spends a genesis allocation
    IssueGenesisUtxoExpenditure {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long)]
        tx: PathBuf,
        #[arg(long)]
        wallet_key: PathBuf,
        /// Genesis address to spend; defaults to the wallet key's address
        #[arg(long)]
        rich_addr_from: Option<Address>,
        /// `<address>+<amount>`, repeatable
        #[arg(long = "txout", required = true)]
        txout: Vec<TxOut>,
    },
    /// Spends explicit unspent outputs with one key
    IssueUtxoExpenditure {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long)]
        tx: PathBuf,
        #[arg(long)]
        wallet_key: PathBuf,
        /// `<txid>#<index>`, repeatable
        #[arg(long = "txin", required = true)]
        txin: Vec<TxIn>,
        #[arg(long = "txout", required = true)]
        txout: Vec<TxOut>,
    },
}

fn non_empty<T>(items: Vec<T>, flag: &str) -> Result<NonEmpty<T>> {
    NonEmpty::new(items).ok_or_else(|| CliError::Config(format!("at least one {} is required", flag)))
}

impl CliCommand {
    /// Lowers parsed arguments into a [`Command`].
    pub fn into_command(self) -> Result<Command> {
        let command = match self {
            CliCommand::Genesis {
                genesis_output_dir,
                start_time,
                protocol_parameters_file,
                k,
                protocol_magic,
                network_magic,
                n_genesis_keys,
                n_poor,
                total_balance,
                delegate_share,
                secret_seed,
            } => {
                let start_time = match start_time {
                    Some(secs) => Some(Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                        CliError::Config(format!("invalid start time {}", secs))
                    })?),
                    None => None,
                };
                Command::Genesis {
                    out_dir: NewDirectory(genesis_output_dir),
                    start_time,
                    protocol_parameters: ProtocolParametersFile(protocol_parameters_file),
                    k,
                    protocol_magic: ProtocolMagic::new(protocol_magic, network_magic),
                    n_genesis_keys,
                    n_poor,
                    total_balance: Lovelace::new(total_balance)?,
                    delegate_share,
                    seed: secret_seed,
                }
            }
            CliCommand::PrintGenesisHash { genesis_json } => Command::PrintGenesisHash {
                genesis: GenesisFile(genesis_json),
            },
            CliCommand::DumpHardcodedGenesis { genesis_output_dir } => {
                Command::DumpHardcodedGenesis {
                    out_dir: NewDirectory(genesis_output_dir),
                }
            }
            CliCommand::Keygen {
                secret,
                no_passphrase,
            } => Command::Keygen {
                out: NewSigningKeyFile(secret),
                passphrase: if no_passphrase {
                    PassphraseRequirement::EmptyPassphrase
                } else {
                    PassphraseRequirement::GetPassphrase
                },
            },
            CliCommand::ToVerification { secret, to } => Command::ToVerification {
                signing_key: SigningKeyFile(secret),
                out: NewVerificationKeyFile(to),
            },
            CliCommand::SigningKeyPublic { secret } => Command::PrettyPrintSigningKeyPublic {
                signing_key: SigningKeyFile(secret),
            },
            CliCommand::MigrateDelegateKeyFrom { from, secret, to } => {
                Command::MigrateDelegateKeyFrom {
                    from_protocol: from,
                    from_key: SigningKeyFile(secret),
                    out: NewSigningKeyFile(to),
                }
            }
            CliCommand::IssueDelegationCertificate {
                chain,
                since_epoch,
                secret,
                delegate_key,
                certificate,
            } => Command::IssueDelegationCertificate {
                chain: chain.into(),
                epoch: EpochNumber(since_epoch),
                issuer_key: SigningKeyFile(secret),
                delegate_key: VerificationKeyFile(delegate_key),
                out: NewCertificateFile(certificate),
            },
            CliCommand::CheckDelegation {
                chain,
                certificate,
                issuer_key,
                delegate_key,
            } => Command::CheckDelegation {
                chain: chain.into(),
                certificate: CertificateFile(certificate),
                issuer_key: VerificationKeyFile(issuer_key),
                delegate_key: VerificationKeyFile(delegate_key),
            },
            CliCommand::SubmitTx {
                chain,
                topology,
                tx,
            } => Command::SubmitTx {
                chain: chain.into(),
                topology: TopologyFile(topology),
                tx: TxFile(tx),
            },
            CliCommand::IssueGenesisUtxoExpenditure {
                chain,
                tx,
                wallet_key,
                rich_addr_from,
                txout,
            } => Command::SpendGenesisUtxo {
                chain: chain.into(),
                out: NewTxFile(tx),
                genesis_key: SigningKeyFile(wallet_key),
                genesis_address: rich_addr_from,
                outputs: non_empty(txout, "--txout")?,
            },
            CliCommand::IssueUtxoExpenditure {
                chain,
                tx,
                wallet_key,
                txin,
                txout,
            } => Command::SpendUtxo {
                chain: chain.into(),
                out: NewTxFile(tx),
                underwriter_key: SigningKeyFile(wallet_key),
                inputs: non_empty(txin, "--txin")?,
                outputs: non_empty(txout, "--txout")?,
            },
        };
        Ok(command)
    }
}

/// Passphrases come from the environment when set, otherwise from the terminal.
pub fn passphrase_source() -> Box<dyn PassphraseSource> {
    match std::env::var(PASSPHRASE_ENV_VAR) {
        Ok(passphrase) => Box::new(FixedPassphrase(Passphrase::new(passphrase))),
        Err(_) => Box::new(PromptPassphrase),
    }
}

/// One-line, colored rendering of a failure for stderr.
pub fn render_error(err: &CliError) -> String {
    format!("{} {}", "error:".red().bold(), err)
}
