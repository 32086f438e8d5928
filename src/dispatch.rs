//! Command dispatcher
//!
//! [`run_command`] interprets exactly one [`Command`]. Inputs are read first,
//! the core operation runs in memory, and only then is any artifact written,
//! so a failing step never leaves a partial output behind.

use crate::command::{ChainSource, Command};
use crate::config::{build_configuration, load_config, BaseConfig, ChainConfig};
use crate::crypto::{
    render_address, render_verification_key, render_verification_key_base64, Address,
};
use crate::delegation::{check_delegation_certificate, issue_delegation_certificate, Certificate};
use crate::error::{CliError, Result};
use crate::genesis::{
    dump_genesis, hardcoded_genesis, mk_genesis, read_genesis, read_protocol_parameters,
    GeneratedSecrets, GenesisParameters,
};
use crate::keys::{
    derive_verification_key, encode_verification_key, generate_signing_key,
    read_protected_signing_key, read_signing_key, read_verification_key, resolve_policy,
    PassphraseSource, ProtectedSigningKey,
};
use crate::network::read_topology;
use crate::ops::{decide_cli_ops, Protocol};
use crate::persistence::{ensure_absent, ensure_new_file, FileMode, InputFile, NewFile};
use crate::transaction::{assemble_expenditure, assemble_genesis_expenditure, encode_tx, read_tx, TxAux};
use chrono::Utc;
use std::io::Write;
use tracing::{info, warn};

/// What a command may touch besides the file system.
pub struct Env<'a> {
    pub passphrases: &'a dyn PassphraseSource,
    pub out: &'a mut dyn Write,
}

fn load_chain(source: &ChainSource) -> Result<ChainConfig> {
    let base = match &source.config_file {
        Some(path) => load_config(path)?,
        None => BaseConfig::default(),
    };
    build_configuration(&base, &source.overrides)
}

fn write_tx(out: &dyn NewFile, tx: &TxAux, env: &mut Env<'_>) -> Result<()> {
    ensure_new_file(encode_tx, out.path(), tx, FileMode::Public)?;
    writeln!(
        env.out,
        "Wrote transaction {} to {}",
        tx.tx.id()?,
        out.path().display()
    )?;
    Ok(())
}

/// Runs `command` under the ambient `protocol`.
pub fn run_command(protocol: Protocol, command: Command, env: &mut Env<'_>) -> Result<()> {
    let ops = decide_cli_ops(protocol)?;
    let ops = ops.as_ref();
    info!("Running {} (protocol {})", command.name(), protocol);

    match command {
        Command::Genesis {
            out_dir,
            start_time,
            protocol_parameters,
            k,
            protocol_magic,
            n_genesis_keys,
            n_poor,
            total_balance,
            delegate_share,
            seed,
        } => {
            let params = GenesisParameters {
                start_time: start_time.unwrap_or_else(Utc::now),
                protocol_parameters: read_protocol_parameters(&protocol_parameters)?,
                k,
                protocol_magic,
                n_genesis_keys,
                n_poor,
                total_balance,
                delegate_share,
                seed,
            };
            let (data, secrets) = mk_genesis(&params)?;
            let hash = dump_genesis(ops, &out_dir, &data, &secrets)?;
            writeln!(
                env.out,
                "Genesis written to {} (hash {})",
                out_dir.path().display(),
                hash
            )?;
        }

        Command::PrintGenesisHash { genesis } => {
            let (_, hash) = read_genesis(&genesis)?;
            writeln!(env.out, "{}", hash)?;
        }

        Command::DumpHardcodedGenesis { out_dir } => {
            let data = hardcoded_genesis()?;
            let hash = dump_genesis(ops, &out_dir, &data, &GeneratedSecrets::default())?;
            writeln!(
                env.out,
                "Hard-coded genesis written to {} (hash {})",
                out_dir.path().display(),
                hash
            )?;
        }

        Command::Keygen { out, passphrase } => {
            ensure_absent(out.path())?;
            let policy = resolve_policy(passphrase, env.passphrases, out.path())?;
            let key = generate_signing_key(policy);
            ensure_new_file(
                |k: &ProtectedSigningKey| ops.serialise_signing_key(k),
                out.path(),
                &key,
                FileMode::Secret,
            )?;
            writeln!(
                env.out,
                "Wrote signing key to {} (verification key {})",
                out.path().display(),
                render_verification_key(&key.key.verification_key())
            )?;
        }

        Command::ToVerification { signing_key, out } => {
            let key = read_signing_key(ops, &signing_key, env.passphrases)?;
            let vk = derive_verification_key(&key);
            ensure_new_file(encode_verification_key, out.path(), &vk, FileMode::Public)?;
            writeln!(env.out, "Wrote verification key to {}", out.path().display())?;
        }

        Command::PrettyPrintSigningKeyPublic { signing_key } => {
            let key = read_signing_key(ops, &signing_key, env.passphrases)?;
            let vk = derive_verification_key(&key);
            writeln!(env.out, "public key hash: {}", vk.stakeholder_id())?;
            writeln!(env.out, "public key (base64): {}", render_verification_key_base64(&vk))?;
            writeln!(env.out, "public key (hex): {}", render_verification_key(&vk))?;
        }

        Command::MigrateDelegateKeyFrom {
            from_protocol,
            from_key,
            out,
        } => {
            let from_ops = decide_cli_ops(from_protocol)?;
            let key = read_protected_signing_key(from_ops.as_ref(), &from_key, env.passphrases)?;
            ensure_new_file(
                |k: &ProtectedSigningKey| ops.serialise_signing_key(k),
                out.path(),
                &key,
                FileMode::Secret,
            )?;
            writeln!(
                env.out,
                "Migrated {} key {} to {} at {}",
                from_protocol,
                from_key.path().display(),
                protocol,
                out.path().display()
            )?;
        }

        Command::IssueDelegationCertificate {
            chain,
            epoch,
            issuer_key,
            delegate_key,
            out,
        } => {
            let config = load_chain(&chain)?;
            let issuer = read_signing_key(ops, &issuer_key, env.passphrases)?;
            let delegate = read_verification_key(&delegate_key)?;
            let cert = issue_delegation_certificate(config.protocol_magic, epoch, &issuer, &delegate);
            ensure_new_file(
                |c: &Certificate| ops.serialise_delegation_cert(c),
                out.path(),
                &cert,
                FileMode::Public,
            )?;
            writeln!(
                env.out,
                "Wrote delegation certificate for epoch {} to {}",
                epoch,
                out.path().display()
            )?;
        }

        Command::CheckDelegation {
            chain,
            certificate,
            issuer_key,
            delegate_key,
        } => {
            let config = load_chain(&chain)?;
            let cert = ops.deserialise_delegation_cert(&certificate.read_bytes()?)?;
            let issuer = read_verification_key(&issuer_key)?;
            let delegate = read_verification_key(&delegate_key)?;
            match check_delegation_certificate(&cert, config.protocol_magic, &issuer, &delegate) {
                Ok(()) => {
                    writeln!(env.out, "Certificate is valid: {} delegates to {}", issuer, delegate)?;
                }
                Err(CliError::CertificateVerificationFailed { reason }) => {
                    warn!("Certificate check failed: {}", reason);
                    let kind = if reason.is_signature_mismatch() {
                        "signature mismatch"
                    } else {
                        "field mismatch"
                    };
                    writeln!(env.out, "Certificate is NOT valid ({}): {}", kind, reason)?;
                }
                Err(e) => return Err(e),
            }
        }

        Command::SubmitTx {
            chain,
            topology,
            tx,
        } => {
            let config = load_chain(&chain)?;
            let topology = read_topology(&topology)?;
            let tx = read_tx(&tx)?;
            tx.verify_witnesses(config.protocol_magic)?;
            let id = ops.submit_tx(&topology, &config, &tx)?;
            writeln!(env.out, "Submitted transaction {}", id)?;
        }

        Command::SpendGenesisUtxo {
            chain,
            out,
            genesis_key,
            genesis_address,
            outputs,
        } => {
            let config = load_chain(&chain)?;
            let key = read_signing_key(ops, &genesis_key, env.passphrases)?;
            let address = genesis_address.unwrap_or_else(|| {
                Address::from_verification_key(
                    &key.verification_key(),
                    config.protocol_magic.network_magic(),
                )
            });
            let balance = *config
                .genesis
                .non_avvm_balances
                .get(&address)
                .ok_or_else(|| {
                    CliError::GenesisRead(format!(
                        "address {} has no genesis allocation",
                        render_address(&address)
                    ))
                })?;
            let tx = assemble_genesis_expenditure(config.protocol_magic, &address, &key, outputs)?;
            let spent = tx.tx.total_output().ok_or_else(|| {
                CliError::Serialization("transaction outputs exceed the maximum supply".to_string())
            })?;
            if spent > balance {
                return Err(CliError::GenesisRead(format!(
                    "outputs total {} but the genesis allocation of {} is {}",
                    spent,
                    render_address(&address),
                    balance
                )));
            }
            info!("Spending {} of genesis balance {} at {}", spent, balance, render_address(&address));
            write_tx(&out, &tx, env)?;
        }

        Command::SpendUtxo {
            chain,
            out,
            underwriter_key,
            inputs,
            outputs,
        } => {
            let config = load_chain(&chain)?;
            let key = read_signing_key(ops, &underwriter_key, env.passphrases)?;
            let tx = assemble_expenditure(config.protocol_magic, inputs, outputs, &key)?;
            write_tx(&out, &tx, env)?;
        }
    }
    Ok(())
}
