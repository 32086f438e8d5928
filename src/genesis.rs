//! Genesis data: generation, reading, hashing and dumping
//!
//! A genesis file is pretty-printed JSON. Its hash is the SHA-256 of the
//! canonical encoding of the same document: compact JSON with object keys in
//! sorted order. Reformatting the file therefore does not change the hash.

use crate::crypto::{
    render_hash, sha256, Address, ProtocolMagic, RequiresNetworkMagic, Sha256Hash, SigningKey,
    StakeholderId,
};
use crate::delegation::{check_delegation_certificate, issue_delegation_certificate, Certificate, EpochNumber};
use crate::error::{CliError, Result};
use crate::keys::ProtectedSigningKey;
use crate::ops::CliOps;
use crate::persistence::{
    ensure_new_directory, write_new_file, FileMode, GenesisFile, InputFile, NewDirectory, NewFile,
    ProtocolParametersFile,
};
use crate::transaction::{Lovelace, MAX_LOVELACE};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const GENESIS_JSON: &str = "genesis.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Security parameter: the maximum rollback depth in blocks.
    pub k: u64,
    pub protocol_magic: u32,
    #[serde(default)]
    pub requires_network_magic: RequiresNetworkMagic,
}

/// Block-version data: the initial protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParameters {
    pub script_version: u16,
    pub slot_duration_ms: u64,
    pub max_block_size: u64,
    pub max_header_size: u64,
    pub max_tx_size: u64,
    pub max_proposal_size: u64,
    pub heavy_del_thd: u64,
    pub update_vote_thd: u64,
    pub tx_fee_summand: u64,
    pub tx_fee_multiplier: u64,
    pub unlock_stake_epoch: u64,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            script_version: 0,
            slot_duration_ms: 20_000,
            max_block_size: 2_000_000,
            max_header_size: 2_000_000,
            max_tx_size: 4_096,
            max_proposal_size: 700,
            heavy_del_thd: 300_000_000_000,
            update_vote_thd: 1_000_000_000_000,
            tx_fee_summand: 155_381,
            tx_fee_multiplier: 43_946_000,
            unlock_stake_epoch: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisData {
    pub protocol_consts: ProtocolConstants,
    pub start_time: DateTime<Utc>,
    pub block_version_data: ProtocolParameters,
    pub boot_stakeholders: BTreeMap<StakeholderId, u16>,
    pub heavy_delegation: BTreeMap<StakeholderId, Certificate>,
    pub non_avvm_balances: BTreeMap<Address, Lovelace>,
}

impl GenesisData {
    pub fn protocol_magic(&self) -> ProtocolMagic {
        ProtocolMagic::new(
            self.protocol_consts.protocol_magic,
            self.protocol_consts.requires_network_magic,
        )
    }

    pub fn total_balance(&self) -> Option<Lovelace> {
        self.non_avvm_balances
            .values()
            .try_fold(Lovelace::default(), |acc, amount| acc.checked_add(*amount))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenesisHash(pub Sha256Hash);

impl fmt::Display for GenesisHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_hash(&self.0))
    }
}

impl fmt::Debug for GenesisHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenesisHash({})", self)
    }
}

impl FromStr for GenesisHash {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CliError::Config(format!("Invalid genesis hash '{}': {}", s, e)))?;
        let bytes: Sha256Hash = bytes.try_into().map_err(|v: Vec<u8>| {
            CliError::Config(format!("Genesis hash must be 32 bytes, got {}", v.len()))
        })?;
        Ok(GenesisHash(bytes))
    }
}

/// Inputs to [`mk_genesis`].
#[derive(Debug, Clone)]
pub struct GenesisParameters {
    pub start_time: DateTime<Utc>,
    pub protocol_parameters: ProtocolParameters,
    pub k: u64,
    pub protocol_magic: ProtocolMagic,
    /// Number of rich stakeholder keys, each delegating to its own delegate key.
    pub n_genesis_keys: usize,
    pub n_poor: usize,
    pub total_balance: Lovelace,
    /// Fraction of the total balance given to the rich keys.
    pub delegate_share: f64,
    /// Fixes the key material; generation is reproducible under the same seed.
    pub seed: Option<u64>,
}

/// Key material produced alongside genesis data.
#[derive(Debug, Clone, Default)]
pub struct GeneratedSecrets {
    pub genesis_keys: Vec<SigningKey>,
    pub delegate_keys: Vec<SigningKey>,
    pub poor_keys: Vec<SigningKey>,
    pub certificates: Vec<Certificate>,
}

fn canonical_hash(value: &Value) -> Result<GenesisHash> {
    // serde_json::Map is ordered by key without the preserve_order feature
    let canonical = serde_json::to_vec(value)?;
    Ok(GenesisHash(sha256(&[&canonical])))
}

pub fn genesis_hash(data: &GenesisData) -> Result<GenesisHash> {
    canonical_hash(&serde_json::to_value(data)?)
}

/// Pretty JSON with a trailing newline.
pub fn encode_genesis(data: &GenesisData) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(data)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Checks internal consistency: heavy delegation must be issued by boot
/// stakeholders, under this chain's magic, with valid signatures.
pub fn validate_genesis(data: &GenesisData) -> Result<()> {
    if data.protocol_consts.k == 0 {
        return Err(CliError::GenesisRead("k must be positive".to_string()));
    }

    let magic = data.protocol_magic();
    for (stakeholder, cert) in &data.heavy_delegation {
        if cert.issuer.stakeholder_id() != *stakeholder {
            return Err(CliError::GenesisRead(format!(
                "heavy delegation entry {} is keyed by the wrong stakeholder",
                stakeholder
            )));
        }
        if !data.boot_stakeholders.contains_key(stakeholder) {
            return Err(CliError::GenesisRead(format!(
                "heavy delegation issuer {} is not a boot stakeholder",
                stakeholder
            )));
        }
        check_delegation_certificate(cert, magic, &cert.issuer, &cert.delegate).map_err(|e| {
            CliError::GenesisRead(format!("heavy delegation for {}: {}", stakeholder, e))
        })?;
    }

    if data.total_balance().is_none() {
        return Err(CliError::GenesisRead(format!(
            "genesis balances exceed the maximum supply of {}",
            MAX_LOVELACE
        )));
    }
    Ok(())
}

pub fn read_genesis(file: &GenesisFile) -> Result<(GenesisData, GenesisHash)> {
    let text = file.read_string()?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        CliError::GenesisRead(format!("{} is not valid JSON: {}", file.path().display(), e))
    })?;
    let hash = canonical_hash(&value)?;
    let data: GenesisData = serde_json::from_value(value).map_err(|e| {
        CliError::GenesisRead(format!("{}: {}", file.path().display(), e))
    })?;
    validate_genesis(&data)?;

    debug!(
        "Read genesis {} ({} boot stakeholders, {} balances)",
        file.path().display(),
        data.boot_stakeholders.len(),
        data.non_avvm_balances.len()
    );
    Ok((data, hash))
}

pub fn read_protocol_parameters(file: &ProtocolParametersFile) -> Result<ProtocolParameters> {
    let text = file.read_string()?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::GenesisBuild(format!(
            "Invalid protocol parameters in {}: {}",
            file.path().display(),
            e
        ))
    })
}

/// Splits `total` into `n` parts; the remainder goes to the first part.
fn divide(total: u64, n: usize) -> Vec<Lovelace> {
    if n == 0 {
        return Vec::new();
    }
    let base = total / n as u64;
    let remainder = total % n as u64;
    (0..n)
        .map(|i| Lovelace(if i == 0 { base + remainder } else { base }))
        .collect()
}

fn check_parameters(params: &GenesisParameters) -> Result<()> {
    if params.k == 0 {
        return Err(CliError::GenesisBuild("k must be positive".to_string()));
    }
    if params.n_genesis_keys == 0 {
        return Err(CliError::GenesisBuild(
            "at least one genesis key is required".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&params.delegate_share) {
        return Err(CliError::GenesisBuild(format!(
            "delegate share must lie in [0, 1], got {}",
            params.delegate_share
        )));
    }
    if params.total_balance.0 > MAX_LOVELACE {
        return Err(CliError::GenesisBuild(format!(
            "total balance {} exceeds the maximum supply of {}",
            params.total_balance, MAX_LOVELACE
        )));
    }
    Ok(())
}

/// Generates genesis data together with the keys it refers to.
pub fn mk_genesis(params: &GenesisParameters) -> Result<(GenesisData, GeneratedSecrets)> {
    check_parameters(params)?;

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let network = params.protocol_magic.network_magic();

    let total = params.total_balance.0;
    let rich_total = if params.n_poor == 0 {
        total
    } else {
        ((total as f64 * params.delegate_share) as u64).min(total)
    };

    let mut secrets = GeneratedSecrets::default();
    let mut boot_stakeholders = BTreeMap::new();
    let mut heavy_delegation = BTreeMap::new();
    let mut balances = BTreeMap::new();

    for share in divide(rich_total, params.n_genesis_keys) {
        let genesis_key = SigningKey::from_rng(&mut rng);
        let delegate_key = SigningKey::from_rng(&mut rng);
        let issuer = genesis_key.verification_key();
        let cert = issue_delegation_certificate(
            params.protocol_magic,
            EpochNumber(0),
            &genesis_key,
            &delegate_key.verification_key(),
        );

        let stakeholder = issuer.stakeholder_id();
        boot_stakeholders.insert(stakeholder, 1u16);
        heavy_delegation.insert(stakeholder, cert.clone());
        balances.insert(Address::from_verification_key(&issuer, network), share);

        secrets.genesis_keys.push(genesis_key);
        secrets.delegate_keys.push(delegate_key);
        secrets.certificates.push(cert);
    }

    for share in divide(total - rich_total, params.n_poor) {
        let poor_key = SigningKey::from_rng(&mut rng);
        balances.insert(
            Address::from_verification_key(&poor_key.verification_key(), network),
            share,
        );
        secrets.poor_keys.push(poor_key);
    }

    let data = GenesisData {
        protocol_consts: ProtocolConstants {
            k: params.k,
            protocol_magic: params.protocol_magic.id,
            requires_network_magic: params.protocol_magic.requires_network_magic,
        },
        start_time: params.start_time,
        block_version_data: params.protocol_parameters.clone(),
        boot_stakeholders,
        heavy_delegation,
        non_avvm_balances: balances,
    };
    info!(
        "Generated genesis: {} genesis keys, {} poor keys, magic {}",
        secrets.genesis_keys.len(),
        secrets.poor_keys.len(),
        params.protocol_magic.id
    );
    Ok((data, secrets))
}

/// The built-in genesis, usable without any input file.
pub fn hardcoded_genesis() -> Result<GenesisData> {
    let start_time = Utc
        .timestamp_opt(1_506_203_091, 0)
        .single()
        .ok_or_else(|| CliError::GenesisBuild("invalid hard-coded start time".to_string()))?;

    Ok(GenesisData {
        protocol_consts: ProtocolConstants {
            k: 2160,
            protocol_magic: 764_824_073,
            requires_network_magic: RequiresNetworkMagic::RequiresNoMagic,
        },
        start_time,
        block_version_data: ProtocolParameters::default(),
        boot_stakeholders: BTreeMap::new(),
        heavy_delegation: BTreeMap::new(),
        non_avvm_balances: BTreeMap::new(),
    })
}

fn numbered(prefix: &str, index: usize, extension: &str) -> String {
    format!("{}.{:03}.{}", prefix, index, extension)
}

/// One encoded file of a genesis dump, not yet on disk.
struct StagedFile {
    name: String,
    bytes: Vec<u8>,
    mode: FileMode,
}

fn stage_keys(
    ops: &dyn CliOps,
    prefix: &str,
    keys: &[SigningKey],
    staged: &mut Vec<StagedFile>,
) -> Result<()> {
    for (i, key) in keys.iter().enumerate() {
        staged.push(StagedFile {
            name: numbered(prefix, i, "key"),
            bytes: ops.serialise_signing_key(&ProtectedSigningKey::unprotected(key.clone()))?,
            mode: FileMode::Secret,
        });
    }
    Ok(())
}

fn stage_genesis(
    ops: &dyn CliOps,
    data: &GenesisData,
    secrets: &GeneratedSecrets,
) -> Result<Vec<StagedFile>> {
    let mut staged = vec![StagedFile {
        name: GENESIS_JSON.to_string(),
        bytes: encode_genesis(data)?,
        mode: FileMode::Public,
    }];
    stage_keys(ops, "genesis-keys", &secrets.genesis_keys, &mut staged)?;
    stage_keys(ops, "delegate-keys", &secrets.delegate_keys, &mut staged)?;
    stage_keys(ops, "poor-keys", &secrets.poor_keys, &mut staged)?;
    for (i, cert) in secrets.certificates.iter().enumerate() {
        staged.push(StagedFile {
            name: numbered("delegation-cert", i, "cert"),
            bytes: ops.serialise_delegation_cert(cert)?,
            mode: FileMode::Public,
        });
    }
    Ok(staged)
}

fn write_staged(root: &Path, staged: &[StagedFile]) -> Result<()> {
    for file in staged {
        write_new_file(&root.join(&file.name), &file.bytes, file.mode)?;
    }
    Ok(())
}

/// Writes `genesis.json` and every generated secret into a new directory.
///
/// Keys and certificates use `ops`' formats; keys are written unprotected.
/// Everything is encoded before the directory is created, and a failed write
/// removes the directory again.
pub fn dump_genesis(
    ops: &dyn CliOps,
    dir: &NewDirectory,
    data: &GenesisData,
    secrets: &GeneratedSecrets,
) -> Result<GenesisHash> {
    let hash = genesis_hash(data)?;
    let staged = stage_genesis(ops, data, secrets)?;

    ensure_new_directory(dir)?;
    let root = dir.path();
    if let Err(e) = write_staged(root, &staged) {
        if let Err(cleanup) = std::fs::remove_dir_all(root) {
            warn!("Could not remove partial genesis {}: {}", root.display(), cleanup);
        }
        return Err(e);
    }

    info!(
        "Wrote genesis with {} files to {} (hash {})",
        staged.len(),
        root.display(),
        hash
    );
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{read_signing_key, EncodedSigningKey, NoPassphrase};
    use crate::ops::{Protocol, RealPbftOps};
    use crate::persistence::SigningKeyFile;
    use tempfile::TempDir;

    fn params(seed: Option<u64>) -> GenesisParameters {
        GenesisParameters {
            start_time: Utc.timestamp_opt(1_600_000_000, 0).single().unwrap(),
            protocol_parameters: ProtocolParameters::default(),
            k: 10,
            protocol_magic: ProtocolMagic::new(459045235, RequiresNetworkMagic::RequiresMagic),
            n_genesis_keys: 3,
            n_poor: 4,
            total_balance: Lovelace(1_000_003),
            delegate_share: 0.9,
            seed,
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let (a, _) = mk_genesis(&params(Some(7))).unwrap();
        let (b, _) = mk_genesis(&params(Some(7))).unwrap();
        let (c, _) = mk_genesis(&params(Some(8))).unwrap();
        assert_eq!(a, b);
        assert_eq!(genesis_hash(&a).unwrap(), genesis_hash(&b).unwrap());
        assert_ne!(a, c);
    }

    #[test]
    fn test_generated_genesis_is_consistent() {
        let (data, secrets) = mk_genesis(&params(Some(1))).unwrap();
        assert_eq!(data.boot_stakeholders.len(), 3);
        assert_eq!(data.heavy_delegation.len(), 3);
        assert_eq!(data.non_avvm_balances.len(), 7);
        assert_eq!(data.total_balance(), Some(Lovelace(1_000_003)));
        assert_eq!(secrets.certificates.len(), 3);
        assert!(validate_genesis(&data).is_ok());
    }

    #[test]
    fn test_bad_parameters_are_build_errors() {
        let mut p = params(Some(1));
        p.n_genesis_keys = 0;
        assert!(matches!(mk_genesis(&p), Err(CliError::GenesisBuild(_))));

        let mut p = params(Some(1));
        p.delegate_share = 1.5;
        assert!(matches!(mk_genesis(&p), Err(CliError::GenesisBuild(_))));

        let mut p = params(Some(1));
        p.total_balance = Lovelace(MAX_LOVELACE + 1);
        assert!(matches!(mk_genesis(&p), Err(CliError::GenesisBuild(_))));
    }

    #[test]
    fn test_dump_then_read() {
        let dir = TempDir::new().unwrap();
        let out = NewDirectory(dir.path().join("genesis"));
        let (data, secrets) = mk_genesis(&params(Some(3))).unwrap();

        let hash = dump_genesis(&RealPbftOps, &out, &data, &secrets).unwrap();
        let (read, read_hash) = read_genesis(&GenesisFile(out.0.join(GENESIS_JSON))).unwrap();
        assert_eq!(read, data);
        assert_eq!(read_hash, hash);

        let key = read_signing_key(
            &RealPbftOps,
            &SigningKeyFile(out.0.join("genesis-keys.000.key")),
            &NoPassphrase,
        )
        .unwrap();
        assert_eq!(
            key.verification_key(),
            secrets.genesis_keys[0].verification_key()
        );
        assert!(out.0.join("delegation-cert.002.cert").exists());
        assert!(out.0.join("poor-keys.003.key").exists());

        assert!(matches!(
            dump_genesis(&RealPbftOps, &out, &data, &secrets),
            Err(CliError::OutputMustNotAlreadyExist(_))
        ));
    }

    /// Encodes keys like real-pbft but cannot encode certificates.
    struct CertEncodingFails;

    impl CliOps for CertEncodingFails {
        fn protocol(&self) -> Protocol {
            Protocol::RealPbft
        }

        fn serialise_signing_key(&self, key: &ProtectedSigningKey) -> Result<Vec<u8>> {
            RealPbftOps.serialise_signing_key(key)
        }

        fn deserialise_signing_key(&self, bytes: &[u8]) -> Result<EncodedSigningKey> {
            RealPbftOps.deserialise_signing_key(bytes)
        }

        fn serialise_delegation_cert(&self, _cert: &Certificate) -> Result<Vec<u8>> {
            Err(CliError::Serialization("certificate encoder unavailable".to_string()))
        }

        fn deserialise_delegation_cert(&self, bytes: &[u8]) -> Result<Certificate> {
            RealPbftOps.deserialise_delegation_cert(bytes)
        }
    }

    #[test]
    fn test_failed_dump_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let out = NewDirectory(dir.path().join("genesis"));
        let (data, secrets) = mk_genesis(&params(Some(4))).unwrap();

        let err = dump_genesis(&CertEncodingFails, &out, &data, &secrets).unwrap_err();
        assert!(matches!(err, CliError::Serialization(_)));
        assert!(!out.0.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // the same target is still usable afterwards
        dump_genesis(&RealPbftOps, &out, &data, &secrets).unwrap();
        assert!(out.0.join(GENESIS_JSON).exists());
    }

    #[test]
    fn test_reformatting_keeps_hash() {
        let dir = TempDir::new().unwrap();
        let data = hardcoded_genesis().unwrap();
        let compact = dir.path().join("compact.json");
        std::fs::write(&compact, serde_json::to_vec(&data).unwrap()).unwrap();

        let (_, hash) = read_genesis(&GenesisFile(compact)).unwrap();
        assert_eq!(hash, genesis_hash(&data).unwrap());
        assert_eq!(hash, genesis_hash(&hardcoded_genesis().unwrap()).unwrap());
    }

    #[test]
    fn test_misattributed_delegation_is_rejected() {
        let (mut data, _) = mk_genesis(&params(Some(4))).unwrap();
        let mut entries: Vec<_> = data.heavy_delegation.clone().into_iter().collect();
        let (first_sid, first_cert) = entries.remove(0);
        let (second_sid, second_cert) = entries.remove(0);
        data.heavy_delegation.insert(first_sid, second_cert);
        data.heavy_delegation.insert(second_sid, first_cert);

        assert!(matches!(
            validate_genesis(&data),
            Err(CliError::GenesisRead(_))
        ));
    }

    #[test]
    fn test_malformed_genesis_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, b"{\"protocol_consts\": 5}").unwrap();
        assert!(matches!(
            read_genesis(&GenesisFile(path)),
            Err(CliError::GenesisRead(_))
        ));
    }

    #[test]
    fn test_genesis_hash_parses_back() {
        let hash = genesis_hash(&hardcoded_genesis().unwrap()).unwrap();
        assert_eq!(hash.to_string().parse::<GenesisHash>().unwrap(), hash);
        assert!("zz".parse::<GenesisHash>().is_err());
    }
}
