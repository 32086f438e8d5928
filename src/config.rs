//! Chain configuration: which genesis to use and how to interpret it

use crate::crypto::{ProtocolMagic, RequiresNetworkMagic};
use crate::error::{CliError, Result};
use crate::genesis::{genesis_hash, hardcoded_genesis, read_genesis, GenesisData, GenesisHash};
use crate::persistence::GenesisFile;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk TOML configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub genesis: GenesisConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenesisConfig {
    /// Genesis JSON; relative paths resolve against the config file's directory.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Expected genesis hash (hex). Checked when present.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub requires_network_magic: Option<RequiresNetworkMagic>,
}

/// A loaded configuration file together with the directory it came from.
#[derive(Debug, Default)]
pub struct BaseConfig {
    pub file: ConfigFile,
    pub dir: PathBuf,
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOverrides {
    pub genesis_file: Option<PathBuf>,
    pub genesis_hash: Option<String>,
    pub requires_network_magic: Option<RequiresNetworkMagic>,
}

/// Everything a command needs to know about the chain it acts on.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub genesis: GenesisData,
    pub genesis_hash: GenesisHash,
    pub protocol_magic: ProtocolMagic,
}

pub fn load_config(path: &Path) -> Result<BaseConfig> {
    let config_str =
        fs::read_to_string(path).map_err(|e| CliError::read(path, e))?;
    let file: ConfigFile = toml::from_str(&config_str)
        .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;

    // Validate critical values
    if let Some(genesis) = &file.genesis.file {
        if genesis.as_os_str().is_empty() {
            return Err(CliError::Config(format!(
                "genesis.file must not be empty in {}",
                path.display()
            )));
        }
    }

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    debug!("Loaded configuration from {}", path.display());
    Ok(BaseConfig { file, dir })
}

/// Resolves the genesis and protocol magic, applying `overrides` over `base`.
///
/// Without any genesis file the hard-coded genesis is used.
pub fn build_configuration(base: &BaseConfig, overrides: &CommonOverrides) -> Result<ChainConfig> {
    let genesis_file = match (&overrides.genesis_file, &base.file.genesis.file) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(path)) if path.is_relative() => Some(base.dir.join(path)),
        (None, Some(path)) => Some(path.clone()),
        (None, None) => None,
    };

    let (genesis, hash) = match genesis_file {
        Some(path) => read_genesis(&GenesisFile(path))?,
        None => {
            let genesis = hardcoded_genesis()?;
            let hash = genesis_hash(&genesis)?;
            (genesis, hash)
        }
    };

    let expected = overrides
        .genesis_hash
        .as_ref()
        .or(base.file.genesis.hash.as_ref());
    if let Some(expected) = expected {
        let expected: GenesisHash = expected.parse()?;
        if expected != hash {
            return Err(CliError::Config(format!(
                "genesis hash mismatch: expected {}, file has {}",
                expected, hash
            )));
        }
    }

    let requires_network_magic = overrides
        .requires_network_magic
        .or(base.file.genesis.requires_network_magic)
        .unwrap_or(genesis.protocol_consts.requires_network_magic);
    let protocol_magic = ProtocolMagic::new(genesis.protocol_consts.protocol_magic, requires_network_magic);

    info!(
        "Using genesis {} with protocol magic {}",
        hash, protocol_magic.id
    );
    Ok(ChainConfig {
        genesis,
        genesis_hash: hash,
        protocol_magic,
    })
}
