//! Artifact persistence: role-tagged paths and the no-clobber writer
//!
//! Every artifact this tool produces is written exactly once through
//! [`ensure_new_file`]. The payload is encoded in memory first, the target is
//! checked for absence, and the bytes land through a temp file in the same
//! directory that is persisted with a no-clobber link. An existing target is
//! reported as [`CliError::OutputMustNotAlreadyExist`] whether it was seen by
//! the pre-check or appeared concurrently; it is never overwritten.

use crate::error::{CliError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// An output path that must not exist at the time of its single write.
pub trait NewFile {
    fn path(&self) -> &Path;
}

/// An existing input path. Never checked for existence before reading.
pub trait InputFile {
    fn path(&self) -> &Path;

    fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(self.path()).map_err(|e| CliError::read(self.path(), e))
    }

    fn read_string(&self) -> Result<String> {
        fs::read_to_string(self.path()).map_err(|e| CliError::read(self.path(), e))
    }
}

macro_rules! path_marker {
    ($(#[$meta:meta])* $name:ident, $role:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub PathBuf);

        impl $role for $name {
            fn path(&self) -> &Path {
                &self.0
            }
        }

        impl From<PathBuf> for $name {
            fn from(path: PathBuf) -> Self {
                $name(path)
            }
        }
    };
}

path_marker!(NewDirectory, NewFile);
path_marker!(NewSigningKeyFile, NewFile);
path_marker!(NewVerificationKeyFile, NewFile);
path_marker!(NewCertificateFile, NewFile);
path_marker!(NewTxFile, NewFile);

path_marker!(SigningKeyFile, InputFile);
path_marker!(VerificationKeyFile, InputFile);
path_marker!(CertificateFile, InputFile);
path_marker!(TxFile, InputFile);
path_marker!(GenesisFile, InputFile);
path_marker!(TopologyFile, InputFile);
path_marker!(
    /// A JSON file of protocol parameters consumed by genesis generation.
    ProtocolParametersFile,
    InputFile
);

/// Permission class of a written artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Readable by the owner only (signing keys).
    Secret,
    Public,
}

fn target_exists(path: &Path) -> bool {
    // symlink_metadata so that a dangling symlink also counts as present
    fs::symlink_metadata(path).is_ok()
}

/// Encodes `payload` with `encode`, then writes it to `path` only if nothing
/// exists there yet.
pub fn ensure_new_file<T: ?Sized, F>(
    encode: F,
    path: &Path,
    payload: &T,
    mode: FileMode,
) -> Result<()>
where
    F: FnOnce(&T) -> Result<Vec<u8>>,
{
    let bytes = encode(payload)?;
    write_new_file(path, &bytes, mode)
}

/// Writes already-encoded bytes to `path` only if nothing exists there yet.
pub fn write_new_file(path: &Path, bytes: &[u8], mode: FileMode) -> Result<()> {
    ensure_absent(path)?;
    write_exclusive(path, bytes, mode)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Fails with [`CliError::OutputMustNotAlreadyExist`] if `path` is taken.
///
/// An early check only; the write itself still refuses to clobber.
pub fn ensure_absent(path: &Path) -> Result<()> {
    if target_exists(path) {
        return Err(CliError::OutputMustNotAlreadyExist(path.to_path_buf()));
    }
    Ok(())
}

/// Creates `dir`, failing if anything is already present at that path.
pub fn ensure_new_directory(dir: &NewDirectory) -> Result<()> {
    let path = dir.path();
    ensure_absent(path)?;
    fs::create_dir(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => CliError::OutputMustNotAlreadyExist(path.to_path_buf()),
        _ => CliError::Io(e),
    })
}

fn write_exclusive(path: &Path, bytes: &[u8], mode: FileMode) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    set_mode(temp.as_file(), mode)?;
    temp.as_file().sync_all()?;

    temp.persist_noclobber(path).map_err(|e| match e.error.kind() {
        std::io::ErrorKind::AlreadyExists => CliError::OutputMustNotAlreadyExist(path.to_path_buf()),
        _ => CliError::Io(e.error),
    })?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let bits = match mode {
        FileMode::Secret => 0o600,
        FileMode::Public => 0o644,
    };
    file.set_permissions(fs::Permissions::from_mode(bits))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: FileMode) -> Result<()> {
    Ok(())
}
