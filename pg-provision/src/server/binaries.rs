//! PostgreSQL binary discovery
//!
//! Distribution packages install one directory per major version, e.g.
//! `/usr/lib/postgresql/16/bin`. The highest version wins.

use crate::error::ProvisionError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Executables the provisioner invokes
pub const REQUIRED_BINARIES: [&str; 4] = ["initdb", "pg_ctl", "pg_isready", "psql"];

/// A resolved PostgreSQL binary directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgBinaries {
    version: Option<String>,
    bin_dir: PathBuf,
}

impl PgBinaries {
    /// Use `bin_dir` when given, otherwise discover the newest version under `pg_root`.
    pub fn resolve(pg_root: &Path, bin_dir: Option<&Path>) -> Result<Self, ProvisionError> {
        match bin_dir {
            Some(dir) => Self::from_bin_dir(dir, None),
            None => Self::discover(pg_root),
        }
    }

    /// Pick the highest numbered version directory under `root` that has a `bin/`.
    ///
    /// An empty or missing root is a fatal configuration error.
    pub fn discover(root: &Path) -> Result<Self, ProvisionError> {
        let no_installation = || ProvisionError::NoInstallation {
            root: root.to_path_buf(),
        };

        let entries = fs_err::read_dir(root).map_err(|e| {
            debug!(error = %e, "Cannot list PostgreSQL root");
            no_installation()
        })?;

        let newest = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = version_key(&name)?;
                let bin_dir = entry.path().join("bin");
                bin_dir.is_dir().then_some((key, name, bin_dir))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .ok_or_else(no_installation)?;

        let (_, version, bin_dir) = newest;
        info!(version = %version, bin_dir = %bin_dir.display(), "Found PostgreSQL installation");
        Self::from_bin_dir(&bin_dir, Some(version))
    }

    /// Accept `dir` if every required executable is present.
    pub fn from_bin_dir(dir: &Path, version: Option<String>) -> Result<Self, ProvisionError> {
        for name in REQUIRED_BINARIES {
            if !dir.join(name).is_file() {
                return Err(ProvisionError::BinaryNotFound {
                    name: name.to_string(),
                    bin_dir: dir.to_path_buf(),
                });
            }
        }

        Ok(Self {
            version,
            bin_dir: dir.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_bin_dir_unchecked(dir: &Path) -> Self {
        Self {
            version: None,
            bin_dir: dir.to_path_buf(),
        }
    }

    /// Version directory name, when discovered rather than given explicitly
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    pub fn initdb(&self) -> PathBuf {
        self.path("initdb")
    }

    pub fn pg_ctl(&self) -> PathBuf {
        self.path("pg_ctl")
    }

    pub fn pg_isready(&self) -> PathBuf {
        self.path("pg_isready")
    }

    pub fn psql(&self) -> PathBuf {
        self.path("psql")
    }
}

/// Numeric sort key for a version directory name: `"9.6"` -> `[9, 6]`.
/// Names that are not dotted numbers are skipped.
fn version_key(name: &str) -> Option<Vec<u32>> {
    name.split('.').map(|part| part.parse().ok()).collect()
}
