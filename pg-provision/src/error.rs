//! Provisioning errors
//!
//! Every failure is fatal for the run. Each error names the pipeline stage it
//! came from so the operator knows where to look before re-running.

use std::fmt;
use std::path::PathBuf;

/// Pipeline stage, used in diagnostics and structured log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Discovery,
    Server,
    Readiness,
    Role,
    Database,
    Schema,
    Extensions,
    Artifacts,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Discovery => "discovery",
            Self::Server => "server",
            Self::Readiness => "readiness",
            Self::Role => "role",
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Extensions => "extensions",
            Self::Artifacts => "artifacts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a provisioning run
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Configuration could not be loaded or failed validation
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// No versioned PostgreSQL installation exists under the search root
    ///
    /// Common causes:
    /// - PostgreSQL server packages are not installed
    /// - `pgRoot` points at the wrong directory
    #[error("no PostgreSQL installation found under '{root}'")]
    NoInstallation { root: PathBuf },

    /// A required executable is missing from the resolved binary directory
    #[error("PostgreSQL binary '{name}' not found in '{bin_dir}'")]
    BinaryNotFound { name: String, bin_dir: PathBuf },

    /// Inspecting, initializing or launching the server failed
    #[error("server control failed: {message}")]
    Server { message: String },

    /// The server never accepted connections within the polling budget
    #[error("PostgreSQL did not become ready after {attempts} readiness probes")]
    ReadinessTimeout { attempts: u32 },

    /// A SQL step failed; nothing from that step was applied
    #[error("{stage} provisioning failed: {message}")]
    Sql { stage: Stage, message: String },

    /// Extensions were requested but are not installed after the extension step
    #[error("extensions missing after installation: {}", .missing.join(", "))]
    Verification { missing: Vec<String> },

    /// Writing an output file failed
    #[error("failed to write artifact '{path}'")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { .. } => Stage::Config,
            Self::NoInstallation { .. } | Self::BinaryNotFound { .. } => Stage::Discovery,
            Self::Server { .. } => Stage::Server,
            Self::ReadinessTimeout { .. } => Stage::Readiness,
            Self::Sql { stage, .. } => *stage,
            Self::Verification { .. } => Stage::Extensions,
            Self::Artifact { .. } => Stage::Artifacts,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap a helper error, keeping its whole context chain in the message.
    pub(crate) fn server(err: anyhow::Error) -> Self {
        Self::Server {
            message: format!("{:#}", err),
        }
    }

    pub(crate) fn sql(stage: Stage, err: anyhow::Error) -> Self {
        Self::Sql {
            stage,
            message: format!("{:#}", err),
        }
    }
}
