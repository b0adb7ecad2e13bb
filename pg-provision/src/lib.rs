//! Idempotent local PostgreSQL provisioning
//!
//! Brings a single local PostgreSQL instance from any starting state
//! (uninitialized, stopped, starting, ready) to a known target: an application
//! role, its database and schema privileges, a set of extensions, and
//! connection artifacts for clients. Every run converges to the same state.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod server;
pub mod sql;

pub use artifacts::{write_artifacts, Artifacts, CONNECTION_FILE, ENV_FILE};
pub use config::{ProvisionConfig, RoleSettings};
pub use error::{ProvisionError, Stage};
pub use pipeline::{provision, run, ProvisionReport};
pub use provision::{Convergence, Provisioner};
pub use server::{ReadinessPolicy, ServerState};
