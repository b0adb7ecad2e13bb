//! Local PostgreSQL server management
//!
//! This module brings the server to a state where it accepts connections:
//! - Binary discovery under the versioned installation root
//! - State inspection and control through the [`ServerControl`] seam
//! - Bounded readiness polling
//! - The lifecycle that picks initialize/start/wait from the observed state

mod binaries;
mod control;
mod lifecycle;
mod readiness;

pub use binaries::{PgBinaries, REQUIRED_BINARIES};
pub use control::{
    parse_postmaster_pid, LocalServer, PostmasterPid, Readiness, ServerControl, ServerState,
};
pub use lifecycle::{detect_state, ensure_running, ServerStartup};
pub use readiness::{
    wait_until_ready, ReadinessPolicy, Sleep, TokioSleep, DEFAULT_READINESS_ATTEMPTS,
    DEFAULT_READINESS_INTERVAL,
};
