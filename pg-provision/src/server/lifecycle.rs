//! Server lifecycle
//!
//! Classifies the server into one of the four [`ServerState`]s and performs
//! only the transitions that state still needs.

use super::control::{Readiness, ServerControl, ServerState};
use super::readiness::{wait_until_ready, ReadinessPolicy, Sleep};
use crate::error::ProvisionError;
use tracing::info;

/// What `ensure_running` found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStartup {
    pub initial_state: ServerState,
    /// Readiness probes spent in the wait loop; 0 when already ready
    pub readiness_attempts: u32,
}

/// Work out which state the server is in.
///
/// A server that answers but rejects connections, or whose postmaster is
/// alive on our port, is still starting. Otherwise the `PG_VERSION` marker
/// separates an initialized data directory from a fresh one.
pub async fn detect_state<S: ServerControl>(server: &S) -> Result<ServerState, ProvisionError> {
    match server.probe().await? {
        Readiness::Accepting => return Ok(ServerState::Ready),
        Readiness::Rejecting => return Ok(ServerState::Starting),
        Readiness::NoResponse => {}
    }

    if server.postmaster_alive().await? {
        Ok(ServerState::Starting)
    } else if server.is_initialized().await? {
        Ok(ServerState::Stopped)
    } else {
        Ok(ServerState::Uninitialized)
    }
}

/// Bring the server to the ready state from wherever it is.
pub async fn ensure_running<S, Z>(
    server: &S,
    sleeper: &Z,
    policy: ReadinessPolicy,
) -> Result<ServerStartup, ProvisionError>
where
    S: ServerControl,
    Z: Sleep,
{
    let initial_state = detect_state(server).await?;
    info!(state = %initial_state, "Detected server state");

    match initial_state {
        ServerState::Ready => {
            return Ok(ServerStartup {
                initial_state,
                readiness_attempts: 0,
            });
        }
        ServerState::Starting => {
            info!("Server already starting, skipping initialization and start");
        }
        ServerState::Stopped => {
            server.start().await?;
        }
        ServerState::Uninitialized => {
            server.initialize().await?;
            server.start().await?;
        }
    }

    let readiness_attempts = wait_until_ready(server, sleeper, policy).await?;

    Ok(ServerStartup {
        initial_state,
        readiness_attempts,
    })
}
