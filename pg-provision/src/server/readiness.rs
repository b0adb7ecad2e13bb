//! Readiness polling
//!
//! A bounded, fixed-interval loop over [`ServerControl::probe`]. Sleeping goes
//! through the [`Sleep`] seam so tests can run the full budget instantly.

use super::control::{Readiness, ServerControl};
use crate::error::ProvisionError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Probe budget before giving up
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 20;

/// Pause between probes
pub const DEFAULT_READINESS_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the server to accept connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_READINESS_ATTEMPTS,
            interval: DEFAULT_READINESS_INTERVAL,
        }
    }
}

/// Something that can pause the current task
#[allow(async_fn_in_trait)]
pub trait Sleep {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll until the server accepts connections.
///
/// Returns the 1-based attempt that succeeded. After `max_attempts` failed
/// probes the run is over: [`ProvisionError::ReadinessTimeout`]. The interval
/// is slept between probes only, never after the last one. A probe that cannot
/// be executed at all aborts immediately.
pub async fn wait_until_ready<S, Z>(
    server: &S,
    sleeper: &Z,
    policy: ReadinessPolicy,
) -> Result<u32, ProvisionError>
where
    S: ServerControl,
    Z: Sleep,
{
    info!(
        max_attempts = policy.max_attempts,
        interval_ms = policy.interval.as_millis() as u64,
        "Waiting for PostgreSQL to accept connections"
    );

    for attempt in 1..=policy.max_attempts {
        match server.probe().await? {
            Readiness::Accepting => {
                info!(attempt, "PostgreSQL is accepting connections");
                return Ok(attempt);
            }
            readiness => {
                debug!(attempt, ?readiness, "PostgreSQL not ready");
                if attempt % 5 == 0 {
                    warn!(
                        attempt,
                        max = policy.max_attempts,
                        "Still waiting for PostgreSQL"
                    );
                }
            }
        }

        if attempt < policy.max_attempts {
            sleeper.sleep(policy.interval).await;
        }
    }

    Err(ProvisionError::ReadinessTimeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Ready after `ready_after` probes; `None` never becomes ready
    struct ScriptedServer {
        ready_after: Option<u32>,
        probes: Cell<u32>,
    }

    impl ScriptedServer {
        fn new(ready_after: Option<u32>) -> Self {
            Self {
                ready_after,
                probes: Cell::new(0),
            }
        }
    }

    impl ServerControl for ScriptedServer {
        async fn probe(&self) -> Result<Readiness, ProvisionError> {
            let n = self.probes.get() + 1;
            self.probes.set(n);
            match self.ready_after {
                Some(ready) if n >= ready => Ok(Readiness::Accepting),
                _ => Ok(Readiness::Rejecting),
            }
        }

        async fn postmaster_alive(&self) -> Result<bool, ProvisionError> {
            Ok(true)
        }

        async fn is_initialized(&self) -> Result<bool, ProvisionError> {
            Ok(true)
        }

        async fn initialize(&self) -> Result<(), ProvisionError> {
            Ok(())
        }

        async fn start(&self) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSleep(RefCell<Vec<Duration>>);

    impl Sleep for RecordingSleep {
        async fn sleep(&self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    #[test]
    fn default_policy_is_twenty_one_second_probes() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn returns_on_first_success() {
        let server = ScriptedServer::new(Some(3));
        let sleeper = RecordingSleep::default();

        let attempt = wait_until_ready(&server, &sleeper, ReadinessPolicy::default())
            .await
            .unwrap();

        assert_eq!(attempt, 3);
        assert_eq!(server.probes.get(), 3);
        assert_eq!(
            *sleeper.0.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn gives_up_after_exact_budget() {
        let server = ScriptedServer::new(None);
        let sleeper = RecordingSleep::default();

        let err = wait_until_ready(&server, &sleeper, ReadinessPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ReadinessTimeout { attempts: 20 }));
        assert_eq!(server.probes.get(), 20);
        assert_eq!(sleeper.0.borrow().len(), 19);
    }

    #[tokio::test]
    async fn zero_budget_times_out_without_probing() {
        let server = ScriptedServer::new(Some(1));
        let sleeper = RecordingSleep::default();
        let policy = ReadinessPolicy {
            max_attempts: 0,
            interval: Duration::from_millis(10),
        };

        let err = wait_until_ready(&server, &sleeper, policy).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ReadinessTimeout { attempts: 0 }));
        assert_eq!(server.probes.get(), 0);
    }
}
