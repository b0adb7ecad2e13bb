//! pg-provision entrypoint
//!
//! Loads configuration, converges the local PostgreSQL instance and exits 0.
//! Any failure is logged with the stage it happened in and exits 1; the run
//! can simply be repeated once the cause is fixed.

use common::init_logging;
use pg_provision::{run, ProvisionConfig, ProvisionError};
use std::time::Instant;
use tracing::{error, info};

fn fail(e: &ProvisionError) -> ! {
    error!(stage = %e.stage(), error = %e, "Provisioning failed");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let _guard = init_logging("pg-provision");

    let start = Instant::now();

    let config = match ProvisionConfig::load() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    info!(
        database = %config.db_name,
        user = %config.db_user,
        port = config.db_port,
        data_dir = %config.data_dir.display(),
        "Starting provisioning"
    );

    match run(&config).await {
        Ok(report) => {
            info!(
                initial_state = %report.initial_state,
                readiness_attempts = report.readiness_attempts,
                role_created = report.role_created,
                database_created = report.database_created,
                extensions = ?report.extensions,
                connection_file = %report.artifacts.connection_file.display(),
                env_file = %report.artifacts.env_file.display(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Provisioning complete"
            );
        }
        Err(e) => fail(&e),
    }
}
