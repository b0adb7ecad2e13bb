//! End-to-end provisioning run
//!
//! Stages run strictly in order: server, readiness, role, database, schema,
//! extensions, artifacts. The first failure ends the run and artifacts are
//! only written once every database step succeeded.

use crate::artifacts::{write_artifacts, Artifacts};
use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::provision::Provisioner;
use crate::server::{
    ensure_running, LocalServer, PgBinaries, ReadinessPolicy, ServerControl, ServerState, Sleep,
    TokioSleep,
};
use crate::sql::{PsqlClient, SqlExecutor};
use common::RunAs;
use tracing::info;

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub initial_state: ServerState,
    /// Readiness probes spent waiting; 0 when the server was already up
    pub readiness_attempts: u32,
    pub role_created: bool,
    pub database_created: bool,
    pub extensions: Vec<String>,
    pub artifacts: Artifacts,
}

/// Converge the server and database described by `config`.
///
/// All side effects go through `server` and `executor`; `sleeper` paces the
/// readiness loop.
pub async fn provision<S, Z, E>(
    config: &ProvisionConfig,
    server: &S,
    sleeper: &Z,
    executor: &E,
    policy: ReadinessPolicy,
) -> Result<ProvisionReport, ProvisionError>
where
    S: ServerControl,
    Z: Sleep,
    E: SqlExecutor,
{
    let startup = ensure_running(server, sleeper, policy).await?;

    let convergence = Provisioner::new(executor, config).converge().await?;

    let artifacts = write_artifacts(config).await?;

    Ok(ProvisionReport {
        initial_state: startup.initial_state,
        readiness_attempts: startup.readiness_attempts,
        role_created: convergence.role_created,
        database_created: convergence.database_created,
        extensions: convergence.installed_extensions,
        artifacts,
    })
}

/// Run against the local PostgreSQL installation.
pub async fn run(config: &ProvisionConfig) -> Result<ProvisionReport, ProvisionError> {
    let binaries = PgBinaries::resolve(&config.pg_root, config.bin_dir.as_deref())?;
    info!(
        version = binaries.version().unwrap_or("unknown"),
        bin_dir = %binaries.bin_dir().display(),
        "Using PostgreSQL binaries"
    );

    let runner = RunAs::new(&config.service_user);
    let server = LocalServer::new(
        binaries.clone(),
        runner.clone(),
        &config.data_dir,
        &config.host,
        config.db_port,
        config.socket_dir.as_deref(),
        &config.log_file(),
    );
    let client = PsqlClient::new(
        &binaries.psql(),
        runner,
        config.db_port,
        config.socket_dir.as_deref(),
    );

    provision(
        config,
        &server,
        &TokioSleep,
        &client,
        ReadinessPolicy::default(),
    )
    .await
}
