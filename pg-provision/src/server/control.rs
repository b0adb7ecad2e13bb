//! Server inspection and control
//!
//! [`ServerControl`] is the seam between the lifecycle logic and the real
//! PostgreSQL installation. [`LocalServer`] drives the packaged binaries,
//! switching to the service account where the data directory requires it.

use super::binaries::PgBinaries;
use crate::error::ProvisionError;
use anyhow::{anyhow, Context};
use common::RunAs;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Postmaster PID file name
const POSTMASTER_PID_FILE: &str = "postmaster.pid";

/// Version marker written by initdb
const PG_VERSION_FILE: &str = "PG_VERSION";

/// Account that prepares the data directory before handing it to the service account
const ADMIN_USER: &str = "root";

/// Outcome of a single readiness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Accepting connections
    Accepting,
    /// Answering but rejecting connections, typically still starting up
    Rejecting,
    /// Nothing answered on the port
    NoResponse,
}

/// Observed state of the server before provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    /// Data directory initialized, server not running
    Stopped,
    /// Server process up but not yet accepting connections
    Starting,
    Ready,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
        })
    }
}

/// Operations the lifecycle needs from a PostgreSQL server
#[allow(async_fn_in_trait)]
pub trait ServerControl {
    /// Probe whether the server accepts connections on its port.
    async fn probe(&self) -> Result<Readiness, ProvisionError>;

    /// Whether a postmaster for this data directory and port is alive.
    async fn postmaster_alive(&self) -> Result<bool, ProvisionError>;

    /// Whether the data directory carries version metadata.
    async fn is_initialized(&self) -> Result<bool, ProvisionError>;

    /// Create and initialize the data directory.
    async fn initialize(&self) -> Result<(), ProvisionError>;

    /// Launch the server detached. Does not wait for readiness.
    async fn start(&self) -> Result<(), ProvisionError>;
}

/// A PostgreSQL instance on this host, controlled through its binaries
#[derive(Debug, Clone)]
pub struct LocalServer {
    binaries: PgBinaries,
    admin: RunAs,
    runner: RunAs,
    data_dir: PathBuf,
    host: String,
    port: u16,
    socket_dir: Option<PathBuf>,
    log_file: PathBuf,
}

impl LocalServer {
    pub fn new(
        binaries: PgBinaries,
        runner: RunAs,
        data_dir: &Path,
        host: &str,
        port: u16,
        socket_dir: Option<&Path>,
        log_file: &Path,
    ) -> Self {
        Self {
            binaries,
            admin: RunAs::new(ADMIN_USER),
            runner,
            data_dir: data_dir.to_path_buf(),
            host: host.to_string(),
            port,
            socket_dir: socket_dir.map(Path::to_path_buf),
            log_file: log_file.to_path_buf(),
        }
    }

    /// Create the data directory as the admin account, then hand it to the
    /// service account with the 0700 mode initdb requires.
    fn data_dir_setup(&self) -> Vec<(&RunAs, &'static str, Vec<String>)> {
        let data_dir = self.data_dir.to_string_lossy().into_owned();
        // `user:` assigns the user's login group
        let owner = format!("{}:", self.runner.user());
        vec![
            (&self.admin, "mkdir", vec!["-p".to_string(), data_dir.clone()]),
            (
                &self.admin,
                "chown",
                vec!["-R".to_string(), owner, data_dir.clone()],
            ),
            (&self.runner, "chmod", vec!["700".to_string(), data_dir]),
        ]
    }

    /// Server options passed through `pg_ctl -o`.
    fn server_options(&self) -> String {
        match &self.socket_dir {
            Some(dir) => format!("-p {} -k {}", self.port, dir.display()),
            None => format!("-p {}", self.port),
        }
    }

    fn start_args(&self) -> Vec<String> {
        vec![
            "start".to_string(),
            "--no-wait".to_string(),
            "-D".to_string(),
            self.data_dir.to_string_lossy().into_owned(),
            "-l".to_string(),
            self.log_file.to_string_lossy().into_owned(),
            "-o".to_string(),
            self.server_options(),
        ]
    }

    /// Read a file in the data directory, falling back to the service
    /// account when the directory is not readable by the current user.
    async fn read_data_file(&self, name: &str) -> anyhow::Result<Option<String>> {
        let path = self.data_dir.join(name);
        match fs_err::tokio::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "Reading as service account");
                let path_str = path.to_string_lossy();
                let output = self.runner.run("cat", &[&path_str]).await?;
                Ok(output.success.then_some(output.stdout))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ServerControl for LocalServer {
    async fn probe(&self) -> Result<Readiness, ProvisionError> {
        let pg_isready = self.binaries.pg_isready();
        let port = self.port.to_string();
        let output = common::run(
            &pg_isready.to_string_lossy(),
            &["-q", "-h", &self.host, "-p", &port],
        )
        .await
        .map_err(ProvisionError::server)?;

        // pg_isready: 0 accepting, 1 rejecting, 2 no response, 3 no attempt made
        match output.code {
            Some(0) => Ok(Readiness::Accepting),
            Some(1) => Ok(Readiness::Rejecting),
            Some(2) => Ok(Readiness::NoResponse),
            code => Err(ProvisionError::server(anyhow!(
                "pg_isready made no connection attempt (exit {:?}): {}",
                code,
                output.stderr
            ))),
        }
    }

    async fn postmaster_alive(&self) -> Result<bool, ProvisionError> {
        let Some(content) = self
            .read_data_file(POSTMASTER_PID_FILE)
            .await
            .map_err(ProvisionError::server)?
        else {
            return Ok(false);
        };

        let Some(postmaster) = parse_postmaster_pid(&content) else {
            debug!("Unparseable postmaster.pid, treating server as down");
            return Ok(false);
        };

        if postmaster.port != Some(self.port) {
            warn!(
                pid = postmaster.pid,
                recorded_port = ?postmaster.port,
                port = self.port,
                "postmaster.pid belongs to a server on a different port"
            );
            return Ok(false);
        }

        Ok(process_exists(postmaster.pid))
    }

    async fn is_initialized(&self) -> Result<bool, ProvisionError> {
        let path = self.data_dir.join(PG_VERSION_FILE);
        match fs_err::tokio::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let path_str = path.to_string_lossy();
                let output = self
                    .runner
                    .run("test", &["-f", &path_str])
                    .await
                    .map_err(ProvisionError::server)?;
                Ok(output.success)
            }
            Err(e) => Err(ProvisionError::server(e.into())),
        }
    }

    async fn initialize(&self) -> Result<(), ProvisionError> {
        let data_dir = self.data_dir.to_string_lossy();
        let initdb = self.binaries.initdb();

        info!(data_dir = %data_dir, user = %self.runner.user(), "Initializing data directory");

        for (account, cmd, args) in self.data_dir_setup() {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            account
                .run(cmd, &args)
                .await
                .and_then(|out| out.into_checked(cmd))
                .context("Failed to prepare data directory")
                .map_err(ProvisionError::server)?;
        }

        self.runner
            .run(
                &initdb.to_string_lossy(),
                &[
                    "-D",
                    &data_dir,
                    "--encoding=UTF8",
                    "--auth-local=peer",
                    "--auth-host=scram-sha-256",
                ],
            )
            .await
            .and_then(|out| out.into_checked("initdb"))
            .map_err(ProvisionError::server)?;

        info!(data_dir = %data_dir, "Data directory initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), ProvisionError> {
        let pg_ctl = self.binaries.pg_ctl();
        let args = self.start_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        info!(
            port = self.port,
            log_file = %self.log_file.display(),
            "Starting PostgreSQL server"
        );

        // --no-wait: readiness is observed by the polling loop, not pg_ctl
        self.runner
            .run(&pg_ctl.to_string_lossy(), &args)
            .await
            .and_then(|out| out.into_checked("pg_ctl"))
            .map_err(ProvisionError::server)?;

        Ok(())
    }
}

/// Fields of `postmaster.pid` the provisioner cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostmasterPid {
    pub pid: i32,
    pub port: Option<u16>,
}

/// Parse `postmaster.pid`: line 1 is the PID, line 4 the port.
pub fn parse_postmaster_pid(content: &str) -> Option<PostmasterPid> {
    let mut lines = content.lines();
    let pid: i32 = lines.next()?.trim().parse().ok()?;
    // kill(0, ..) and negative PIDs address process groups
    if pid <= 0 {
        return None;
    }
    let port = lines.nth(2).and_then(|l| l.trim().parse().ok());
    Some(PostmasterPid { pid, port })
}

/// Signal-0 existence check. EPERM means the process exists under another user.
fn process_exists(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
