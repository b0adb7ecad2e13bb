//! SQL client
//!
//! Statements run through `psql` as the database service account over the
//! local socket, so peer authentication applies and no superuser password is
//! needed.

use anyhow::Result;
use common::RunAs;
use std::path::{Path, PathBuf};

/// Database used for cluster-wide statements (roles, databases)
pub const MAINTENANCE_DB: &str = "postgres";

/// Executes SQL against a database on the provisioned server
#[allow(async_fn_in_trait)]
pub trait SqlExecutor {
    /// Run a multi-statement script in one transaction. The first failing
    /// statement aborts the script and nothing from it is committed.
    async fn execute_script(&self, database: &str, script: &str) -> Result<()>;

    /// Run one statement outside any transaction block (e.g. `CREATE DATABASE`).
    async fn execute(&self, database: &str, statement: &str) -> Result<()>;

    /// Run a query and return its rows, one per line, columns joined by `|`.
    async fn query(&self, database: &str, query: &str) -> Result<Vec<String>>;
}

/// [`SqlExecutor`] backed by the `psql` binary
#[derive(Debug, Clone)]
pub struct PsqlClient {
    psql: PathBuf,
    runner: RunAs,
    port: u16,
    socket_dir: Option<PathBuf>,
}

impl PsqlClient {
    pub fn new(psql: &Path, runner: RunAs, port: u16, socket_dir: Option<&Path>) -> Self {
        Self {
            psql: psql.to_path_buf(),
            runner,
            port,
            socket_dir: socket_dir.map(Path::to_path_buf),
        }
    }

    /// Arguments shared by every invocation.
    ///
    /// `-X` skips `~/.psqlrc`, which could change output format or behavior.
    pub fn base_args(&self, database: &str) -> Vec<String> {
        let mut args = vec![
            "-X".to_string(),
            "-q".to_string(),
            "-v".to_string(),
            "ON_ERROR_STOP=1".to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-d".to_string(),
            conninfo_dbname(database),
        ];
        if let Some(dir) = &self.socket_dir {
            args.push("-h".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        args
    }

    fn psql(&self) -> String {
        self.psql.to_string_lossy().into_owned()
    }
}

impl SqlExecutor for PsqlClient {
    async fn execute_script(&self, database: &str, script: &str) -> Result<()> {
        let mut args = self.base_args(database);
        args.extend(["--single-transaction", "-f", "-"].map(String::from));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.runner
            .run_with_stdin(&self.psql(), &args, script)
            .await?
            .into_checked("psql")?;
        Ok(())
    }

    async fn execute(&self, database: &str, statement: &str) -> Result<()> {
        let mut args = self.base_args(database);
        args.extend(["-c".to_string(), statement.to_string()]);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.runner.run(&self.psql(), &args).await?.into_checked("psql")?;
        Ok(())
    }

    async fn query(&self, database: &str, query: &str) -> Result<Vec<String>> {
        let mut args = self.base_args(database);
        args.extend(["-t".to_string(), "-A".to_string(), "-c".to_string(), query.to_string()]);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let stdout = self.runner.run(&self.psql(), &args).await?.into_checked("psql")?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// `-d` as a conninfo string, so names containing `=` or a URI prefix are
/// still taken as a database name.
fn conninfo_dbname(database: &str) -> String {
    let escaped = database.replace('\\', "\\\\").replace('\'', "\\'");
    format!("dbname='{}'", escaped)
}
