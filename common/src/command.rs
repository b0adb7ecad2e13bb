//! Command execution utilities
//!
//! Provides consistent command execution with proper error handling and logging.

use anyhow::{anyhow, Context, Result};
use nix::unistd::{geteuid, User};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Result of a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Convert a non-zero exit into an error carrying stderr.
    pub fn into_checked(self, cmd: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            let code = self
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(anyhow!("{} failed (exit {}): {}", cmd, code, self.stderr))
        }
    }
}

/// Run a command and return its output.
///
/// This is a low-level function that returns both stdout and stderr.
/// Use [`CommandOutput::into_checked`] to treat a non-zero exit as an error.
#[instrument(skip_all, fields(cmd = %cmd))]
pub async fn run(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    debug!(args = ?args, "Running command");

    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .context(format!("Failed to execute {}", cmd))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run a command feeding `input` on stdin, e.g. a multi-statement SQL script.
///
/// Arguments are logged, stdin is not: scripts may carry credentials.
#[instrument(skip_all, fields(cmd = %cmd))]
pub async fn run_with_stdin(cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
    debug!(args = ?args, input_bytes = input.len(), "Running command with stdin");

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(format!("Failed to spawn {}", cmd))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .context(format!("Failed to write stdin of {}", cmd))?;
        // Closing stdin signals end of input
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .context(format!("Failed to wait for {}", cmd))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Runs commands as a given OS account.
///
/// When the current effective user already is that account the command runs
/// directly; otherwise it is wrapped in `sudo -u <account> --`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAs {
    user: String,
    direct: bool,
}

impl RunAs {
    /// Resolve how to reach `user` from the current process.
    pub fn new(user: &str) -> Self {
        let current = User::from_uid(geteuid()).ok().flatten().map(|u| u.name);
        Self {
            user: user.to_string(),
            direct: current.as_deref() == Some(user),
        }
    }

    /// Always switch through sudo, regardless of the current user.
    pub fn via_sudo(user: &str) -> Self {
        Self {
            user: user.to_string(),
            direct: false,
        }
    }

    /// Run without switching users.
    pub fn direct(user: &str) -> Self {
        Self {
            user: user.to_string(),
            direct: true,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The program and argument vector that actually get executed.
    pub fn command_line(&self, cmd: &str, args: &[&str]) -> (String, Vec<String>) {
        if self.direct {
            (
                cmd.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            )
        } else {
            let mut wrapped = vec![
                "-u".to_string(),
                self.user.clone(),
                "--".to_string(),
                cmd.to_string(),
            ];
            wrapped.extend(args.iter().map(|a| a.to_string()));
            ("sudo".to_string(), wrapped)
        }
    }

    /// Run a command as the account and return its output.
    pub async fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let (program, argv) = self.command_line(cmd, args);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        run(&program, &argv).await
    }

    /// Run a command as the account, feeding `input` on stdin.
    pub async fn run_with_stdin(
        &self,
        cmd: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput> {
        let (program, argv) = self.command_line(cmd, args);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        run_with_stdin(&program, &argv, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_wraps_command_line() {
        let runner = RunAs::via_sudo("postgres");
        let (program, args) = runner.command_line("psql", &["-p", "5000"]);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-u", "postgres", "--", "psql", "-p", "5000"]);
    }

    #[test]
    fn direct_keeps_command_line() {
        let runner = RunAs::direct("postgres");
        let (program, args) = runner.command_line("psql", &["-p", "5000"]);
        assert_eq!(program, "psql");
        assert_eq!(args, vec!["-p", "5000"]);
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "boom".to_string(),
            success: false,
            code: Some(3),
        };
        let err = output.into_checked("psql").unwrap_err();
        assert_eq!(err.to_string(), "psql failed (exit 3): boom");
    }

    #[tokio::test]
    async fn stdin_is_delivered() {
        let output = run_with_stdin("cat", &[], "SELECT 1;\n").await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "SELECT 1;");
    }
}
