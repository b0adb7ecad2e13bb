//! Provisioner configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional YAML file
//! named by `PGPROVISION_CONFIG`, then `PGPROVISION_*` environment variables.

use crate::error::ProvisionError;
use common::ConfigExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional YAML config file
pub const CONFIG_PATH_ENV: &str = "PGPROVISION_CONFIG";

pub const DEFAULT_DB_NAME: &str = "myapp";
pub const DEFAULT_DB_USER: &str = "appuser";
pub const DEFAULT_DB_PASSWORD: &str = "dbuser123";
pub const DEFAULT_DB_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/postgresql/data";
pub const DEFAULT_PG_ROOT: &str = "/usr/lib/postgresql";
pub const DEFAULT_SERVICE_USER: &str = "postgres";
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["uuid-ossp", "pgcrypto", "pg_trgm"];

/// Session defaults applied to the application role
#[derive(Clone, PartialEq, Eq, Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RoleSettings {
    pub client_encoding: String,
    pub default_transaction_isolation: String,
    pub timezone: String,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            client_encoding: "utf8".to_string(),
            default_transaction_isolation: "read committed".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Everything the provisioner needs to know about the target instance.
///
/// YAML keys are camelCase (`dbName`, `dbUser`, `dbPassword`, `dbPort`,
/// `dataDir`, ...). Missing keys keep their defaults; unknown keys are rejected.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProvisionConfig {
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
    pub data_dir: PathBuf,
    /// Host used for readiness probes and in emitted URLs
    pub host: String,
    /// OS account that owns the data directory and runs the server
    pub service_user: String,
    /// Directory holding one subdirectory per installed PostgreSQL version
    pub pg_root: PathBuf,
    /// Explicit binary directory; skips version discovery under `pg_root`
    pub bin_dir: Option<PathBuf>,
    /// Unix socket directory for psql; psql's compiled-in default when unset
    pub socket_dir: Option<PathBuf>,
    /// Server log written by pg_ctl; `<data_dir>/postgres.log` when unset
    pub log_file: Option<PathBuf>,
    /// Directory receiving `db_connection.txt` and `db_visualizer/postgres.env`
    pub output_dir: PathBuf,
    pub extensions: Vec<String>,
    pub role_settings: RoleSettings,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            db_user: DEFAULT_DB_USER.to_string(),
            db_password: DEFAULT_DB_PASSWORD.to_string(),
            db_port: DEFAULT_DB_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: "localhost".to_string(),
            service_user: DEFAULT_SERVICE_USER.to_string(),
            pg_root: PathBuf::from(DEFAULT_PG_ROOT),
            bin_dir: None,
            socket_dir: None,
            log_file: None,
            output_dir: PathBuf::from("."),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            role_settings: RoleSettings::default(),
        }
    }
}

// Hand-written so the password never reaches logs
impl fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_port", &self.db_port)
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("service_user", &self.service_user)
            .field("pg_root", &self.pg_root)
            .field("bin_dir", &self.bin_dir)
            .field("socket_dir", &self.socket_dir)
            .field("log_file", &self.log_file)
            .field("output_dir", &self.output_dir)
            .field("extensions", &self.extensions)
            .field("role_settings", &self.role_settings)
            .finish()
    }
}

impl ProvisionConfig {
    /// Load configuration from the optional YAML file and the environment, then validate.
    pub fn load() -> Result<Self, ProvisionError> {
        let mut config = match String::env_opt(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let content = fs_err::read_to_string(path)
            .map_err(|e| ProvisionError::config(format!("Failed to read config: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML config text. An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ProvisionError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| ProvisionError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `PGPROVISION_*` environment overrides. Blank variables are ignored.
    pub fn apply_env(&mut self) -> Result<(), ProvisionError> {
        if let Some(v) = String::env_opt("PGPROVISION_DB_NAME") {
            self.db_name = v;
        }
        if let Some(v) = String::env_opt("PGPROVISION_DB_USER") {
            self.db_user = v;
        }
        if let Some(v) = String::env_opt("PGPROVISION_DB_PASSWORD") {
            self.db_password = v;
        }
        if let Some(v) = u16::env_parse_opt::<u16>("PGPROVISION_DB_PORT")
            .map_err(|e| ProvisionError::config(e.to_string()))?
        {
            self.db_port = v;
        }
        if let Some(v) = String::env_opt("PGPROVISION_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = String::env_opt("PGPROVISION_HOST") {
            self.host = v;
        }
        if let Some(v) = String::env_opt("PGPROVISION_SERVICE_USER") {
            self.service_user = v;
        }
        if let Some(v) = String::env_opt("PGPROVISION_PG_ROOT") {
            self.pg_root = PathBuf::from(v);
        }
        if let Some(v) = String::env_opt("PGPROVISION_BIN_DIR") {
            self.bin_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = String::env_opt("PGPROVISION_SOCKET_DIR") {
            self.socket_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = String::env_opt("PGPROVISION_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = String::env_opt("PGPROVISION_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = String::env_list("PGPROVISION_EXTENSIONS") {
            self.extensions = v;
        }
        Ok(())
    }

    /// Reject configurations that cannot converge.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let required = [
            ("dbName", &self.db_name),
            ("dbUser", &self.db_user),
            ("dbPassword", &self.db_password),
            ("host", &self.host),
            ("serviceUser", &self.service_user),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ProvisionError::config(format!("{} must not be empty", key)));
            }
            if value.contains('\0') {
                return Err(ProvisionError::config(format!(
                    "{} must not contain NUL bytes",
                    key
                )));
            }
        }

        if self.db_port == 0 {
            return Err(ProvisionError::config("dbPort must be between 1 and 65535"));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ProvisionError::config("dataDir must not be empty"));
        }

        let mut seen = HashSet::new();
        for ext in &self.extensions {
            if ext.trim().is_empty() {
                return Err(ProvisionError::config("extension names must not be empty"));
            }
            if !seen.insert(ext.as_str()) {
                return Err(ProvisionError::config(format!(
                    "extension '{}' is listed more than once",
                    ext
                )));
            }
        }

        Ok(())
    }

    /// Server log location passed to pg_ctl.
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("postgres.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProvisionConfig::default();
        assert_eq!(config.db_name, "myapp");
        assert_eq!(config.db_user, "appuser");
        assert_eq!(config.db_password, "dbuser123");
        assert_eq!(config.db_port, 5000);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/postgresql/data"));
        assert_eq!(config.extensions, vec!["uuid-ossp", "pgcrypto", "pg_trgm"]);
        assert_eq!(
            config.log_file(),
            PathBuf::from("/var/lib/postgresql/data/postgres.log")
        );
        config.validate().unwrap();
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let config = ProvisionConfig::from_yaml_str(
            r#"
dbName: inventory
dbPort: 6543
dataDir: /srv/pg
roleSettings:
  timezone: Europe/Berlin
"#,
        )
        .unwrap();

        assert_eq!(config.db_name, "inventory");
        assert_eq!(config.db_port, 6543);
        assert_eq!(config.data_dir, PathBuf::from("/srv/pg"));
        assert_eq!(config.role_settings.timezone, "Europe/Berlin");
        assert_eq!(config.role_settings.client_encoding, "utf8");
        assert_eq!(config.db_user, "appuser");
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let err = ProvisionConfig::from_yaml_str("dbname: typo\n").unwrap_err();
        assert!(matches!(err, ProvisionError::Config { .. }));
    }

    #[test]
    fn empty_yaml_is_defaults() {
        assert_eq!(
            ProvisionConfig::from_yaml_str("  \n").unwrap(),
            ProvisionConfig::default()
        );
    }

    #[test]
    fn env_overrides_win() {
        // Only test in this crate touching PGPROVISION_* variables
        env::set_var("PGPROVISION_DB_NAME", "fromenv");
        env::set_var("PGPROVISION_DB_PORT", "5433");
        env::set_var("PGPROVISION_DB_USER", "");
        env::set_var("PGPROVISION_EXTENSIONS", "hstore, citext");

        let mut config = ProvisionConfig::default();
        config.apply_env().unwrap();

        assert_eq!(config.db_name, "fromenv");
        assert_eq!(config.db_port, 5433);
        assert_eq!(config.db_user, "appuser");
        assert_eq!(config.extensions, vec!["hstore", "citext"]);

        env::set_var("PGPROVISION_DB_PORT", "not-a-port");
        assert!(ProvisionConfig::default().apply_env().is_err());

        for name in [
            "PGPROVISION_DB_NAME",
            "PGPROVISION_DB_PORT",
            "PGPROVISION_DB_USER",
            "PGPROVISION_EXTENSIONS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ProvisionConfig {
            db_password: " ".to_string(),
            ..ProvisionConfig::default()
        };
        assert!(config.validate().is_err());

        config.db_password = "secret".to_string();
        config.db_port = 0;
        assert!(config.validate().is_err());

        config.db_port = 5000;
        config.extensions = vec!["pgcrypto".to_string(), "pgcrypto".to_string()];
        assert!(config.validate().is_err());

        config.extensions.clear();
        config.validate().unwrap();
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", ProvisionConfig::default());
        assert!(!rendered.contains("dbuser123"));
        assert!(rendered.contains("<redacted>"));
    }
}
