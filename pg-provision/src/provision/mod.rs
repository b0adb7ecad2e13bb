//! Role, database, schema and extension provisioning
//!
//! Each step is a method on [`Provisioner`] that checks then acts through a
//! [`SqlExecutor`]. Steps are independently re-runnable; a failed step
//! applies nothing and aborts the run.

pub mod scripts;

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Stage};
use crate::sql::{SqlExecutor, MAINTENANCE_DB};
use std::collections::BTreeSet;
use tracing::info;

/// What a converge pass changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    pub role_created: bool,
    pub database_created: bool,
    /// Every extension installed in the target database afterwards
    pub installed_extensions: Vec<String>,
}

/// Applies the configured role/database/schema/extension state
pub struct Provisioner<'a, E> {
    executor: &'a E,
    config: &'a ProvisionConfig,
}

impl<'a, E: SqlExecutor> Provisioner<'a, E> {
    pub fn new(executor: &'a E, config: &'a ProvisionConfig) -> Self {
        Self { executor, config }
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn converge(&self) -> Result<Convergence, ProvisionError> {
        let role_created = self.provision_role().await?;
        let database_created = self.provision_database().await?;
        self.provision_schema().await?;
        self.provision_extensions().await?;
        let installed_extensions = self.verify_extensions().await?;

        Ok(Convergence {
            role_created,
            database_created,
            installed_extensions,
        })
    }

    /// Upsert the application role. Returns whether it had to be created.
    pub async fn provision_role(&self) -> Result<bool, ProvisionError> {
        let user = &self.config.db_user;
        info!(stage = %Stage::Role, role = %user, "Provisioning role");

        let existed = self
            .exists(Stage::Role, &scripts::role_exists_query(user))
            .await?;

        let script =
            scripts::role_script(user, &self.config.db_password, &self.config.role_settings);
        self.executor
            .execute_script(MAINTENANCE_DB, &script)
            .await
            .map_err(|e| ProvisionError::sql(Stage::Role, e))?;

        info!(role = %user, created = !existed, "Role provisioned");
        Ok(!existed)
    }

    /// Create the database if absent, then reassert owner and privileges.
    pub async fn provision_database(&self) -> Result<bool, ProvisionError> {
        let database = &self.config.db_name;
        let owner = &self.config.db_user;
        info!(stage = %Stage::Database, database = %database, "Provisioning database");

        let existed = self
            .exists(Stage::Database, &scripts::database_exists_query(database))
            .await?;

        if !existed {
            info!(database = %database, "Creating database");
            self.executor
                .execute(MAINTENANCE_DB, &scripts::create_database(database, owner))
                .await
                .map_err(|e| ProvisionError::sql(Stage::Database, e))?;
        }

        self.executor
            .execute_script(
                MAINTENANCE_DB,
                &scripts::database_grants_script(database, owner),
            )
            .await
            .map_err(|e| ProvisionError::sql(Stage::Database, e))?;

        info!(database = %database, created = !existed, "Database provisioned");
        Ok(!existed)
    }

    pub async fn provision_schema(&self) -> Result<(), ProvisionError> {
        info!(stage = %Stage::Schema, schema = scripts::APP_SCHEMA, "Provisioning schema");

        self.executor
            .execute_script(
                &self.config.db_name,
                &scripts::schema_script(&self.config.db_user),
            )
            .await
            .map_err(|e| ProvisionError::sql(Stage::Schema, e))
    }

    pub async fn provision_extensions(&self) -> Result<(), ProvisionError> {
        let extensions = &self.config.extensions;
        if extensions.is_empty() {
            return Ok(());
        }
        info!(stage = %Stage::Extensions, extensions = ?extensions, "Provisioning extensions");

        self.executor
            .execute_script(&self.config.db_name, &scripts::extensions_script(extensions))
            .await
            .map_err(|e| ProvisionError::sql(Stage::Extensions, e))
    }

    /// Confirm every configured extension is installed; returns the full installed set.
    pub async fn verify_extensions(&self) -> Result<Vec<String>, ProvisionError> {
        let installed: BTreeSet<String> = self
            .executor
            .query(&self.config.db_name, scripts::installed_extensions_query())
            .await
            .map_err(|e| ProvisionError::sql(Stage::Extensions, e))?
            .into_iter()
            .collect();

        let missing: Vec<String> = self
            .config
            .extensions
            .iter()
            .filter(|ext| !installed.contains(*ext))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(ProvisionError::Verification { missing });
        }

        Ok(installed.into_iter().collect())
    }

    async fn exists(&self, stage: Stage, query: &str) -> Result<bool, ProvisionError> {
        let rows = self
            .executor
            .query(MAINTENANCE_DB, query)
            .await
            .map_err(|e| ProvisionError::sql(stage, e))?;
        Ok(rows.iter().any(|row| row == "1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        /// (database, sql) in call order
        calls: RefCell<Vec<(String, String)>>,
        existing: Vec<&'static str>,
        extensions: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, database: &str, sql: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((database.to_string(), sql.to_string()));
            match self.fail_on {
                Some(needle) if sql.contains(needle) => Err(anyhow!("ERROR: injected")),
                _ => Ok(()),
            }
        }
    }

    impl SqlExecutor for Recorder {
        async fn execute_script(&self, database: &str, script: &str) -> Result<()> {
            self.record(database, script)
        }

        async fn execute(&self, database: &str, statement: &str) -> Result<()> {
            self.record(database, statement)
        }

        async fn query(&self, database: &str, query: &str) -> Result<Vec<String>> {
            self.record(database, query)?;
            if query.contains("pg_extension") {
                return Ok(self.extensions.iter().map(|e| e.to_string()).collect());
            }
            let hit = self.existing.iter().any(|name| query.contains(name));
            Ok(if hit { vec!["1".to_string()] } else { vec![] })
        }
    }

    #[tokio::test]
    async fn fresh_cluster_creates_role_and_database() {
        let config = ProvisionConfig::default();
        let db = Recorder {
            extensions: vec!["pg_trgm", "pgcrypto", "plpgsql", "uuid-ossp"],
            ..Default::default()
        };

        let outcome = Provisioner::new(&db, &config).converge().await.unwrap();

        assert!(outcome.role_created);
        assert!(outcome.database_created);
        assert_eq!(
            outcome.installed_extensions,
            vec!["pg_trgm", "pgcrypto", "plpgsql", "uuid-ossp"]
        );

        let calls = db.calls.borrow();
        let targets: Vec<&str> = calls.iter().map(|(db, _)| db.as_str()).collect();
        assert_eq!(
            targets,
            vec!["postgres", "postgres", "postgres", "postgres", "postgres", "myapp", "myapp", "myapp"]
        );
        assert!(calls[3].1.starts_with("CREATE DATABASE"));
    }

    #[tokio::test]
    async fn existing_database_is_not_recreated() {
        let config = ProvisionConfig::default();
        let db = Recorder {
            existing: vec!["'appuser'", "'myapp'"],
            extensions: vec!["pg_trgm", "pgcrypto", "uuid-ossp"],
            ..Default::default()
        };

        let outcome = Provisioner::new(&db, &config).converge().await.unwrap();

        assert!(!outcome.role_created);
        assert!(!outcome.database_created);
        let calls = db.calls.borrow();
        assert!(!calls.iter().any(|(_, sql)| sql.starts_with("CREATE DATABASE")));
        // Ownership and grants are reasserted regardless
        assert!(calls.iter().any(|(_, sql)| sql.contains("ALTER DATABASE \"myapp\" OWNER")));
    }

    #[tokio::test]
    async fn failing_step_stops_the_run() {
        let config = ProvisionConfig::default();
        let db = Recorder {
            fail_on: Some("ALTER DEFAULT PRIVILEGES"),
            ..Default::default()
        };

        let err = Provisioner::new(&db, &config).converge().await.unwrap_err();

        assert_eq!(err.stage(), Stage::Schema);
        let calls = db.calls.borrow();
        assert!(!calls.iter().any(|(_, sql)| sql.contains("CREATE EXTENSION")));
    }

    #[tokio::test]
    async fn missing_extension_fails_verification() {
        let config = ProvisionConfig::default();
        let db = Recorder {
            extensions: vec!["pgcrypto", "plpgsql"],
            ..Default::default()
        };

        let err = Provisioner::new(&db, &config)
            .verify_extensions()
            .await
            .unwrap_err();

        match err {
            ProvisionError::Verification { missing } => {
                assert_eq!(missing, vec!["uuid-ossp", "pg_trgm"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
