//! Environment variable parsing helpers
//!
//! Provides ergonomic helpers for reading configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Extension trait for parsing environment variables.
///
/// Provides convenient methods for reading env vars with defaults, optional
/// overrides, lists, and type parsing.
pub trait ConfigExt {
    /// Get an environment variable with a default value.
    ///
    /// # Example
    /// ```ignore
    /// let host = String::env_or("PGPROVISION_HOST", "localhost");
    /// ```
    fn env_or(name: &str, default: &str) -> String {
        env::var(name).unwrap_or_else(|_| default.to_string())
    }

    /// Get an environment variable if it is set to a non-empty value.
    ///
    /// Used for overrides layered on top of file or built-in defaults, where an
    /// empty assignment (`FOO=`) should not clobber the lower layer.
    fn env_opt(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Get an environment variable parsed as a specific type, failing loudly on
    /// a value that does not parse instead of falling back to a default.
    fn env_parse_opt<T>(name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match Self::env_opt(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
            None => Ok(None),
        }
    }

    /// Get a comma-separated environment variable as a list.
    ///
    /// Entries are trimmed and empty entries dropped: `"a, b,,c"` -> `["a", "b", "c"]`.
    fn env_list(name: &str) -> Option<Vec<String>> {
        Self::env_opt(name).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

// Blanket implementation for all types
impl<T> ConfigExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_opt_ignores_blank_values() {
        env::set_var("COMMON_TEST_ENV_OPT_BLANK", "   ");
        assert_eq!(String::env_opt("COMMON_TEST_ENV_OPT_BLANK"), None);

        env::set_var("COMMON_TEST_ENV_OPT_SET", "value");
        assert_eq!(
            String::env_opt("COMMON_TEST_ENV_OPT_SET").as_deref(),
            Some("value")
        );
    }

    #[test]
    fn env_list_splits_and_trims() {
        env::set_var("COMMON_TEST_ENV_LIST", " uuid-ossp, pgcrypto,,pg_trgm ");
        assert_eq!(
            String::env_list("COMMON_TEST_ENV_LIST"),
            Some(vec![
                "uuid-ossp".to_string(),
                "pgcrypto".to_string(),
                "pg_trgm".to_string()
            ])
        );
        assert_eq!(String::env_list("COMMON_TEST_ENV_LIST_UNSET"), None);
    }

    #[test]
    fn env_parse_opt_rejects_garbage() {
        env::set_var("COMMON_TEST_ENV_PARSE_BAD", "not-a-port");
        assert!(u16::env_parse_opt::<u16>("COMMON_TEST_ENV_PARSE_BAD").is_err());

        env::set_var("COMMON_TEST_ENV_PARSE_GOOD", " 5000 ");
        assert_eq!(
            u16::env_parse_opt::<u16>("COMMON_TEST_ENV_PARSE_GOOD").unwrap(),
            Some(5000)
        );
        assert_eq!(
            u16::env_parse_opt::<u16>("COMMON_TEST_ENV_PARSE_UNSET").unwrap(),
            None
        );
    }
}
