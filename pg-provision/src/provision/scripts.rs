//! SQL for each provisioning step
//!
//! Every script is convergent: check-then-create for things that cannot be
//! created twice, followed by unconditional `ALTER`/`GRANT` statements that
//! reassert the target state.

use crate::config::RoleSettings;
use crate::sql::{quote_ident, quote_literal};

/// Schema provisioned for the application role
pub const APP_SCHEMA: &str = "public";

pub fn role_exists_query(user: &str) -> String {
    format!(
        "SELECT 1 FROM pg_roles WHERE rolname = {}",
        quote_literal(user)
    )
}

/// Create the role if absent, then always resync password, CREATEDB and
/// session defaults.
pub fn role_script(user: &str, password: &str, settings: &RoleSettings) -> String {
    let ident = quote_ident(user);
    let tag = dollar_tag(user);
    format!(
        r#"SET password_encryption = 'scram-sha-256';

DO {tag}
BEGIN
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = {user_lit}) THEN
        CREATE ROLE {ident} WITH LOGIN;
    END IF;
END
{tag};

ALTER ROLE {ident} WITH LOGIN PASSWORD {password};
ALTER ROLE {ident} CREATEDB;
ALTER ROLE {ident} SET client_encoding TO {encoding};
ALTER ROLE {ident} SET default_transaction_isolation TO {isolation};
ALTER ROLE {ident} SET timezone TO {timezone};
"#,
        user_lit = quote_literal(user),
        tag = tag,
        ident = ident,
        password = quote_literal(password),
        encoding = quote_literal(&settings.client_encoding),
        isolation = quote_literal(&settings.default_transaction_isolation),
        timezone = quote_literal(&settings.timezone),
    )
}

/// A dollar-quote tag that does not occur in `body`.
fn dollar_tag(body: &str) -> String {
    let mut tag = "$provision$".to_string();
    while body.contains(&tag) {
        tag.insert(tag.len() - 1, '_');
    }
    tag
}

pub fn database_exists_query(database: &str) -> String {
    format!(
        "SELECT 1 FROM pg_database WHERE datname = {}",
        quote_literal(database)
    )
}

/// `CREATE DATABASE` cannot run inside a transaction, so it is issued alone.
pub fn create_database(database: &str, owner: &str) -> String {
    format!(
        "CREATE DATABASE {} OWNER {}",
        quote_ident(database),
        quote_ident(owner)
    )
}

pub fn database_grants_script(database: &str, owner: &str) -> String {
    let db = quote_ident(database);
    let owner = quote_ident(owner);
    format!(
        "ALTER DATABASE {db} OWNER TO {owner};\n\
         GRANT ALL PRIVILEGES ON DATABASE {db} TO {owner};\n"
    )
}

/// Ownership, usage/create, and default privileges for objects created later.
pub fn schema_script(owner: &str) -> String {
    let schema = quote_ident(APP_SCHEMA);
    let owner = quote_ident(owner);
    format!(
        r#"CREATE SCHEMA IF NOT EXISTS {schema};
ALTER SCHEMA {schema} OWNER TO {owner};
GRANT USAGE, CREATE ON SCHEMA {schema} TO {owner};
ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT ALL ON TABLES TO {owner};
ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT ALL ON SEQUENCES TO {owner};
ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT ALL ON FUNCTIONS TO {owner};
ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT ALL ON TYPES TO {owner};
"#
    )
}

/// Additive only: already-installed extensions are left as they are.
pub fn extensions_script(extensions: &[String]) -> String {
    extensions
        .iter()
        .map(|ext| format!("CREATE EXTENSION IF NOT EXISTS {};\n", quote_ident(ext)))
        .collect()
}

pub fn installed_extensions_query() -> &'static str {
    "SELECT extname FROM pg_extension ORDER BY extname"
}
