use std::env;
use std::time::Duration;

/// Default control-plane URL for local development.
pub const DEFAULT_MASTER_URL: &str = "postgresql://postgres@localhost:5432/studiodesk_master";

#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the master ("control plane") database.
    pub master_database_url: String,
    /// Directory holding the ordered tenant schema migrations.
    pub tenant_migrations_dir: String,
    /// Wall-clock budget for a full tenant migration run. A runaway script
    /// must not hang provisioning indefinitely.
    pub migration_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            master_database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_MASTER_URL.into()),
            tenant_migrations_dir: env::var("TENANT_MIGRATIONS_DIR")
                .unwrap_or_else(|_| "./migrations/tenant".into()),
            migration_timeout: Duration::from_secs(
                env::var("MIGRATION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "300".into())
                    .parse()?,
            ),
        })
    }
}
