//! Error types for tenant database lifecycle operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while provisioning, migrating or validating a tenant database.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A registered database name does not match the `tenant_<N>` pattern.
    #[error("invalid tenant database name: {0:?} (expected tenant_<N>)")]
    NameFormat(String),

    /// The target database already exists on the server.
    #[error("database {0} already exists; choose a different tenant number or drop it first")]
    AlreadyExists(String),

    /// A statement inside a migration script failed. Carries the offending
    /// filename; the remaining scripts are never attempted.
    #[error("migration {file} failed: {source}")]
    MigrationApply {
        file: String,
        #[source]
        source: sqlx::Error,
    },

    /// The migration run did not finish within the configured budget.
    #[error("migration run exceeded the {0:?} timeout")]
    MigrationTimeout(Duration),

    /// The migrations directory could not be read.
    #[error("cannot read migrations from {}: {source}", dir.display())]
    MigrationsDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Post-migration validation found the wrong number of tables. Both
    /// counts are carried so the operator can tell a stale migration
    /// ("more") from an incomplete one ("fewer").
    #[error("table count mismatch: expected {expected} tables, found {actual}")]
    TableCountMismatch { expected: usize, actual: usize },

    /// Any other database error (uniqueness violations surface here as-is).
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;
