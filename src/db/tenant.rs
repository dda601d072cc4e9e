//! Tenant database lifecycle: allocation, control-plane registration,
//! physical provisioning, schema migration and integrity validation.
//!
//! Provisioning is a linear pipeline. Everything committed along the way is
//! recorded in a [`Provisioned`] accumulator so that compensation on failure
//! is a function of that record alone:
//!
//! allocate → ensure owner → create organization → create database
//! → register mapping → apply migrations → validate table count

use std::fmt;
use std::path::Path;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::{self, migrations};
use crate::error::{ProvisionError, ProvisionResult};
use crate::models::tenant::TenantMapping;

/// Number of tables a fully-migrated tenant schema contains.
///
/// Correctness oracle, not a derived value: keep in lockstep with
/// `migrations/tenant/`. More tables than this usually means a stale or
/// duplicate migration; fewer means an incomplete one. Either is fatal.
pub const EXPECTED_TABLE_COUNT: usize = 14;

// ─── Tenant database names ────────────────────────────────────────────────────

/// A validated physical tenant database name (`tenant_<N>`, N ≥ 1).
///
/// Database identifiers cannot be bound as statement parameters, so every
/// `CREATE DATABASE` / `DROP DATABASE` interpolation goes through this
/// allow-list type: validate, then interpolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDbName {
    number: u32,
    name: String,
}

impl TenantDbName {
    pub fn from_number(number: u32) -> ProvisionResult<Self> {
        if number == 0 {
            return Err(ProvisionError::NameFormat(format!("tenant_{number}")));
        }
        Ok(Self { number, name: format!("tenant_{number}") })
    }

    /// Parse an existing database name, rejecting anything outside the
    /// `tenant_<N>` pattern.
    pub fn parse(name: &str) -> ProvisionResult<Self> {
        let digits = name
            .strip_prefix("tenant_")
            .ok_or_else(|| ProvisionError::NameFormat(name.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProvisionError::NameFormat(name.to_string()));
        }
        let number: u32 = digits
            .parse()
            .map_err(|_| ProvisionError::NameFormat(name.to_string()))?;
        if number == 0 {
            return Err(ProvisionError::NameFormat(name.to_string()));
        }
        Ok(Self { number, name: name.to_string() })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TenantDbName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ─── Identity allocator ───────────────────────────────────────────────────────

/// Next tenant number, derived from the lexicographically greatest registered
/// database name. Best-effort only: concurrent runs can race here and will be
/// caught by the uniqueness constraints downstream.
pub async fn next_tenant_number(master: &PgPool) -> ProvisionResult<u32> {
    let last: Option<String> = sqlx::query_scalar(
        "SELECT database_name
         FROM tenant_databases
         ORDER BY database_name DESC
         LIMIT 1",
    )
    .fetch_optional(master)
    .await?;

    match last {
        None => Ok(1),
        Some(name) => Ok(TenantDbName::parse(&name)?.number() + 1),
    }
}

// ─── Control-plane registrar ──────────────────────────────────────────────────

/// Look up or create the owner user for a tenant. Idempotent: the
/// deterministic email is reused when it already exists.
pub async fn ensure_owner(master: &PgPool, tenant_number: u32) -> ProvisionResult<i32> {
    let email = format!("tenant{tenant_number}@test.local");

    let existing: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(master)
        .await?;

    if let Some(id) = existing {
        tracing::info!(%email, id, "reusing existing owner");
        return Ok(id);
    }

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO users (email, name, role, created_at, updated_at)
         VALUES ($1, $2, 'admin', NOW(), NOW())
         RETURNING id",
    )
    .bind(&email)
    .bind(format!("Tenant {tenant_number} Owner"))
    .fetch_one(master)
    .await?;

    tracing::info!(%email, id, "created owner");
    Ok(id)
}

/// Insert the organization row. Slug and subdomain are unique in the master
/// schema, so a double-provisioned tenant number fails here instead of
/// silently piling onto an existing organization.
pub async fn create_organization(
    master: &PgPool,
    tenant_number: u32,
    owner_id: i32,
) -> ProvisionResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO organizations (name, slug, subdomain, owner_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, NOW(), NOW())
         RETURNING id",
    )
    .bind(format!("Tenant {tenant_number} Organization"))
    .bind(format!("tenant-{tenant_number}"))
    .bind(format!("tenant{tenant_number}"))
    .bind(owner_id)
    .fetch_one(master)
    .await?;

    tracing::info!(organization_id = id, slug = %format!("tenant-{tenant_number}"), "organization created");
    Ok(id)
}

/// Record the organization → database mapping. Runs only after the physical
/// database is confirmed created, and before migrations, so a crash
/// mid-migration still leaves a traceable mapping for manual cleanup.
pub async fn register_mapping(
    master: &PgPool,
    organization_id: i32,
    database: &TenantDbName,
) -> ProvisionResult<()> {
    sqlx::query(
        "INSERT INTO tenant_databases (organization_id, database_name, created_at)
         VALUES ($1, $2, NOW())",
    )
    .bind(organization_id)
    .bind(database.as_str())
    .execute(master)
    .await?;

    tracing::info!(organization_id, database = %database, "registered tenant database mapping");
    Ok(())
}

/// All registered tenant database mappings, in organization order.
pub async fn tenant_mappings(master: &PgPool) -> ProvisionResult<Vec<TenantMapping>> {
    let mappings = sqlx::query_as::<_, TenantMapping>(
        "SELECT id, organization_id, database_name, created_at
         FROM tenant_databases
         ORDER BY organization_id",
    )
    .fetch_all(master)
    .await?;
    Ok(mappings)
}

// ─── Database provisioner ─────────────────────────────────────────────────────

pub async fn database_exists(master: &PgPool, database: &TenantDbName) -> ProvisionResult<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT datname FROM pg_database WHERE datname = $1")
            .bind(database.as_str())
            .fetch_optional(master)
            .await?;
    Ok(found.is_some())
}

/// Issue `CREATE DATABASE`. Never reuses an existing database: a name
/// collision is an error, not an opportunity.
///
/// `CREATE DATABASE` cannot run inside a transaction; this is an
/// immediately-committed side effect the caller must track for compensation.
pub async fn create_database(master: &PgPool, database: &TenantDbName) -> ProvisionResult<()> {
    if database_exists(master, database).await? {
        return Err(ProvisionError::AlreadyExists(database.as_str().to_string()));
    }

    sqlx::raw_sql(&format!("CREATE DATABASE {database}"))
        .execute(master)
        .await?;

    tracing::info!(%database, "database created");
    Ok(())
}

// ─── Integrity validator ──────────────────────────────────────────────────────

/// Table names in the tenant database's public schema, sorted.
pub async fn list_tables(tenant_pool: &PgPool) -> ProvisionResult<Vec<String>> {
    let tables = sqlx::query_scalar(
        "SELECT table_name
         FROM information_schema.tables
         WHERE table_schema = 'public'
         ORDER BY table_name",
    )
    .fetch_all(tenant_pool)
    .await?;
    Ok(tables)
}

/// Assert that exactly [`EXPECTED_TABLE_COUNT`] tables exist. On mismatch the
/// full table list is logged for operator diagnosis before failing.
pub async fn validate_table_count(tenant_pool: &PgPool) -> ProvisionResult<Vec<String>> {
    let actual: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM information_schema.tables
         WHERE table_schema = 'public'",
    )
    .fetch_one(tenant_pool)
    .await?;
    let actual = actual as usize;

    let tables = list_tables(tenant_pool).await?;

    if actual != EXPECTED_TABLE_COUNT {
        tracing::error!(
            expected = EXPECTED_TABLE_COUNT,
            actual,
            "table count validation failed: migration failure or schema mismatch"
        );
        for (i, table) in tables.iter().enumerate() {
            tracing::error!("  {:>2}. {table}", i + 1);
        }
        return Err(ProvisionError::TableCountMismatch { expected: EXPECTED_TABLE_COUNT, actual });
    }

    tracing::info!(count = actual, "table count validated");
    Ok(tables)
}

// ─── Orchestrator & rollback ──────────────────────────────────────────────────

/// What a provisioning run has durably committed so far. Rollback is a pure
/// function of this record.
#[derive(Debug, Default)]
pub struct Provisioned {
    pub database: Option<TenantDbName>,
    pub organization_id: Option<i32>,
}

/// Summary of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct TenantInfo {
    pub tenant_number: u32,
    pub organization_id: i32,
    pub organization_name: String,
    pub database_name: String,
    pub connection_string: String,
}

/// Provision a tenant end to end. On any failure the committed side effects
/// recorded so far are compensated (database dropped, control-plane rows
/// deleted) before the original error is returned.
pub async fn provision_tenant(
    master: &PgPool,
    config: &Config,
    explicit_number: Option<u32>,
) -> ProvisionResult<TenantInfo> {
    let mut committed = Provisioned::default();

    match run_pipeline(master, config, explicit_number, &mut committed).await {
        Ok(info) => Ok(info),
        Err(err) => {
            tracing::error!(error = %err, "provisioning failed, rolling back");
            rollback(master, &committed).await;
            Err(err)
        }
    }
}

async fn run_pipeline(
    master: &PgPool,
    config: &Config,
    explicit_number: Option<u32>,
    committed: &mut Provisioned,
) -> ProvisionResult<TenantInfo> {
    // Read the migration set up front: an unreadable directory must abort
    // before any mutation.
    let migration_files = migrations::load_dir(Path::new(&config.tenant_migrations_dir))?;
    tracing::info!(count = migration_files.len(), dir = %config.tenant_migrations_dir, "loaded tenant migrations");

    let tenant_number = match explicit_number {
        Some(n) => {
            tracing::info!(tenant_number = n, "using explicit tenant number");
            n
        }
        None => {
            let n = next_tenant_number(master).await?;
            tracing::info!(tenant_number = n, "allocated next tenant number");
            n
        }
    };
    let database = TenantDbName::from_number(tenant_number)?;

    let owner_id = ensure_owner(master, tenant_number).await?;

    let organization_id = create_organization(master, tenant_number, owner_id).await?;
    committed.organization_id = Some(organization_id);

    create_database(master, &database).await?;
    committed.database = Some(database.clone());

    register_mapping(master, organization_id, &database).await?;

    let connection_string = db::tenant_url(&config.master_database_url, database.as_str());

    // Dedicated connection for migrations, released on every exit path.
    let tenant_pool = db::create_pool(&connection_string).await?;
    let applied = tokio::time::timeout(
        config.migration_timeout,
        migrations::apply_all(&tenant_pool, &migration_files),
    )
    .await;
    tenant_pool.close().await;
    match applied {
        Err(_elapsed) => return Err(ProvisionError::MigrationTimeout(config.migration_timeout)),
        Ok(result) => result?,
    }

    // The validator opens its own scoped connection.
    let tenant_pool = db::create_pool(&connection_string).await?;
    let validated = validate_table_count(&tenant_pool).await;
    tenant_pool.close().await;
    let tables = validated?;
    for table in &tables {
        tracing::debug!(%table, "tenant table present");
    }

    Ok(TenantInfo {
        tenant_number,
        organization_id,
        organization_name: format!("Tenant {tenant_number} Organization"),
        database_name: database.as_str().to_string(),
        connection_string,
    })
}

/// Compensate a failed run: drop the tenant database (terminating its
/// backends first, since a database with live connections cannot be dropped), then
/// delete the mapping and organization rows. Errors here are logged, never
/// propagated, so they cannot mask the original failure.
pub async fn rollback(master: &PgPool, committed: &Provisioned) {
    if let Some(database) = &committed.database {
        match terminate_backends(master, database).await {
            Ok(n) if n > 0 => tracing::info!(%database, backends = n, "terminated lingering backends"),
            Ok(_) => {}
            Err(err) => tracing::warn!(%database, error = %err, "could not terminate backends"),
        }

        match sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {database}"))
            .execute(master)
            .await
        {
            Ok(_) => tracing::info!(%database, "dropped database"),
            Err(err) => tracing::warn!(
                %database,
                error = %err,
                "could not drop database; manual cleanup may be required"
            ),
        }
    }

    if let Some(organization_id) = committed.organization_id {
        // Mapping first: it holds the foreign key onto organizations.
        let result = async {
            sqlx::query("DELETE FROM tenant_databases WHERE organization_id = $1")
                .bind(organization_id)
                .execute(master)
                .await?;
            sqlx::query("DELETE FROM organizations WHERE id = $1")
                .bind(organization_id)
                .execute(master)
                .await
        }
        .await;

        match result {
            Ok(_) => tracing::info!(organization_id, "deleted control-plane records"),
            Err(err) => tracing::warn!(
                organization_id,
                error = %err,
                "could not delete control-plane records; manual cleanup may be required"
            ),
        }
    }

    tracing::info!("rollback complete");
}

/// Terminate every backend connected to the tenant database except the one
/// issuing this query (self-termination would deadlock the drop that
/// follows). Returns the number of terminated backends.
async fn terminate_backends(master: &PgPool, database: &TenantDbName) -> ProvisionResult<usize> {
    let terminated: Vec<bool> = sqlx::query_scalar(
        "SELECT pg_terminate_backend(pid)
         FROM pg_stat_activity
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(database.as_str())
    .fetch_all(master)
    .await?;
    Ok(terminated.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_canonical_names() {
        let name = TenantDbName::parse("tenant_7").unwrap();
        assert_eq!(name.number(), 7);
        assert_eq!(name.as_str(), "tenant_7");

        assert_eq!(TenantDbName::parse("tenant_120").unwrap().number(), 120);
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for bad in ["tenant_abc", "tenant_", "tenant_1x", "tenant-1", "client_4", "tenant_0", ""] {
            let err = TenantDbName::parse(bad).unwrap_err();
            assert!(matches!(err, ProvisionError::NameFormat(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn from_number_formats_canonically() {
        let name = TenantDbName::from_number(42).unwrap();
        assert_eq!(name.as_str(), "tenant_42");
        assert_eq!(name.to_string(), "tenant_42");
    }

    #[test]
    fn from_number_rejects_zero() {
        assert!(matches!(
            TenantDbName::from_number(0),
            Err(ProvisionError::NameFormat(_))
        ));
    }

    #[test]
    fn nothing_committed_means_nothing_to_roll_back() {
        let committed = Provisioned::default();
        assert!(committed.database.is_none());
        assert!(committed.organization_id.is_none());
    }
}
