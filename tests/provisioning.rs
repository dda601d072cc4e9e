//! End-to-end provisioning tests against a live PostgreSQL server.
//!
//! These tests create and drop real databases, so they are ignored by
//! default. Run them with:
//!
//!   TEST_DATABASE_URL="postgresql://postgres@localhost:5432/studiodesk_master" \
//!     cargo test -- --ignored --test-threads=1
//!
//! Each test uses its own tenant number range so a failed run does not
//! poison the others.

use std::fs;
use std::path::Path;
use std::time::Duration;

use sqlx::PgPool;

use studiodesk_db::config::{Config, DEFAULT_MASTER_URL};
use studiodesk_db::db::{self, tenant};
use studiodesk_db::db::tenant::{Provisioned, TenantDbName, EXPECTED_TABLE_COUNT};
use studiodesk_db::error::ProvisionError;

fn master_url() -> String {
    std::env::var("TEST_DATABASE_URL").unwrap_or_else(|_| DEFAULT_MASTER_URL.into())
}

fn config_with(migrations_dir: &Path) -> Config {
    Config {
        master_database_url: master_url(),
        tenant_migrations_dir: migrations_dir.to_string_lossy().into_owned(),
        migration_timeout: Duration::from_secs(60),
    }
}

fn real_config() -> Config {
    config_with(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/tenant")))
}

async fn master_pool() -> PgPool {
    let pool = db::create_pool(&master_url()).await.expect("master connection");
    db::run_master_migrations(&pool).await.expect("master migrations");
    pool
}

/// Best-effort cleanup of everything a test tenant may have left behind.
async fn cleanup(master: &PgPool, tenant_number: u32) {
    let committed = Provisioned {
        database: TenantDbName::from_number(tenant_number).ok(),
        organization_id: sqlx::query_scalar("SELECT id FROM organizations WHERE slug = $1")
            .bind(format!("tenant-{tenant_number}"))
            .fetch_optional(master)
            .await
            .unwrap_or(None),
    };
    tenant::rollback(master, &committed).await;
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind(format!("tenant{tenant_number}@test.local"))
        .execute(master)
        .await;
}

async fn org_exists(master: &PgPool, tenant_number: u32) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT id FROM organizations WHERE slug = $1")
        .bind(format!("tenant-{tenant_number}"))
        .fetch_optional(master)
        .await
        .unwrap()
        .is_some()
}

async fn mapping_exists(master: &PgPool, tenant_number: u32) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT id FROM tenant_databases WHERE database_name = $1")
        .bind(format!("tenant_{tenant_number}"))
        .fetch_optional(master)
        .await
        .unwrap()
        .is_some()
}

async fn physical_db_exists(master: &PgPool, tenant_number: u32) -> bool {
    let name = TenantDbName::from_number(tenant_number).unwrap();
    tenant::database_exists(master, &name).await.unwrap()
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn owner_lookup_is_idempotent() {
    let master = master_pool().await;
    let n = 9101;
    cleanup(&master, n).await;

    let first = tenant::ensure_owner(&master, n).await.unwrap();
    let second = tenant::ensure_owner(&master, n).await.unwrap();
    assert_eq!(first, second);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(format!("tenant{n}@test.local"))
        .fetch_one(&master)
        .await
        .unwrap();
    assert_eq!(count, 1);

    cleanup(&master, n).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn provisioning_creates_a_validated_tenant() {
    let master = master_pool().await;
    let n = 9102;
    cleanup(&master, n).await;

    let config = real_config();
    let info = tenant::provision_tenant(&master, &config, Some(n)).await.unwrap();

    assert_eq!(info.tenant_number, n);
    assert_eq!(info.database_name, format!("tenant_{n}"));
    assert!(physical_db_exists(&master, n).await);
    assert!(mapping_exists(&master, n).await);

    // The registered name resolves to a schema with exactly the expected tables.
    let tenant_pool = db::create_pool(&info.connection_string).await.unwrap();
    let tables = tenant::validate_table_count(&tenant_pool).await.unwrap();
    tenant_pool.close().await;
    assert_eq!(tables.len(), EXPECTED_TABLE_COUNT);

    // A fresh allocation now lands one past this tenant.
    let next = tenant::next_tenant_number(&master).await.unwrap();
    assert!(next > n);

    cleanup(&master, n).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn duplicate_database_is_rejected() {
    let master = master_pool().await;
    let n = 9103;
    cleanup(&master, n).await;

    let config = real_config();
    tenant::provision_tenant(&master, &config, Some(n)).await.unwrap();

    // Second run for the same number must fail without touching the first
    // tenant's records. The organization insert hits the unique slug first.
    let err = tenant::provision_tenant(&master, &config, Some(n)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Db(_)));
    assert!(physical_db_exists(&master, n).await);
    assert!(mapping_exists(&master, n).await);

    cleanup(&master, n).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn failed_migration_rolls_back_everything() {
    let master = master_pool().await;
    let n = 9104;
    cleanup(&master, n).await;

    // Three scripts; the second references a table that does not exist.
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("0001_a.sql"), "CREATE TABLE alpha (id serial primary key);")
        .unwrap();
    fs::write(dir.path().join("0002_b.sql"), "CREATE INDEX beta_idx ON beta (id);").unwrap();
    fs::write(dir.path().join("0003_c.sql"), "CREATE TABLE gamma (id serial primary key);")
        .unwrap();

    let config = config_with(dir.path());
    let err = tenant::provision_tenant(&master, &config, Some(n)).await.unwrap_err();

    match err {
        ProvisionError::MigrationApply { file, .. } => assert_eq!(file, "0002_b.sql"),
        other => panic!("expected MigrationApply, got {other}"),
    }

    assert!(!physical_db_exists(&master, n).await);
    assert!(!org_exists(&master, n).await);
    assert!(!mapping_exists(&master, n).await);

    cleanup(&master, n).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn wrong_table_count_rolls_back() {
    let master = master_pool().await;
    let n = 9105;
    cleanup(&master, n).await;

    // Migrations succeed but produce a single table: validation must fail
    // and the run must be fully compensated.
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("0001_only.sql"), "CREATE TABLE lonely (id serial primary key);")
        .unwrap();

    let config = config_with(dir.path());
    let err = tenant::provision_tenant(&master, &config, Some(n)).await.unwrap_err();

    match err {
        ProvisionError::TableCountMismatch { expected, actual } => {
            assert_eq!(expected, EXPECTED_TABLE_COUNT);
            assert_eq!(actual, 1);
        }
        other => panic!("expected TableCountMismatch, got {other}"),
    }

    assert!(!physical_db_exists(&master, n).await);
    assert!(!org_exists(&master, n).await);
    assert!(!mapping_exists(&master, n).await);

    cleanup(&master, n).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn failed_run_leaves_other_tenants_untouched() {
    let master = master_pool().await;
    let (good, bad) = (9106, 9107);
    cleanup(&master, good).await;
    cleanup(&master, bad).await;

    let config = real_config();
    tenant::provision_tenant(&master, &config, Some(good)).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("0001_broken.sql"), "CREATE INDEX nope_idx ON nope (id);").unwrap();
    let broken = config_with(dir.path());
    tenant::provision_tenant(&master, &broken, Some(bad)).await.unwrap_err();

    assert!(physical_db_exists(&master, good).await);
    assert!(org_exists(&master, good).await);
    assert!(mapping_exists(&master, good).await);
    assert!(!physical_db_exists(&master, bad).await);
    assert!(!org_exists(&master, bad).await);

    cleanup(&master, good).await;
    cleanup(&master, bad).await;
}
