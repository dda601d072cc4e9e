pub mod migrations;
pub mod tenant;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::ProvisionResult;

/// Open a single-connection maintenance pool.
///
/// Provisioning, migration and validation all run sequentially over exactly
/// one connection; a leaked second connection would block the
/// terminate-and-drop rollback path.
pub async fn create_pool(database_url: &str) -> ProvisionResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the control-plane migrations embedded in ./migrations/master/
pub async fn run_master_migrations(pool: &PgPool) -> ProvisionResult<()> {
    sqlx::migrate!("./migrations/master").run(pool).await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    Ok(())
}

/// Derive a tenant connection string from the master URL by swapping the
/// final path segment for the tenant database name.
pub fn tenant_url(master_url: &str, database_name: &str) -> String {
    match master_url.rfind('/') {
        Some(idx) => format!("{}/{}", &master_url[..idx], database_name),
        None => format!("{master_url}/{database_name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::tenant_url;

    #[test]
    fn tenant_url_swaps_database_segment() {
        assert_eq!(
            tenant_url("postgresql://postgres@localhost:5432/studiodesk_master", "tenant_4"),
            "postgresql://postgres@localhost:5432/tenant_4"
        );
    }

    #[test]
    fn tenant_url_keeps_credentials_and_port() {
        assert_eq!(
            tenant_url("postgresql://user:pw@db.internal:6432/master", "tenant_12"),
            "postgresql://user:pw@db.internal:6432/tenant_12"
        );
    }
}
