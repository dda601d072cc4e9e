//! Apply schema migrations to every registered tenant database.
//!
//! Runs the master migrations first (idempotent), then walks the
//! tenant_databases registry and applies the tenant migration set to each
//! database over a dedicated connection. A failing tenant is reported and
//! skipped; the run continues with the remaining tenants and exits nonzero
//! if any tenant failed.
//!
//! Usage: migrate-tenants [--tenant tenant_N]

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studiodesk_db::config::Config;
use studiodesk_db::db::{self, migrations, tenant};

#[derive(Parser)]
#[command(name = "migrate-tenants", about = "Apply tenant migrations to all registered tenants")]
struct Args {
    /// Migrate only this tenant database (e.g. tenant_3).
    #[arg(long)]
    tenant: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let only = args
        .tenant
        .as_deref()
        .map(tenant::TenantDbName::parse)
        .transpose()
        .context("--tenant must name a tenant database (tenant_N)")?;

    let master = db::create_pool(&config.master_database_url)
        .await
        .context("failed to connect to the master database")?;

    db::run_master_migrations(&master)
        .await
        .context("master migrations failed")?;
    tracing::info!("master migrations applied");

    let files = migrations::load_dir(Path::new(&config.tenant_migrations_dir))?;
    tracing::info!(count = files.len(), "loaded tenant migration set");

    let mappings = tenant::tenant_mappings(&master).await?;
    master.close().await;

    if mappings.is_empty() {
        println!("No tenant databases registered; nothing to migrate.");
        return Ok(());
    }

    let mut failed = 0usize;
    let mut migrated = 0usize;

    for mapping in &mappings {
        if let Some(only) = &only {
            if mapping.database_name != only.as_str() {
                continue;
            }
        }

        tracing::info!(
            database = %mapping.database_name,
            organization_id = mapping.organization_id,
            "migrating tenant"
        );

        let url = db::tenant_url(&config.master_database_url, &mapping.database_name);
        let result = async {
            let pool = db::create_pool(&url).await?;
            let applied = migrations::apply_all(&pool, &files).await;
            pool.close().await;
            applied
        }
        .await;

        match result {
            Ok(()) => migrated += 1,
            Err(err) => {
                tracing::error!(database = %mapping.database_name, error = %err, "tenant migration failed");
                failed += 1;
            }
        }
    }

    println!();
    println!("Migrated {migrated} tenant database(s), {failed} failure(s).");

    if failed > 0 {
        anyhow::bail!("{failed} tenant(s) failed to migrate");
    }
    Ok(())
}
