//! Tenant provisioning tool
//!
//! Creates a new tenant:
//! - organization record and owner user in the master DB
//! - new PostgreSQL database (tenant_N)
//! - registration in the tenant_databases table
//! - all tenant migrations applied
//! - validation of the exact table count
//!
//! Any failure rolls back everything created by this run.
//!
//! Usage:
//!   create-tenant          # auto-allocate the next tenant number
//!   create-tenant 5        # explicit tenant number
//!
//! Environment variables:
//!   DATABASE_URL            : master DB connection string
//!                             (default: postgresql://postgres@localhost:5432/studiodesk_master)
//!   TENANT_MIGRATIONS_DIR   : tenant migration scripts (default: ./migrations/tenant)
//!   MIGRATION_TIMEOUT_SECS  : wall-clock budget for the migration run (default: 300)

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studiodesk_db::config::Config;
use studiodesk_db::db;

#[derive(Parser)]
#[command(name = "create-tenant", about = "Provision a new tenant database")]
struct Args {
    /// Explicit tenant number. Auto-allocated from existing registrations
    /// when omitted.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    tenant_number: Option<u32>,
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

    println!("=== Tenant Provisioning ===");
    println!("    Master: {}", config.master_database_url);
    println!();

    let master = db::create_pool(&config.master_database_url)
        .await
        .context("failed to connect to the master database")?;

    let result = db::tenant::provision_tenant(&master, &config, args.tenant_number).await;
    master.close().await;

    let info = match result {
        Ok(info) => info,
        Err(err) => {
            eprintln!();
            eprintln!("!!! Provisioning failed: {err}");
            eprintln!("    All changes from this run have been rolled back (see log above).");
            return Err(err.into());
        }
    };

    println!();
    println!("Tenant created successfully!");
    println!("================================");
    println!("   Tenant number:     {}", info.tenant_number);
    println!("   Organization id:   {}", info.organization_id);
    println!("   Organization name: {}", info.organization_name);
    println!("   Database name:     {}", info.database_name);
    println!("   Connection:        {}", info.connection_string);
    println!();
    println!("Next steps:");
    println!(
        "   1. Seed base data: DATABASE_URL=\"{}\" cargo run --bin seed-base-data",
        info.connection_string
    );
    println!();

    Ok(())
}
