//! List every tenant database on the server with a per-database table census.
//!
//! Usage: list-tenants [--json]

use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;

use studiodesk_db::config::Config;
use studiodesk_db::db;
use studiodesk_db::models::tenant::TenantCensus;

#[derive(Parser)]
#[command(name = "list-tenants", about = "List tenant databases and their table census")]
struct Args {
    /// Emit the census as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let master = db::create_pool(&config.master_database_url)
        .await
        .context("failed to connect to the master database")?;

    let names: Vec<String> = sqlx::query_scalar(
        "SELECT datname FROM pg_database WHERE datname LIKE 'tenant_%' ORDER BY datname",
    )
    .fetch_all(&master)
    .await?;
    master.close().await;

    let mut censuses = Vec::with_capacity(names.len());
    for name in &names {
        let url = db::tenant_url(&config.master_database_url, name);
        let pool = db::create_pool(&url)
            .await
            .with_context(|| format!("failed to connect to {name}"))?;
        let census = census(&pool, name).await;
        pool.close().await;
        censuses.push(census.with_context(|| format!("failed to inspect {name}"))?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&censuses)?);
        return Ok(());
    }

    println!("Found {} tenant database(s)", censuses.len());
    for c in &censuses {
        println!();
        println!("{}:", c.database_name);
        println!("   tables: {}", c.table_count);
        for (present, table) in [
            (c.has_clients, "clients"),
            (c.has_rooms, "rooms"),
            (c.has_sessions, "sessions"),
            (c.has_task_types, "task_types"),
            (c.has_time_entries, "time_entries"),
        ] {
            println!("   [{}] {table}", if present { "x" } else { " " });
        }
        if c.has_timer_support() {
            println!("   timer support: yes");
        }
    }

    Ok(())
}

async fn census(pool: &PgPool, name: &str) -> anyhow::Result<TenantCensus> {
    let tables = studiodesk_db::db::tenant::list_tables(pool).await?;
    let has = |t: &str| tables.iter().any(|name| name == t);

    Ok(TenantCensus {
        database_name: name.to_string(),
        table_count: tables.len() as i64,
        has_clients: has("clients"),
        has_rooms: has("rooms"),
        has_sessions: has("sessions"),
        has_task_types: has("task_types"),
        has_time_entries: has("time_entries"),
    })
}
