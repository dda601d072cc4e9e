//! Base seed data for a freshly provisioned tenant database.
//!
//! Inserts a small, internally-consistent reference set used for demos and
//! tests: 3 individual clients, 2 company clients, 3 company-member links,
//! 2 rooms, 3 equipment rows, 1 project, 2 sessions, 2 tracks, 1 task type,
//! 1 time entry and 1 invoice. Rows are inserted in dependency order so every
//! foreign key resolves to an already-committed row.
//!
//! Not idempotent: re-running against a seeded database will duplicate
//! reference rows or trip the invoice-number uniqueness constraint.
//!
//! Usage:
//!   DATABASE_URL="postgresql://postgres@localhost:5432/tenant_N" cargo run --bin seed-base-data

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let database_url = env::var("DATABASE_URL").context(
        "DATABASE_URL is required and must point at the target tenant database, e.g. \
         DATABASE_URL=\"postgresql://postgres@localhost:5432/tenant_1\"",
    )?;

    println!("=== Seed Base Data ===");
    println!("    Target: {database_url}");
    println!();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to the tenant database")?;

    let now = Utc::now();

    // ── Individual clients ──────────────────────────────────────────────────
    println!("Creating individual clients...");

    let emma_id = insert_individual(
        &pool,
        "Emma Dubois", "Emma", "Dubois",
        "emma.dubois@example.com", "+33 6 12 34 56 78",
        "Paris", None,
        "https://i.pravatar.cc/150?img=1",
    )
    .await?;
    let lucas_id = insert_individual(
        &pool,
        "Lucas Martin", "Lucas", "Martin",
        "lucas.martin@example.com", "+33 6 23 45 67 89",
        "Lyon", Some("MC Lukie"),
        "https://i.pravatar.cc/150?img=12",
    )
    .await?;
    let sarah_id = insert_individual(
        &pool,
        "Sarah Petit", "Sarah", "Petit",
        "sarah.petit@example.com", "+33 6 34 56 78 90",
        "Marseille", None,
        "https://i.pravatar.cc/150?img=5",
    )
    .await?;

    // ── Company clients ─────────────────────────────────────────────────────
    println!("Creating company clients...");

    let sound_prod_id = insert_company(
        &pool,
        "Sound Production SARL",
        "contact@soundproduction.fr", "+33 1 23 45 67 89",
        "Paris", "42 Rue de la Musique, 75011 Paris",
        "https://soundproduction.fr",
    )
    .await?;
    let melody_prod_id = insert_company(
        &pool,
        "Mélodie Productions SAS",
        "info@melodie-prod.com", "+33 4 12 34 56 78",
        "Lyon", "18 Avenue du Jazz, 69001 Lyon",
        "https://melodie-prod.com",
    )
    .await?;

    // ── Company members ─────────────────────────────────────────────────────
    println!("Linking company members...");

    let member_links = [
        (sound_prod_id, emma_id, "Directrice Générale", true),
        (sound_prod_id, lucas_id, "Artiste sous contrat", false),
        (melody_prod_id, sarah_id, "Productrice", true),
    ];
    for (company_id, member_id, role, is_primary) in &member_links {
        sqlx::query(
            "INSERT INTO company_members
               (company_client_id, member_client_id, role, is_primary, created_at, updated_at)
             VALUES ($1, $2, $3, $4, NOW(), NOW())",
        )
        .bind(company_id)
        .bind(member_id)
        .bind(role)
        .bind(is_primary)
        .execute(&pool)
        .await
        .with_context(|| format!("failed to link member {member_id} to company {company_id}"))?;
    }

    // ── Rooms ───────────────────────────────────────────────────────────────
    println!("Creating studio rooms...");

    let studio_a_id: i32 = sqlx::query_scalar(
        "INSERT INTO rooms (name, description, type, hourly_rate, capacity, created_at, updated_at)
         VALUES ($1, $2, 'recording', 80.00, 10, NOW(), NOW())
         RETURNING id",
    )
    .bind("Studio A")
    .bind("Grand studio d'enregistrement")
    .fetch_one(&pool)
    .await
    .context("failed to insert Studio A")?;

    let studio_mix_id: i32 = sqlx::query_scalar(
        "INSERT INTO rooms (name, description, type, hourly_rate, capacity, created_at, updated_at)
         VALUES ($1, $2, 'mixing', 60.00, 4, NOW(), NOW())
         RETURNING id",
    )
    .bind("Studio Mix")
    .bind("Studio de mixage professionnel")
    .fetch_one(&pool)
    .await
    .context("failed to insert Studio Mix")?;

    // ── Equipment ───────────────────────────────────────────────────────────
    println!("Creating equipment...");

    let equipment = [
        ("Neumann U87 Ai", "Neumann", "U87 Ai", "microphone", "excellent"),
        ("Apollo x16", "Universal Audio", "x16", "interface", "excellent"),
        ("API 512c", "API", "512c", "preamp", "good"),
    ];
    for (name, brand, model, category, condition) in &equipment {
        sqlx::query(
            "INSERT INTO equipment
               (name, brand, model, category, status, condition, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'operational', $5, NOW(), NOW())",
        )
        .bind(name)
        .bind(brand)
        .bind(model)
        .bind(category)
        .bind(condition)
        .execute(&pool)
        .await
        .with_context(|| format!("failed to insert equipment {name}"))?;
    }

    // ── Project ─────────────────────────────────────────────────────────────
    println!("Creating project...");

    let project_id: i32 = sqlx::query_scalar(
        "INSERT INTO projects (client_id, name, artist_name, type, status, created_at, updated_at)
         VALUES ($1, $2, $3, 'album', 'recording', NOW(), NOW())
         RETURNING id",
    )
    .bind(lucas_id)
    .bind("Horizons Lointains")
    .bind("MC Lukie")
    .fetch_one(&pool)
    .await
    .context("failed to insert project")?;

    // ── Sessions ────────────────────────────────────────────────────────────
    println!("Creating sessions...");

    let session1_id: i32 = sqlx::query_scalar(
        "INSERT INTO sessions
           (client_id, room_id, project_id, title, start_time, end_time, status,
            total_amount, deposit_amount, deposit_paid, payment_status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, 'scheduled',
                 320.00, 96.00, TRUE, 'partial', NOW(), NOW())
         RETURNING id",
    )
    .bind(lucas_id)
    .bind(studio_a_id)
    .bind(project_id)
    .bind("Enregistrement Horizons Lointains - Track 1")
    .bind(now + Duration::days(1))
    .bind(now + Duration::days(1) + Duration::hours(4))
    .fetch_one(&pool)
    .await
    .context("failed to insert session 1")?;

    let _session2_id: i32 = sqlx::query_scalar(
        "INSERT INTO sessions
           (client_id, room_id, title, start_time, end_time, status,
            total_amount, payment_status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, 'completed', 180.00, 'paid', NOW(), NOW())
         RETURNING id",
    )
    .bind(sarah_id)
    .bind(studio_mix_id)
    .bind("Mixage projet indie")
    .bind(now - Duration::days(2))
    .bind(now - Duration::days(2) + Duration::hours(3))
    .fetch_one(&pool)
    .await
    .context("failed to insert session 2")?;

    // ── Tracks ──────────────────────────────────────────────────────────────
    println!("Creating tracks...");

    let tracks = [
        ("Introduction", 1, "recording", 120, "Am", "Lucas Martin", "Lucas Martin"),
        ("Voyage", 2, "mixing", 95, "C", "Lucas Martin", "Emma Dubois"),
    ];
    for (title, number, status, bpm, key, composer, lyricist) in &tracks {
        sqlx::query(
            "INSERT INTO tracks
               (project_id, title, track_number, status, bpm, \"key\",
                composer, lyricist, language, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'fr', NOW(), NOW())",
        )
        .bind(project_id)
        .bind(title)
        .bind(number)
        .bind(status)
        .bind(bpm)
        .bind(key)
        .bind(composer)
        .bind(lyricist)
        .execute(&pool)
        .await
        .with_context(|| format!("failed to insert track {title}"))?;
    }

    // ── Task type & time entry ──────────────────────────────────────────────
    println!("Creating task type and time entry...");

    let task_type_id: i32 = sqlx::query_scalar(
        "INSERT INTO task_types (name, description, hourly_rate, category, color, created_at, updated_at)
         VALUES ($1, $2, 80.00, 'billable', '#FF5733', NOW(), NOW())
         RETURNING id",
    )
    .bind("Recording")
    .bind("Studio recording session")
    .fetch_one(&pool)
    .await
    .context("failed to insert task type")?;

    sqlx::query(
        "INSERT INTO time_entries
           (task_type_id, session_id, start_time, end_time, duration_minutes,
            hourly_rate_snapshot, created_at, updated_at)
         VALUES ($1, $2, $3, $4, 120, 80.00, NOW(), NOW())",
    )
    .bind(task_type_id)
    .bind(session1_id)
    .bind(now - Duration::hours(2))
    .bind(now)
    .execute(&pool)
    .await
    .context("failed to insert time entry")?;

    // ── Invoice ─────────────────────────────────────────────────────────────
    println!("Creating invoice...");

    // Timestamp-derived number: unique for single-run seeding only.
    let invoice_number = format!("INV-{}", now.timestamp_millis());
    sqlx::query(
        "INSERT INTO invoices
           (invoice_number, client_id, issue_date, due_date, status,
            subtotal, tax_rate, tax_amount, total, deposit_amount, remaining_balance,
            created_at, updated_at)
         VALUES ($1, $2, $3, $4, 'sent',
                 150.00, 20.00, 30.00, 180.00, 54.00, 126.00, NOW(), NOW())",
    )
    .bind(&invoice_number)
    .bind(sarah_id)
    .bind(now)
    .bind(now + Duration::days(30))
    .execute(&pool)
    .await
    .context("failed to insert invoice")?;
    println!("   {invoice_number}");

    // ── Summary ─────────────────────────────────────────────────────────────
    println!();
    println!("Seed summary:");

    let row = sqlx::query(
        "SELECT
           (SELECT COUNT(*) FROM clients WHERE type = 'individual') AS individuals,
           (SELECT COUNT(*) FROM clients WHERE type = 'company')    AS companies,
           (SELECT COUNT(*) FROM company_members)                   AS members,
           (SELECT COUNT(*) FROM rooms)                             AS rooms,
           (SELECT COUNT(*) FROM equipment)                         AS equipment,
           (SELECT COUNT(*) FROM projects)                          AS projects,
           (SELECT COUNT(*) FROM sessions)                          AS sessions,
           (SELECT COUNT(*) FROM tracks)                            AS tracks,
           (SELECT COUNT(*) FROM task_types)                        AS task_types,
           (SELECT COUNT(*) FROM time_entries)                      AS time_entries,
           (SELECT COUNT(*) FROM invoices)                          AS invoices",
    )
    .fetch_one(&pool)
    .await
    .context("failed to compute seed summary")?;

    let tally = [
        ("Individual clients", row.get::<i64, _>("individuals")),
        ("Company clients", row.get::<i64, _>("companies")),
        ("Company members", row.get::<i64, _>("members")),
        ("Rooms", row.get::<i64, _>("rooms")),
        ("Equipment", row.get::<i64, _>("equipment")),
        ("Projects", row.get::<i64, _>("projects")),
        ("Sessions", row.get::<i64, _>("sessions")),
        ("Tracks", row.get::<i64, _>("tracks")),
        ("Task types", row.get::<i64, _>("task_types")),
        ("Time entries", row.get::<i64, _>("time_entries")),
        ("Invoices", row.get::<i64, _>("invoices")),
    ];
    for (label, count) in &tally {
        println!("   {label:<20} {count}");
    }
    println!("   {:<20} {}", "Total records", tally.iter().map(|(_, c)| c).sum::<i64>());

    println!();
    println!("Base data seeded successfully!");

    Ok(())
}

async fn insert_individual(
    pool: &sqlx::PgPool,
    name: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    city: &str,
    artist_name: Option<&str>,
    avatar_url: &str,
) -> Result<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO clients
           (name, first_name, last_name, email, phone, type, city, artist_name,
            phones, emails, avatar_url, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, 'individual', $6, $7, $8, $9, $10, NOW(), NOW())
         RETURNING id",
    )
    .bind(name)
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(phone)
    .bind(city)
    .bind(artist_name)
    .bind(json!([{ "type": "mobile", "number": phone }]))
    .bind(json!([{ "type": "work", "email": email }]))
    .bind(avatar_url)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert client {name}"))?;

    println!("   {name} (id {id})");
    Ok(id)
}

async fn insert_company(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    phone: &str,
    city: &str,
    address: &str,
    website: &str,
) -> Result<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO clients
           (name, type, email, phone, city, address,
            phones, emails, websites, created_at, updated_at)
         VALUES ($1, 'company', $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
         RETURNING id",
    )
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(city)
    .bind(address)
    .bind(json!([{ "type": "office", "number": phone }]))
    .bind(json!([{ "type": "general", "email": email }]))
    .bind(json!([{ "type": "website", "url": website }]))
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert client {name}"))?;

    println!("   {name} (id {id})");
    Ok(id)
}
