use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Row of the master `tenant_databases` table: one mapping per organization,
/// pointing at the physical database holding that organization's data.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TenantMapping {
    pub id: i32,
    pub organization_id: i32,
    pub database_name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-database census produced by the `list-tenants` tool.
#[derive(Debug, Clone, Serialize)]
pub struct TenantCensus {
    pub database_name: String,
    pub table_count: i64,
    pub has_clients: bool,
    pub has_rooms: bool,
    pub has_sessions: bool,
    pub has_task_types: bool,
    pub has_time_entries: bool,
}

impl TenantCensus {
    /// Both timer tables present means the schema supports time tracking.
    pub fn has_timer_support(&self) -> bool {
        self.has_task_types && self.has_time_entries
    }
}
