//! Tenant schema migration runner.
//!
//! Migration scripts live in a flat directory of `.sql` files applied in
//! filename order. The ordering is load-bearing and must reflect schema
//! dependency order (referenced tables before referencing tables).
//!
//! Two dialects exist:
//! - generated scripts whose statements are separated by the
//!   `--> statement-breakpoint` marker and executed one at a time;
//! - hand-written scripts executed as a single batch.
//!
//! The dialect is decided once when the file is loaded, not re-sniffed at
//! apply time.

use std::fs;
use std::path::Path;

use sqlx::PgPool;

use crate::error::{ProvisionError, ProvisionResult};

/// Marker separating statements in generated migration scripts.
pub const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

/// The executable content of a migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationScript {
    /// Generated script: independent statements, applied in file order.
    BreakpointSeparated(Vec<String>),
    /// Hand-written script: one multi-statement batch.
    SingleBatch(String),
}

impl MigrationScript {
    /// Classify and pre-split raw script source.
    ///
    /// For breakpoint-separated scripts each piece is trimmed, empty or
    /// comment-only pieces are discarded, and a single trailing semicolon is
    /// stripped.
    pub fn parse(source: &str) -> Self {
        if !source.contains(STATEMENT_BREAKPOINT) {
            return Self::SingleBatch(source.to_string());
        }
        let statements = source
            .split(STATEMENT_BREAKPOINT)
            .map(str::trim)
            .filter(|piece| !piece.is_empty() && !is_comment_only(piece))
            .map(|piece| piece.strip_suffix(';').unwrap_or(piece).to_string())
            .collect();
        Self::BreakpointSeparated(statements)
    }

    pub fn statement_count(&self) -> usize {
        match self {
            Self::BreakpointSeparated(statements) => statements.len(),
            Self::SingleBatch(_) => 1,
        }
    }
}

/// A migration script plus the filename it was loaded from. The filename is
/// carried so apply errors can name the offending script.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub name: String,
    pub script: MigrationScript,
}

fn is_comment_only(piece: &str) -> bool {
    piece
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .all(|line| line.starts_with("--"))
}

/// Load every `.sql` file from `dir`, sorted lexicographically by filename.
pub fn load_dir(dir: &Path) -> ProvisionResult<Vec<MigrationFile>> {
    let read_err = |source| ProvisionError::MigrationsDir { dir: dir.to_path_buf(), source };

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?
        .into_iter()
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|name| {
            let source = fs::read_to_string(dir.join(&name)).map_err(|source| {
                ProvisionError::MigrationsDir { dir: dir.to_path_buf(), source }
            })?;
            Ok(MigrationFile { name, script: MigrationScript::parse(&source) })
        })
        .collect()
}

/// Apply the full migration set over a dedicated tenant connection.
///
/// Aborts on the first failing statement; later scripts are never attempted
/// and the error carries the offending filename.
pub async fn apply_all(tenant_pool: &PgPool, files: &[MigrationFile]) -> ProvisionResult<()> {
    for file in files {
        tracing::info!(file = %file.name, statements = file.script.statement_count(), "applying migration");
        let apply_err = |source| ProvisionError::MigrationApply { file: file.name.clone(), source };
        match &file.script {
            MigrationScript::BreakpointSeparated(statements) => {
                for statement in statements {
                    sqlx::raw_sql(statement)
                        .execute(tenant_pool)
                        .await
                        .map_err(apply_err)?;
                }
            }
            MigrationScript::SingleBatch(batch) => {
                sqlx::raw_sql(batch).execute(tenant_pool).await.map_err(apply_err)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn generated_script_splits_on_breakpoint() {
        let source = "CREATE TABLE a (id serial);\n--> statement-breakpoint\nCREATE TABLE b (id serial);\n";
        let script = MigrationScript::parse(source);
        assert_eq!(
            script,
            MigrationScript::BreakpointSeparated(vec![
                "CREATE TABLE a (id serial)".into(),
                "CREATE TABLE b (id serial)".into(),
            ])
        );
    }

    #[test]
    fn comment_only_and_empty_pieces_are_dropped() {
        let source = "-- header comment\n--> statement-breakpoint\n\n--> statement-breakpoint\nCREATE TABLE a (id serial);";
        match MigrationScript::parse(source) {
            MigrationScript::BreakpointSeparated(statements) => {
                assert_eq!(statements, vec!["CREATE TABLE a (id serial)".to_string()]);
            }
            other => panic!("expected breakpoint-separated script, got {other:?}"),
        }
    }

    #[test]
    fn only_a_single_trailing_semicolon_is_stripped() {
        let source = "SELECT 1;;\n--> statement-breakpoint\nSELECT 2";
        match MigrationScript::parse(source) {
            MigrationScript::BreakpointSeparated(statements) => {
                assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
            }
            other => panic!("expected breakpoint-separated script, got {other:?}"),
        }
    }

    #[test]
    fn handwritten_script_stays_one_batch() {
        let source = "-- adds the link table\nCREATE TABLE link (a int, b int);\nCREATE INDEX link_a_idx ON link(a);\n";
        assert_eq!(MigrationScript::parse(source), MigrationScript::SingleBatch(source.into()));
    }

    #[test]
    fn load_dir_sorts_by_filename_and_ignores_non_sql() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0002_b.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("0000_a.sql"), "SELECT 0;").unwrap();
        fs::write(dir.path().join("0001_c.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("README.md"), "not a migration").unwrap();

        let files = load_dir(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0000_a.sql", "0001_c.sql", "0002_b.sql"]);
    }

    #[test]
    fn load_dir_missing_directory_is_an_error() {
        let err = load_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ProvisionError::MigrationsDir { .. }));
    }
}
