//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! On first run against a legacy DB (`header_matches` exists, no
//! `_migrations` table), it seeds V1 without re-creating tables and then
//! upgrades from there.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS header_matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id TEXT NOT NULL,
                header TEXT NOT NULL,
                pattern TEXT NOT NULL,
                chain TEXT,
                UNIQUE (list_id, header, pattern)
            );
            CREATE INDEX IF NOT EXISTS idx_header_matches_list ON header_matches(list_id);

            CREATE TABLE IF NOT EXISTS autoresponse_records (
                list_id TEXT NOT NULL,
                category TEXT NOT NULL,
                sender TEXT NOT NULL,
                quiet_until INTEGER NOT NULL,
                PRIMARY KEY (list_id, category, sender)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "header_match_order",
        sql: r#"
            ALTER TABLE header_matches ADD COLUMN position INTEGER;
            UPDATE header_matches SET position = (
                SELECT COUNT(*) FROM header_matches AS earlier
                WHERE earlier.list_id = header_matches.list_id
                  AND earlier.id < header_matches.id
            );
            CREATE INDEX IF NOT EXISTS idx_header_matches_position
                ON header_matches(list_id, position);
        "#,
    },
    Migration {
        version: 3,
        name: "header_match_position_not_null",
        sql: r#"
            CREATE TABLE IF NOT EXISTS header_matches_new (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id TEXT NOT NULL,
                header TEXT NOT NULL,
                pattern TEXT NOT NULL,
                chain TEXT,
                position INTEGER NOT NULL,
                UNIQUE (list_id, header, pattern)
            );
            INSERT OR IGNORE INTO header_matches_new (id, list_id, header, pattern, chain, position)
                SELECT id, list_id, header, pattern, chain, COALESCE(position, 0)
                FROM header_matches;
            DROP TABLE IF EXISTS header_matches;
            ALTER TABLE header_matches_new RENAME TO header_matches;
            CREATE INDEX IF NOT EXISTS idx_header_matches_list ON header_matches(list_id);
            CREATE INDEX IF NOT EXISTS idx_header_matches_position
                ON header_matches(list_id, position);
        "#,
    },
];

/// Version of the newest migration.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let mut current_version = get_current_version(conn).await?;

    if current_version == 0 && legacy_tables_exist(conn).await? {
        // Legacy DB: header_matches predates version tracking. The throttle
        // table may not exist yet.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS autoresponse_records (
                list_id TEXT NOT NULL,
                category TEXT NOT NULL,
                sender TEXT NOT NULL,
                quiet_until INTEGER NOT NULL,
                PRIMARY KEY (list_id, category, sender)
            );",
        )
        .await
        .map_err(|e| {
            DatabaseError::Migration(format!(
                "Failed to create autoresponse_records on legacy DB: {e}"
            ))
        })?;

        seed_version(conn, 1, "initial_schema").await?;
        current_version = 1;
        tracing::info!("Legacy database detected, seeded migration V1");
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Check if the header_matches table already exists.
async fn legacy_tables_exist(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='header_matches'",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    match row {
        Some(row) => {
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count > 0)
        }
        None => Ok(false),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
