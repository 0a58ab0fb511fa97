//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, HeaderMatch, Reservation};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes
/// take `write_lock`, so transactions on the shared connection never
/// overlap and read-then-write sequences see no interleaved writes.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map an insert failure, keeping uniqueness violations distinguishable.
fn insert_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

fn row_to_header_match(row: &libsql::Row) -> Result<HeaderMatch, libsql::Error> {
    Ok(HeaderMatch {
        id: row.get(0)?,
        list_id: row.get(1)?,
        header: row.get(2)?,
        pattern: row.get(3)?,
        chain: row.get::<String>(4).ok(),
        position: row.get(5)?,
    })
}

async fn read_quiet_until(
    conn: &Connection,
    op: &str,
    list_id: &str,
    category: &str,
    sender: &str,
) -> Result<Option<i64>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT quiet_until FROM autoresponse_records WHERE list_id = ?1 AND category = ?2 AND sender = ?3",
            params![list_id, category, sender],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(
            row.get(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?,
        )),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

async fn upsert_quiet_until(
    conn: &Connection,
    op: &str,
    list_id: &str,
    category: &str,
    sender: &str,
    quiet_until: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO autoresponse_records (list_id, category, sender, quiet_until) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (list_id, category, sender) DO UPDATE \
         SET quiet_until = excluded.quiet_until",
        params![list_id, category, sender, quiet_until],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
    Ok(())
}

const HEADER_MATCH_COLUMNS: &str = "id, list_id, header, pattern, chain, position";

async fn count_header_matches(conn: &Connection, list_id: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM header_matches WHERE list_id = ?1",
            params![list_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("count_header_matches: {e}")))?;
    match rows.next().await {
        Ok(Some(row)) => row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("count_header_matches row parse: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Query(format!("count_header_matches: {e}"))),
    }
}

/// Insert a row at an already-vacant position and return it.
async fn insert_at(
    conn: &Connection,
    op: &str,
    list_id: &str,
    position: i64,
    header: &str,
    pattern: &str,
    chain: Option<&str>,
) -> Result<HeaderMatch, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "INSERT INTO header_matches (list_id, header, pattern, chain, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {HEADER_MATCH_COLUMNS}"
            ),
            params![list_id, header, pattern, opt_text(chain), position],
        )
        .await
        .map_err(|e| insert_error(op, e))?;

    match rows.next().await {
        Ok(Some(row)) => row_to_header_match(&row)
            .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}"))),
        Ok(None) => Err(DatabaseError::Query(format!("{op}: insert returned no row"))),
        Err(e) => Err(insert_error(op, e)),
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Header matches ──────────────────────────────────────────────

    async fn header_matches(&self, list_id: &str) -> Result<Vec<HeaderMatch>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {HEADER_MATCH_COLUMNS} FROM header_matches WHERE list_id = ?1 ORDER BY position, id"
                ),
                params![list_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("header_matches: {e}")))?;

        let mut matches = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("header_matches: {e}")))?
        {
            matches.push(
                row_to_header_match(&row)
                    .map_err(|e| DatabaseError::Query(format!("header_matches row parse: {e}")))?,
            );
        }
        Ok(matches)
    }

    async fn append_header_match(
        &self,
        list_id: &str,
        header: &str,
        pattern: &str,
        chain: Option<&str>,
    ) -> Result<HeaderMatch, DatabaseError> {
        let header = header.to_lowercase();
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("append_header_match: {e}")))?;

        let position = count_header_matches(&tx, list_id).await?;
        let entry = insert_at(
            &tx,
            "append_header_match",
            list_id,
            position,
            &header,
            pattern,
            chain,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("append_header_match commit: {e}")))?;

        debug!(list = %list_id, header = %entry.header, position, "Header match appended");
        Ok(entry)
    }

    async fn insert_header_match(
        &self,
        list_id: &str,
        position: i64,
        header: &str,
        pattern: &str,
        chain: Option<&str>,
    ) -> Result<HeaderMatch, DatabaseError> {
        let header = header.to_lowercase();
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_header_match: {e}")))?;

        let total = count_header_matches(&tx, list_id).await?;
        let position = position.clamp(0, total);

        tx.execute(
            "UPDATE header_matches SET position = position + 1 WHERE list_id = ?1 AND position >= ?2",
            params![list_id, position],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_header_match: {e}")))?;

        // Dropping the transaction on error rolls the shift back.
        let entry = insert_at(
            &tx,
            "insert_header_match",
            list_id,
            position,
            &header,
            pattern,
            chain,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_header_match commit: {e}")))?;

        debug!(list = %list_id, header = %entry.header, position, "Header match inserted");
        Ok(entry)
    }

    async fn remove_header_match(
        &self,
        list_id: &str,
        header: &str,
        pattern: &str,
    ) -> Result<bool, DatabaseError> {
        let header = header.to_lowercase();
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_header_match: {e}")))?;

        let mut rows = tx
            .query(
                "DELETE FROM header_matches WHERE list_id = ?1 AND header = ?2 AND pattern = ?3 RETURNING position",
                params![list_id, header.as_str(), pattern],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_header_match: {e}")))?;
        let removed: Option<i64> = match rows.next().await {
            Ok(Some(row)) => Some(row.get(0).map_err(|e| {
                DatabaseError::Query(format!("remove_header_match row parse: {e}"))
            })?),
            Ok(None) => None,
            Err(e) => return Err(DatabaseError::Query(format!("remove_header_match: {e}"))),
        };
        drop(rows);

        let Some(position) = removed else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE header_matches SET position = position - 1 WHERE list_id = ?1 AND position > ?2",
            params![list_id, position],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("remove_header_match: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_header_match commit: {e}")))?;

        debug!(list = %list_id, header = %header, position, "Header match removed");
        Ok(true)
    }

    async fn clear_header_matches(&self, list_id: &str) -> Result<usize, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "DELETE FROM header_matches WHERE list_id = ?1",
                params![list_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_header_matches: {e}")))?;

        if count > 0 {
            info!(list = %list_id, count, "Cleared header matches");
        }
        Ok(count as usize)
    }

    // ── Autoresponse throttling ─────────────────────────────────────

    async fn quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        read_quiet_until(self.conn(), "quiet_until", list_id, category, sender).await
    }

    async fn reserve_response(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        now: i64,
        quiet_until: i64,
    ) -> Result<Reservation, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("reserve_response: {e}")))?;

        let previous = read_quiet_until(&tx, "reserve_response", list_id, category, sender).await?;

        let changed = tx
            .execute(
                "INSERT INTO autoresponse_records (list_id, category, sender, quiet_until) \
                 VALUES (?1, ?2, ?3, ?5) \
                 ON CONFLICT (list_id, category, sender) DO UPDATE \
                 SET quiet_until = excluded.quiet_until \
                 WHERE autoresponse_records.quiet_until <= ?4",
                params![list_id, category, sender, now, quiet_until],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reserve_response: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("reserve_response commit: {e}")))?;

        if changed > 0 {
            return Ok(Reservation::Granted { previous });
        }
        Ok(Reservation::Throttled {
            quiet_until: previous.unwrap_or(quiet_until),
        })
    }

    async fn set_quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        quiet_until: i64,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        upsert_quiet_until(
            self.conn(),
            "set_quiet_until",
            list_id,
            category,
            sender,
            quiet_until,
        )
        .await
    }

    async fn restore_quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        previous: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        match previous {
            Some(quiet_until) => {
                upsert_quiet_until(
                    self.conn(),
                    "restore_quiet_until",
                    list_id,
                    category,
                    sender,
                    quiet_until,
                )
                .await
            }
            None => {
                self.conn()
                    .execute(
                        "DELETE FROM autoresponse_records WHERE list_id = ?1 AND category = ?2 AND sender = ?3",
                        params![list_id, category, sender],
                    )
                    .await
                    .map_err(|e| DatabaseError::Query(format!("restore_quiet_until: {e}")))?;
                Ok(())
            }
        }
    }
}
