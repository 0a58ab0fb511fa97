//! `Database` trait — single async interface for list persistence.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DatabaseError;

/// A persisted per-list header check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderMatch {
    pub id: i64,
    pub list_id: String,
    /// Header name, stored lower-cased.
    pub header: String,
    pub pattern: String,
    /// Jump target. `None` means the link only records its hit.
    pub chain: Option<String>,
    /// Zero-based position within the list's header matches.
    pub position: i64,
}

/// Result of trying to claim the right to send an automatic response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The response may be sent. `previous` is the quiet-until value that was
    /// replaced, if a record existed, so the claim can be undone.
    Granted { previous: Option<i64> },
    /// A response was already sent inside the grace period.
    Throttled { quiet_until: i64 },
}

/// Backend-agnostic database trait covering header matches and autoresponse
/// throttling.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Header matches ──────────────────────────────────────────────

    /// All header matches for a list, in position order.
    async fn header_matches(&self, list_id: &str) -> Result<Vec<HeaderMatch>, DatabaseError>;

    /// Append a header match at the end of the list's sequence.
    ///
    /// The header is lower-cased. A second record with the same header and
    /// pattern for the same list is a `DatabaseError::Constraint`.
    async fn append_header_match(
        &self,
        list_id: &str,
        header: &str,
        pattern: &str,
        chain: Option<&str>,
    ) -> Result<HeaderMatch, DatabaseError>;

    /// Insert a header match at `position`, shifting later records down.
    /// Positions past the end append.
    async fn insert_header_match(
        &self,
        list_id: &str,
        position: i64,
        header: &str,
        pattern: &str,
        chain: Option<&str>,
    ) -> Result<HeaderMatch, DatabaseError>;

    /// Remove a header match and close the gap. Returns whether a record
    /// was removed.
    async fn remove_header_match(
        &self,
        list_id: &str,
        header: &str,
        pattern: &str,
    ) -> Result<bool, DatabaseError>;

    /// Remove every header match for a list. Returns the number removed.
    async fn clear_header_matches(&self, list_id: &str) -> Result<usize, DatabaseError>;

    // ── Autoresponse throttling ─────────────────────────────────────

    /// Current quiet-until time (epoch seconds) for a sender, if any.
    async fn quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
    ) -> Result<Option<i64>, DatabaseError>;

    /// Atomically claim a response unless one is still quiet at `now`.
    ///
    /// On success the record's quiet-until becomes `quiet_until`.
    async fn reserve_response(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        now: i64,
        quiet_until: i64,
    ) -> Result<Reservation, DatabaseError>;

    /// Set the quiet-until time unconditionally.
    async fn set_quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        quiet_until: i64,
    ) -> Result<(), DatabaseError>;

    /// Undo a reservation: put back `previous`, or delete the record when
    /// there was none.
    async fn restore_quiet_until(
        &self,
        list_id: &str,
        category: &str,
        sender: &str,
        previous: Option<i64>,
    ) -> Result<(), DatabaseError>;
}
