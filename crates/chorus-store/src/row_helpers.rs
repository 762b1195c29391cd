use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use chorus_core::entry::Author;
use chorus_core::EntryId;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON object column, returning CorruptRow on failure.
pub fn parse_metadata(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Map<String, Value>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse an author column (`AI:x` / `User:x` / `System:x`).
pub fn parse_author(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Author, StoreError> {
    raw.parse().map_err(|detail| StoreError::CorruptRow {
        table,
        column,
        detail,
    })
}

/// Parse an RFC 3339 timestamp column.
pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp: {e}"),
        })
}

/// Convert an optional raw ID column.
pub fn opt_entry_id(raw: Option<String>) -> Option<EntryId> {
    raw.map(EntryId::from_raw)
}
