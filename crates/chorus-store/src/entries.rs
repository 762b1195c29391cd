use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use tracing::instrument;

use chorus_core::{Entry, EntryId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const ENTRY_COLUMNS: &str = "id, parent_id, content, prompt, author, created_at, metadata";

/// Append-only repository for the entry tree.
///
/// Inserts are linearized by the database's connection mutex: the
/// parent-existence check and the INSERT run under one lock, so two
/// writers racing to reference the same missing parent both see it
/// missing. Entries are never updated or deleted.
#[derive(Clone)]
pub struct EntryRepo {
    db: Database,
}

impl EntryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a new entry and return it as stored.
    ///
    /// Rejects with `DanglingParent` when `parent_id` does not reference
    /// an existing entry; nothing is written in that case. The stored
    /// `created_at` is nudged forward when it would not be strictly later
    /// than the parent's, keeping ancestor chains strictly increasing.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    pub fn insert(&self, entry: &Entry) -> Result<Entry, StoreError> {
        self.db.with_conn(|conn| {
            let mut created_at = entry.created_at;

            if let Some(parent) = &entry.parent_id {
                let parent_ts: Option<String> = conn
                    .query_row(
                        "SELECT created_at FROM entries WHERE id = ?1",
                        [parent.as_str()],
                        |row| row.get(0),
                    )
                    .ok();
                let parent_ts = match parent_ts {
                    Some(raw) => row_helpers::parse_timestamp(&raw, "entries", "created_at")?,
                    None => {
                        return Err(StoreError::DanglingParent {
                            parent: parent.to_string(),
                        })
                    }
                };
                if created_at <= parent_ts {
                    created_at = parent_ts + ChronoDuration::microseconds(1);
                }
            }

            let stored = Entry {
                created_at,
                ..entry.clone()
            };

            conn.execute(
                "INSERT INTO entries (id, parent_id, content, prompt, author, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    stored.id.as_str(),
                    stored.parent_id.as_ref().map(|p| p.as_str()),
                    stored.content,
                    stored.prompt,
                    stored.author.to_string(),
                    format_timestamp(&stored.created_at),
                    serde_json::to_string(&stored.metadata)?,
                ],
            )?;

            Ok(stored)
        })
    }

    /// Fetch a single entry by ID.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn get(&self, id: &EntryId) -> Result<Entry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_entry(row),
                None => Err(StoreError::NotFound(format!("entry {id}"))),
            }
        })
    }

    /// The root-to-leaf lineage of an entry, oldest first, including the
    /// entry itself.
    ///
    /// Walks `parent_id` pointers toward the root: this is the traversal
    /// context assembly needs ("what happened before this entry"), not a
    /// descendant enumeration. O(depth) with the primary-key index.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn ancestor_chain(&self, id: &EntryId) -> Result<Vec<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH RECURSIVE lineage(id, parent_id, content, prompt, author, created_at, metadata, hops) AS (
                     SELECT id, parent_id, content, prompt, author, created_at, metadata, 0
                     FROM entries WHERE id = ?1
                     UNION ALL
                     SELECT e.id, e.parent_id, e.content, e.prompt, e.author, e.created_at, e.metadata, l.hops + 1
                     FROM entries e JOIN lineage l ON e.id = l.parent_id
                 )
                 SELECT id, parent_id, content, prompt, author, created_at, metadata
                 FROM lineage ORDER BY hops DESC",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut chain = Vec::new();
            while let Some(row) = rows.next()? {
                chain.push(row_to_entry(row)?);
            }
            if chain.is_empty() {
                return Err(StoreError::NotFound(format!("entry {id}")));
            }
            Ok(chain)
        })
    }

    /// Length of the ancestor chain without materializing entries.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn chain_len(&self, id: &EntryId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "WITH RECURSIVE lineage(id, parent_id) AS (
                     SELECT id, parent_id FROM entries WHERE id = ?1
                     UNION ALL
                     SELECT e.id, e.parent_id FROM entries e JOIN lineage l ON e.id = l.parent_id
                 )
                 SELECT COUNT(*) FROM lineage",
                [id.as_str()],
                |row| row.get(0),
            )?;
            if count == 0 {
                return Err(StoreError::NotFound(format!("entry {id}")));
            }
            Ok(count as usize)
        })
    }

    /// Direct children of an entry, ordered by creation time.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn children(&self, id: &EntryId) -> Result<Vec<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE parent_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_entry(row)?);
            }
            Ok(results)
        })
    }

    /// The entry and all of its descendants, ordered by creation time.
    /// Used by diff/merge tooling, never by context assembly.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn subtree(&self, id: &EntryId) -> Result<Vec<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "WITH RECURSIVE descendants(id) AS (
                     SELECT id FROM entries WHERE id = ?1
                     UNION ALL
                     SELECT e.id FROM entries e JOIN descendants d ON e.parent_id = d.id
                 )
                 SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE id IN (SELECT id FROM descendants)
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_entry(row)?);
            }
            if results.is_empty() {
                return Err(StoreError::NotFound(format!("entry {id}")));
            }
            Ok(results)
        })
    }
}

/// Fixed-precision RFC 3339 so lexicographic TEXT ordering matches
/// chronological ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<Entry, StoreError> {
    let author_raw: String = row_helpers::get(row, 4, "entries", "author")?;
    let created_raw: String = row_helpers::get(row, 5, "entries", "created_at")?;
    let metadata_raw: String = row_helpers::get(row, 6, "entries", "metadata")?;

    Ok(Entry {
        id: EntryId::from_raw(row_helpers::get::<String>(row, 0, "entries", "id")?),
        parent_id: row_helpers::opt_entry_id(row_helpers::get_opt::<String>(
            row, 1, "entries", "parent_id",
        )?),
        content: row_helpers::get(row, 2, "entries", "content")?,
        prompt: row_helpers::get(row, 3, "entries", "prompt")?,
        author: row_helpers::parse_author(&author_raw, "entries", "author")?,
        created_at: row_helpers::parse_timestamp(&created_raw, "entries", "created_at")?,
        metadata: row_helpers::parse_metadata(&metadata_raw, "entries", "metadata")?,
    })
}
