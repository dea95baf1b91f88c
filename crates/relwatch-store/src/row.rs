//! The stored representation of a single key/value pair.

use chrono::{DateTime, Utc};

/// A single persisted row, as read back from a collection's row table.
///
/// `value` is the opaque, codec-encoded payload; `relwatch-store` never
/// interprets its contents, only stores and returns it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Row {
   pub key: String,
   pub value: Vec<u8>,
   pub created_rev: i64,
   pub updated_rev: i64,
   pub created_at: DateTime<Utc>,
   pub updated_at: DateTime<Utc>,
}

/// Which revision-bearing column to order or filter by when listing rows.
///
/// Mirrors the facade's `ListTarget`, kept separate so this crate never
/// needs to depend on the typed collection layer above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderColumn {
   Key,
   CreatedRev,
   UpdatedRev,
}

impl OrderColumn {
   pub(crate) fn column_name(self) -> &'static str {
      match self {
         OrderColumn::Key => "key",
         OrderColumn::CreatedRev => "created_rev",
         OrderColumn::UpdatedRev => "updated_rev",
      }
   }
}

/// Row ordering direction, or none (storage-defined order, fastest to scan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
   Ascending,
   Descending,
   Unordered,
}
