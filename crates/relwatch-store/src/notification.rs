//! The JSON payload carried over a collection's `NOTIFY` channel.

use serde::{Deserialize, Serialize};

/// The operation a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
   Put,
   Delete,
}

/// A single change notification, emitted via `pg_notify` in the same
/// transaction that performed the mutation.
///
/// Postgres caps a `NOTIFY` payload at roughly 8000 bytes, so `value` is
/// only populated when the encoded record fits comfortably under that
/// limit; otherwise subscribers fall back to reading the row directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
   pub op: Op,
   pub key: String,
   pub rev: i64,
   pub ts: chrono::DateTime<chrono::Utc>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub value: Option<Vec<u8>>,
}

/// Payloads larger than this are omitted from the notification and must be
/// re-read by the subscriber; Postgres's own limit is ~8000 bytes and this
/// leaves headroom for the JSON envelope and key.
pub const INLINE_VALUE_LIMIT: usize = 6000;

impl NotificationRecord {
   pub fn put(key: impl Into<String>, rev: i64, value: &[u8]) -> Self {
      let value = if value.len() <= INLINE_VALUE_LIMIT {
         Some(value.to_vec())
      } else {
         None
      };
      Self {
         op: Op::Put,
         key: key.into(),
         rev,
         ts: chrono::Utc::now(),
         value,
      }
   }

   pub fn delete(key: impl Into<String>, rev: i64) -> Self {
      Self {
         op: Op::Delete,
         key: key.into(),
         rev,
         ts: chrono::Utc::now(),
         value: None,
      }
   }

   /// Serializes to the JSON string passed as the `NOTIFY` payload.
   pub fn to_payload(&self) -> Result<String, serde_json::Error> {
      serde_json::to_string(self)
   }

   /// Parses a `NOTIFY` payload back into a record.
   pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
      serde_json::from_str(payload)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn small_value_is_inlined() {
      let record = NotificationRecord::put("k1", 7, b"hello");
      assert_eq!(record.value.as_deref(), Some(&b"hello"[..]));
   }

   #[test]
   fn oversized_value_is_omitted() {
      let big = vec![0u8; INLINE_VALUE_LIMIT + 1];
      let record = NotificationRecord::put("k1", 7, &big);
      assert!(record.value.is_none());
   }

   #[test]
   fn payload_round_trips() {
      let record = NotificationRecord::delete("k2", 9);
      let payload = record.to_payload().unwrap();
      let parsed = NotificationRecord::from_payload(&payload).unwrap();
      assert_eq!(parsed.key, "k2");
      assert_eq!(parsed.rev, 9);
      assert_eq!(parsed.op, Op::Delete);
   }
}
