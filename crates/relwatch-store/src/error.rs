//! Error types for the Postgres store adapter.

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the store adapter.
///
/// This is the error taxonomy described by the wire-level error surface:
/// `NotFound` and `Exists` are always surfaced to the caller unchanged,
/// `Conflict` is only surfaced after the internal retry budget is exhausted,
/// and `Transient` is surfaced for the caller to retry at a higher level.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// No row exists for the given key.
   #[error("not found: collection '{collection}', key '{key}'")]
   NotFound { collection: String, key: String },

   /// A row already exists for the given key (`Create` precondition failed).
   #[error("already exists: collection '{collection}', key '{key}'")]
   Exists { collection: String, key: String },

   /// Serialization failure persisted after exhausting the retry budget.
   #[error(
      "serialization conflict in collection '{collection}' after {attempts} attempt(s)"
   )]
   Conflict { collection: String, attempts: u32 },

   /// Connection loss or other transient condition; safe for the caller to retry.
   #[error("transient store error: {0}")]
   Transient(String),

   /// Non-retryable failure: schema mismatch, encoding error, or invalid input.
   #[error("fatal store error: {0}")]
   Fatal(String),

   /// The store has been closed and no longer accepts operations.
   #[error("store has been closed")]
   Closed,

   /// Unclassified error from SQLx.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),
}

impl Error {
   /// Extract a stable, machine-readable error code.
   ///
   /// Matches the wire-level error surface: `not_found`, `exists`,
   /// `conflict`, `transient`, `fatal`.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::NotFound { .. } => "not_found",
         Error::Exists { .. } => "exists",
         Error::Conflict { .. } => "conflict",
         Error::Transient(_) => "transient",
         Error::Fatal(_) => "fatal",
         Error::Closed => "fatal",
         Error::Sqlx(_) => "fatal",
      }
   }

   /// Classifies a raw SQLx error into the store's error taxonomy using the
   /// Postgres SQLSTATE code, where available.
   ///
   /// SQLSTATE class `40` (transaction rollback, e.g. `40001` serialization
   /// failure) is classified as retryable by the caller via
   /// [`Error::is_retryable_conflict`]; class `08` (connection exception) is
   /// `Transient`; everything else falls back to the opaque `Sqlx` variant.
   pub fn classify(err: sqlx::Error) -> Self {
      if let Some(db_err) = err.as_database_error() {
         if let Some(code) = db_err.code() {
            if code == "40001" {
               return Error::Conflict {
                  collection: String::new(),
                  attempts: 0,
               };
            }
            if code.starts_with("08") {
               return Error::Transient(db_err.message().to_string());
            }
         }
      }
      if matches!(
         err,
         sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
      ) {
         return Error::Transient(err.to_string());
      }
      Error::Sqlx(err)
   }

   /// Returns `true` if this error represents a serialization failure that a
   /// transaction retry loop should retry rather than surface immediately.
   pub fn is_retryable_conflict(&self) -> bool {
      matches!(self, Error::Conflict { attempts: 0, .. })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn error_code_matches_wire_taxonomy() {
      assert_eq!(
         Error::NotFound {
            collection: "items".into(),
            key: "1".into()
         }
         .error_code(),
         "not_found"
      );
      assert_eq!(
         Error::Exists {
            collection: "items".into(),
            key: "1".into()
         }
         .error_code(),
         "exists"
      );
      assert_eq!(
         Error::Conflict {
            collection: "items".into(),
            attempts: 3
         }
         .error_code(),
         "conflict"
      );
      assert_eq!(Error::Transient("boom".into()).error_code(), "transient");
      assert_eq!(Error::Fatal("boom".into()).error_code(), "fatal");
   }

   #[test]
   fn not_found_message_carries_collection_and_key() {
      let err = Error::NotFound {
         collection: "items".into(),
         key: "42".into(),
      };
      let msg = err.to_string();
      assert!(msg.contains("items"));
      assert!(msg.contains("42"));
   }
}
