//! The unified error surface callers of this crate see.

use crate::codec::CodecError;

/// Result type alias used throughout this crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by collections, transactions, and watchers.
///
/// Wraps the store and listener crates' error taxonomies into one enum so
/// callers match on a single type regardless of which layer produced the
/// error. [`Error::error_code`] gives the stable wire-level code from
/// section 6 of this subsystem's interface contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// No row exists for the given key.
   #[error("not found: collection '{collection}', key '{key}'")]
   NotFound { collection: String, key: String },

   /// A row already exists for the given key (`Create` precondition failed).
   #[error("already exists: collection '{collection}', key '{key}'")]
   Exists { collection: String, key: String },

   /// A serialization conflict persisted after exhausting the retry budget.
   #[error("conflict in collection '{collection}' after {attempts} attempt(s)")]
   Conflict { collection: String, attempts: u32 },

   /// The caller's context was canceled; for a transaction this means
   /// rollback, for a watcher this means the subscription has ended.
   #[error("operation was canceled")]
   Canceled,

   /// A watcher's subscriber queue overflowed and the subscription ended.
   #[error("watcher overflowed its buffer and was disconnected")]
   Overflow,

   /// The listener connection was lost and is reconnecting; a watcher
   /// receiving this must re-snapshot.
   #[error("listener connection is reconnecting")]
   Reconnect,

   /// Connection loss or other transient condition; safe to retry.
   #[error("transient error: {0}")]
   Transient(String),

   /// Non-retryable failure: schema mismatch, encoding error, invalid input.
   #[error("fatal error: {0}")]
   Fatal(String),

   /// A user-supplied callback (mutator, list callback, transaction body)
   /// returned an error; carries the caller's error message and aborts the
   /// enclosing transaction or list.
   #[error("user callback failed: {0}")]
   User(String),
}

impl Error {
   /// Returns `true` if this is a serialization conflict that has not yet
   /// exhausted its retry budget (the sentinel produced by converting a
   /// fresh `relwatch_store::Error::Conflict`); `Database::transact` uses
   /// this to decide whether to retry the whole closure.
   pub(crate) fn is_retryable_conflict(&self) -> bool {
      matches!(self, Error::Conflict { attempts: 0, .. })
   }

   /// Extracts a stable, machine-readable error code, matching the wire
   /// contract: `not_found`, `exists`, `conflict`, `canceled`, `overflow`,
   /// `reconnect`, `fatal`, `transient`.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::NotFound { .. } => "not_found",
         Error::Exists { .. } => "exists",
         Error::Conflict { .. } => "conflict",
         Error::Canceled => "canceled",
         Error::Overflow => "overflow",
         Error::Reconnect => "reconnect",
         Error::Transient(_) => "transient",
         Error::Fatal(_) => "fatal",
         Error::User(_) => "fatal",
      }
   }
}

impl From<relwatch_store::Error> for Error {
   fn from(err: relwatch_store::Error) -> Self {
      match err {
         relwatch_store::Error::NotFound { collection, key } => Error::NotFound { collection, key },
         relwatch_store::Error::Exists { collection, key } => Error::Exists { collection, key },
         relwatch_store::Error::Conflict { collection, attempts } => {
            Error::Conflict { collection, attempts }
         }
         relwatch_store::Error::Transient(msg) => Error::Transient(msg),
         relwatch_store::Error::Fatal(msg) => Error::Fatal(msg),
         relwatch_store::Error::Closed => Error::Fatal("store has been closed".to_string()),
         relwatch_store::Error::Sqlx(e) => Error::Transient(e.to_string()),
      }
   }
}

impl From<relwatch_notify::Error> for Error {
   fn from(err: relwatch_notify::Error) -> Self {
      match err {
         relwatch_notify::Error::Overflow => Error::Overflow,
         relwatch_notify::Error::Reconnect => Error::Reconnect,
         relwatch_notify::Error::Closed => Error::Fatal("listener multiplexer is closed".to_string()),
         relwatch_notify::Error::Malformed(msg) => Error::Fatal(msg),
      }
   }
}

impl From<CodecError> for Error {
   fn from(err: CodecError) -> Self {
      Error::Fatal(err.to_string())
   }
}
