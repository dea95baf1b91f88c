//! Error types for the listener multiplexer.

/// Result type alias for multiplexer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to subscribers of a [`crate::ListenerMultiplexer`].
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
   /// The subscriber's bounded queue filled up before it drained pending
   /// notifications. The subscription has been dropped; the caller must
   /// resynchronize (typically by re-listing the collection) and resubscribe.
   #[error("subscriber queue overflowed, notifications were dropped")]
   Overflow,

   /// The underlying `LISTEN` connection was lost and is being
   /// reestablished. Any notifications committed during the outage are not
   /// retried; the caller should resynchronize after reconnecting.
   #[error("listener connection was lost and is reconnecting")]
   Reconnect,

   /// The multiplexer has been shut down.
   #[error("listener multiplexer is closed")]
   Closed,

   /// The payload delivered by Postgres could not be decoded.
   #[error("malformed notification payload: {0}")]
   Malformed(String),
}

impl Error {
   /// Extract a stable, machine-readable error code, matching the store
   /// crate's taxonomy so the facade crate can present one unified surface.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Overflow => "overflow",
         Error::Reconnect => "reconnect",
         Error::Closed => "fatal",
         Error::Malformed(_) => "fatal",
      }
   }
}
