//! Configuration for the Postgres-backed store adapter.

use std::time::Duration;

/// Configuration for [`crate::Store`] connection pooling and retry behavior.
///
/// # Examples
///
/// ```
/// use relwatch_store::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.max_retries, 5);
///
/// let config = StoreConfig {
///     max_connections: 20,
///     ..Default::default()
/// };
/// assert_eq!(config.max_connections, 20);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
   /// Maximum number of pooled connections used for transactions.
   ///
   /// Default: 10.
   pub max_connections: u32,

   /// Minimum number of connections the pool keeps warm.
   ///
   /// Default: 0.
   pub min_connections: u32,

   /// How long `begin()` waits for a pool connection before giving up.
   ///
   /// Default: 10 seconds.
   pub acquire_timeout: Duration,

   /// Idle timeout after which a pooled connection is closed.
   ///
   /// Default: 5 minutes.
   pub idle_timeout: Option<Duration>,

   /// `statement_timeout` applied to every connection on acquisition.
   ///
   /// Default: 30 seconds.
   pub statement_timeout: Option<Duration>,

   /// Maximum number of times a transaction is retried after a serialization
   /// failure (Postgres SQLSTATE `40001`) before the caller sees `Conflict`.
   ///
   /// Default: 5.
   pub max_retries: u32,

   /// Base delay for the exponential backoff between retries.
   ///
   /// Default: 10ms.
   pub retry_base_delay: Duration,

   /// Cap on the exponential backoff between retries.
   ///
   /// Default: 500ms.
   pub retry_max_delay: Duration,
}

impl Default for StoreConfig {
   fn default() -> Self {
      Self {
         max_connections: 10,
         min_connections: 0,
         acquire_timeout: Duration::from_secs(10),
         idle_timeout: Some(Duration::from_secs(300)),
         statement_timeout: Some(Duration::from_secs(30)),
         max_retries: 5,
         retry_base_delay: Duration::from_millis(10),
         retry_max_delay: Duration::from_millis(500),
      }
   }
}

impl StoreConfig {
   /// Creates a configuration with default settings.
   pub fn new() -> Self {
      Self::default()
   }

   /// Computes the backoff delay for the given (zero-based) retry attempt,
   /// with a small amount of jitter to avoid synchronized retries from
   /// concurrent transactions.
   pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
      let exp = self.retry_base_delay.saturating_mul(1u32 << attempt.min(16));
      let capped = exp.min(self.retry_max_delay);
      let jitter_ms = rand::random::<u64>() % (capped.as_millis() as u64 / 4 + 1);
      capped + Duration::from_millis(jitter_ms)
   }
}
