//! Top-level configuration for opening a [`crate::Database`].

pub use relwatch_notify::ListenerConfig;
pub use relwatch_store::StoreConfig;

/// Bundles the pool configuration used for transactional reads/writes with
/// the configuration used for the dedicated `LISTEN` connection.
///
/// These are deliberately separate: the store pool can grow and shrink with
/// load, while the listener always owns exactly one long-lived connection
/// outside the pool, per this crate's concurrency model.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
   pub store: StoreConfig,
   pub listener: ListenerConfig,
}

impl DatabaseConfig {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_store(mut self, store: StoreConfig) -> Self {
      self.store = store;
      self
   }

   pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
      self.listener = listener;
      self
   }
}
