//! Transactional, watchable, typed key/value collections backed by Postgres.
//!
//! This crate gives callers a uniform, strongly-consistent, typed
//! key/value interface over Postgres with live change notifications,
//! secondary indexes, transactional composition across collections, and
//! deterministic ordering. It is built from three layers:
//!
//! - [`relwatch_store`] owns the Postgres schema, connection pool, and
//!   transactional row/index operations.
//! - [`relwatch_notify`] owns a single long-lived `LISTEN` connection and
//!   fans raw notifications out to bounded per-subscriber queues.
//! - This crate's own modules (`collection`, `transaction`, `watcher`,
//!   `descriptor`, `codec`) add the typed facade, transaction composition,
//!   and the watcher state machine on top of those two.
//!
//! # Example
//!
//! ```no_run
//! use relwatch::{CollectionDescriptor, Database, DatabaseConfig, Record, CodecError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Item {
//!    id: String,
//!    value: String,
//! }
//!
//! impl Record for Item {
//!    fn primary_key(&self) -> String {
//!       self.id.clone()
//!    }
//!    fn encode(&self) -> Result<Vec<u8>, CodecError> {
//!       relwatch::codec::encode_json(self)
//!    }
//!    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
//!       relwatch::codec::decode_json(bytes)
//!    }
//!    fn index_value(&self, _index_name: &str) -> Option<String> {
//!       None
//!    }
//! }
//!
//! # async fn run() -> relwatch::Result<()> {
//! let db = Database::connect("postgres://localhost/mydb", DatabaseConfig::new()).await?;
//! let items: CollectionDescriptor<Item> = CollectionDescriptor::new("items")?;
//! db.ensure_collection(&items).await?;
//!
//! db.transact(|txn| {
//!    let items = &items;
//!    async move {
//!       let mut coll = txn.collection(items);
//!       coll
//!          .create("1", &Item { id: "1".into(), value: "hello".into() })
//!          .await?;
//!       Ok(())
//!    }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod collection;
pub mod config;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod options;
pub mod transaction;
pub mod watcher;

pub use codec::{CodecError, Record};
pub use collection::Collection;
pub use config::DatabaseConfig;
pub use database::Database;
pub use descriptor::CollectionDescriptor;
pub use error::{Error, Result};
pub use options::{Filter, ListOptions, ListOrder, ListTarget};
pub use transaction::Transaction;
pub use watcher::{Event, SinkControl, WatchSink, WatchStream, WatcherState};

pub use relwatch_notify::ListenerConfig;
pub use relwatch_store::StoreConfig;
