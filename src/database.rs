//! The top-level handle: owns the store pool and the listener multiplexer.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use relwatch_notify::ListenerConfig;
use relwatch_store::Store;

use crate::codec::Record;
use crate::config::DatabaseConfig;
use crate::descriptor::CollectionDescriptor;
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::watcher::{watch_sink, watch_stream, WatchSink, WatchStream};
use crate::options::Filter;

/// A connected database: the Postgres pool backing transactional reads and
/// writes, and the dedicated `LISTEN` connection backing watchers.
///
/// Cloning is cheap; both halves share their underlying connections.
#[derive(Clone)]
pub struct Database {
   store: Store,
   multiplexer: relwatch_notify::ListenerMultiplexer,
   listener_config: ListenerConfig,
}

impl Database {
   /// Connects to Postgres, opening both the transactional pool and the
   /// dedicated listener connection against the same database.
   pub async fn connect(connect_string: &str, config: DatabaseConfig) -> Result<Self> {
      let store = Store::connect(connect_string, config.store).await?;
      let multiplexer =
         relwatch_notify::ListenerMultiplexer::connect(connect_string, config.listener.clone())
            .await
            .map_err(Error::from)?;
      Ok(Self {
         store,
         multiplexer,
         listener_config: config.listener,
      })
   }

   pub(crate) fn store(&self) -> &Store {
      &self.store
   }

   pub(crate) fn multiplexer(&self) -> &relwatch_notify::ListenerMultiplexer {
      &self.multiplexer
   }

   pub(crate) fn listener_config(&self) -> &ListenerConfig {
      &self.listener_config
   }

   /// Provisions the tables backing `descriptor`, if they do not already
   /// exist. Idempotent; callers typically invoke this once per collection
   /// at startup, before the collection is used in any transaction or
   /// watch.
   pub async fn ensure_collection<T: Record>(&self, descriptor: &CollectionDescriptor<T>) -> Result<()> {
      Ok(self.store.ensure_collection(descriptor.untyped()).await?)
   }

   /// Runs `body` inside a transaction, committing on `Ok` and rolling back
   /// on `Err`. Retries the whole closure with exponential backoff when the
   /// underlying store reports a serialization conflict, up to
   /// `StoreConfig::max_retries` attempts.
   ///
   /// `body` must be free of side effects outside the transaction, since it
   /// may run more than once.
   pub async fn transact<F, Fut, T>(&self, body: F) -> Result<T>
   where
      F: FnMut(&mut Transaction<'_>) -> Fut,
      Fut: std::future::Future<Output = Result<T>>,
   {
      self.transact_with_cancellation(CancellationToken::new(), body).await
   }

   /// As [`Database::transact`], but rolls back and returns
   /// [`Error::Canceled`] if `token` is canceled before the closure's
   /// transaction commits.
   pub async fn transact_with_cancellation<F, Fut, T>(
      &self,
      token: CancellationToken,
      mut body: F,
   ) -> Result<T>
   where
      F: FnMut(&mut Transaction<'_>) -> Fut,
      Fut: std::future::Future<Output = Result<T>>,
   {
      let config = self.store.config().clone();
      let mut attempt = 0u32;
      loop {
         let mut store_tx = self.store.begin().await?;
         let body_result = {
            let mut txn = Transaction::new(&mut store_tx, token.clone());
            tokio::select! {
               _ = token.cancelled() => Err(Error::Canceled),
               result = body(&mut txn) => result,
            }
         };

         match body_result {
            Ok(value) => {
               store_tx.commit().await?;
               return Ok(value);
            }
            Err(err) if err.is_retryable_conflict() && attempt < config.max_retries => {
               store_tx.rollback().await.ok();
               let delay = config.backoff_for_attempt(attempt);
               warn!(attempt, ?delay, "retrying transaction after serialization conflict");
               tokio::time::sleep(delay).await;
               attempt += 1;
            }
            Err(err) => {
               store_tx.rollback().await.ok();
               if let Error::Conflict { attempts: 0, .. } = err {
                  return Err(Error::Conflict {
                     collection: String::new(),
                     attempts: attempt + 1,
                  });
               }
               return Err(err);
            }
         }
      }
   }

   /// Starts a watch subscription over `descriptor` matching `filter`,
   /// returning a pull-based [`WatchStream`].
   pub async fn watch<T: Record>(
      &self,
      descriptor: &CollectionDescriptor<T>,
      filter: Filter,
   ) -> Result<WatchStream<T>> {
      watch_stream(self, descriptor, filter).await
   }

   /// Starts a watch subscription over `descriptor` matching `filter`,
   /// driving `sink` until it ends the subscription.
   pub async fn watch_with_sink<T, S>(
      &self,
      descriptor: &CollectionDescriptor<T>,
      filter: Filter,
      sink: S,
   ) -> Result<()>
   where
      T: Record,
      S: WatchSink<T>,
   {
      watch_sink(self, descriptor, filter, sink).await
   }

   /// Shuts down the connection pool and the listener task.
   pub async fn close(&self) {
      self.multiplexer.close();
      self.store.close().await;
   }
}
