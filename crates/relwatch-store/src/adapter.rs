//! The Postgres-backed store adapter: pool management, schema provisioning,
//! and transactional row operations with retry-on-conflict.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool, Postgres};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::notification::NotificationRecord;
use crate::row::{OrderColumn, OrderDirection, Row};
use crate::schema::CollectionDescriptor;

/// A Postgres-backed store: owns the connection pool, provisions collection
/// schemas on first use, and hands out [`StoreTransaction`] handles for
/// transactional reads and writes.
///
/// Cloning a `Store` is cheap; it shares the underlying pool and the set of
/// already-provisioned collections.
#[derive(Clone)]
pub struct Store {
   pool: PgPool,
   config: StoreConfig,
   provisioned: Arc<AsyncMutex<HashSet<String>>>,
}

impl std::fmt::Debug for Store {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Store").field("config", &self.config).finish_non_exhaustive()
   }
}

impl Store {
   /// Connects to Postgres using the given connection string and pool
   /// configuration.
   #[instrument(skip(config), fields(max_connections = config.max_connections))]
   pub async fn connect(connect_string: &str, config: StoreConfig) -> Result<Self> {
      let options: PgConnectOptions = connect_string
         .parse()
         .map_err(|e| Error::Fatal(format!("invalid connection string: {e}")))?;
      Self::connect_with_options(options, config).await
   }

   /// Connects to Postgres using an already-constructed [`PgConnectOptions`],
   /// useful when the caller wants to set TLS or application-name options
   /// directly.
   pub async fn connect_with_options(
      options: PgConnectOptions,
      config: StoreConfig,
   ) -> Result<Self> {
      let statement_timeout = config.statement_timeout;
      let pool = PgPoolOptions::new()
         .max_connections(config.max_connections)
         .min_connections(config.min_connections)
         .acquire_timeout(config.acquire_timeout)
         .idle_timeout(config.idle_timeout)
         .after_connect(move |conn, _meta| {
            Box::pin(async move {
               if let Some(timeout) = statement_timeout {
                  let ms = timeout.as_millis();
                  conn.execute(format!("SET statement_timeout = {ms}").as_str())
                     .await?;
               }
               Ok(())
            })
         })
         .connect_with(options)
         .await
         .map_err(Error::classify)?;

      Ok(Self {
         pool,
         config,
         provisioned: Arc::new(AsyncMutex::new(HashSet::new())),
      })
   }

   /// Returns the pool configuration this store was constructed with.
   pub fn config(&self) -> &StoreConfig {
      &self.config
   }

   /// Returns the underlying connection pool, for callers (such as the
   /// listener multiplexer) that need to open their own dedicated
   /// connections against the same database.
   pub fn pool(&self) -> &PgPool {
      &self.pool
   }

   /// Ensures the tables and sequence backing `descriptor` exist, running the
   /// collection's DDL statements at most once per `Store` instance.
   #[instrument(skip(self, descriptor), fields(collection = %descriptor.name))]
   pub async fn ensure_collection(&self, descriptor: &CollectionDescriptor) -> Result<()> {
      let mut provisioned = self.provisioned.lock().await;
      if provisioned.contains(&descriptor.name) {
         return Ok(());
      }
      let mut tx = self.pool.begin().await.map_err(Error::classify)?;
      for statement in descriptor.ddl_statements() {
         tx.execute(statement.as_str()).await.map_err(Error::classify)?;
      }
      tx.commit().await.map_err(Error::classify)?;
      provisioned.insert(descriptor.name.clone());
      debug!("provisioned collection schema");
      Ok(())
   }

   /// Fetches a single row directly against the pool, outside any explicit
   /// transaction.
   ///
   /// Used by watchers resolving index membership or back-reading an
   /// oversized notification payload, where opening a full transaction for
   /// one read would be wasteful.
   pub async fn read_row(&self, descriptor: &CollectionDescriptor, key: &str) -> Result<Row> {
      let table = descriptor.table_name();
      let sql = format!(
         "SELECT key, value, created_rev, updated_rev, created_at, updated_at FROM {table} WHERE key = $1"
      );
      let row: Option<Row> = sqlx::query_as(&sql)
         .bind(key)
         .fetch_optional(&self.pool)
         .await
         .map_err(Error::classify)?;
      row.ok_or_else(|| Error::NotFound {
         collection: descriptor.name.clone(),
         key: key.to_string(),
      })
   }

   /// Reads a consistent snapshot of rows matching `index` together with a
   /// revision cutoff: the highest `updated_rev` among the rows this
   /// snapshot actually returned.
   ///
   /// Watchers use the cutoff to discard live notifications that are
   /// already reflected in the snapshot, per this store's gap-free tailing
   /// contract.
   #[instrument(skip(self, descriptor), fields(collection = %descriptor.name))]
   pub async fn snapshot(
      &self,
      descriptor: &CollectionDescriptor,
      index: Option<(&str, &str)>,
      order_by: OrderColumn,
      direction: OrderDirection,
   ) -> Result<(Vec<Row>, i64)> {
      let mut tx = self.begin().await?;
      let rows = tx.list(descriptor, index, order_by, direction).await?;
      // `relwatch_rev_seq` is not transactional — `nextval()` advances are
      // visible to every session immediately, even before the writer that
      // called it commits (or if it later rolls back). Reading the sequence
      // here would let the cutoff run ahead of what this snapshot actually
      // captured, silently dropping a live notification for a row that
      // committed after this read but was assigned its revision before it.
      // The cutoff must instead be the highest revision among the rows this
      // snapshot actually returned.
      let cutoff = rows.iter().map(|row| row.updated_rev).max().unwrap_or(0);
      tx.rollback().await?;
      Ok((rows, cutoff))
   }

   /// Begins a new transaction against this store.
   ///
   /// The returned handle owns one `SERIALIZABLE` Postgres transaction with
   /// deferred constraint checking; every read performed through it
   /// therefore observes its own writes. `SERIALIZABLE` (rather than plain
   /// `READ COMMITTED`) is what makes the get-then-write pattern used by
   /// `update`/`upsert` safe under concurrency: two transactions that read
   /// and then write the same row produce a real SQLSTATE `40001` on
   /// whichever commits second, instead of silently losing one write.
   pub async fn begin(&self) -> Result<StoreTransaction> {
      let mut tx = self.pool.begin().await.map_err(Error::classify)?;
      tx.execute("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
         .await
         .map_err(Error::classify)?;
      tx.execute("SET CONSTRAINTS ALL DEFERRED").await.map_err(Error::classify)?;
      Ok(StoreTransaction {
         inner: Some(tx),
         pending_notifications: Vec::new(),
      })
   }

   /// Shuts down the connection pool, waiting for in-flight connections to
   /// be returned.
   pub async fn close(&self) {
      self.pool.close().await;
   }
}

/// A single open transaction against the store.
///
/// Notifications emitted by `put`/`delete` calls are buffered and only sent
/// via `pg_notify` when the transaction commits, so a rolled-back
/// transaction never misleads a watcher.
#[must_use = "a StoreTransaction must be committed or rolled back, otherwise it is dropped and implicitly rolled back"]
pub struct StoreTransaction {
   inner: Option<sqlx::Transaction<'static, Postgres>>,
   pending_notifications: Vec<(String, NotificationRecord)>,
}

impl StoreTransaction {
   fn inner_mut(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>> {
      self.inner.as_mut().ok_or(Error::Closed)
   }

   /// Fetches a single row by key, or `NotFound` if it does not exist.
   pub async fn get(&mut self, descriptor: &CollectionDescriptor, key: &str) -> Result<Row> {
      let table = descriptor.table_name();
      let sql = format!(
         "SELECT key, value, created_rev, updated_rev, created_at, updated_at FROM {table} WHERE key = $1"
      );
      let row: Option<Row> = sqlx::query_as(&sql)
         .bind(key)
         .fetch_optional(self.inner_mut()?.as_mut())
         .await
         .map_err(Error::classify)?;
      row.ok_or_else(|| Error::NotFound {
         collection: descriptor.name.clone(),
         key: key.to_string(),
      })
   }

   /// Lists rows in the collection, optionally filtered to a single index
   /// value, ordered by the requested column and direction.
   pub async fn list(
      &mut self,
      descriptor: &CollectionDescriptor,
      index: Option<(&str, &str)>,
      order_by: OrderColumn,
      direction: OrderDirection,
   ) -> Result<Vec<Row>> {
      let table = descriptor.table_name();
      let order_clause = match direction {
         OrderDirection::Unordered => String::new(),
         OrderDirection::Ascending => format!(" ORDER BY {} ASC", order_by.column_name()),
         OrderDirection::Descending => format!(" ORDER BY {} DESC", order_by.column_name()),
      };

      let rows = if let Some((index_name, index_value)) = index {
         let idx_table = descriptor.index_table_name(index_name);
         let sql = format!(
            "SELECT r.key, r.value, r.created_rev, r.updated_rev, r.created_at, r.updated_at \
             FROM {table} r JOIN {idx_table} i ON i.key = r.key \
             WHERE i.index_value = $1{order_clause}"
         );
         sqlx::query_as(&sql)
            .bind(index_value)
            .fetch_all(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?
      } else {
         let sql = format!(
            "SELECT key, value, created_rev, updated_rev, created_at, updated_at FROM {table}{order_clause}"
         );
         sqlx::query_as(&sql)
            .fetch_all(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?
      };
      Ok(rows)
   }

   /// Counts rows in the collection, optionally filtered to a single index value.
   pub async fn count(
      &mut self,
      descriptor: &CollectionDescriptor,
      index: Option<(&str, &str)>,
   ) -> Result<i64> {
      let table = descriptor.table_name();
      let count: i64 = if let Some((index_name, index_value)) = index {
         let idx_table = descriptor.index_table_name(index_name);
         let sql = format!(
            "SELECT COUNT(*) FROM {table} r JOIN {idx_table} i ON i.key = r.key WHERE i.index_value = $1"
         );
         sqlx::query_scalar(&sql)
            .bind(index_value)
            .fetch_one(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?
      } else {
         let sql = format!("SELECT COUNT(*) FROM {table}");
         sqlx::query_scalar(&sql)
            .fetch_one(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?
      };
      Ok(count)
   }

   /// Inserts a new row. Fails with `Exists` if the key is already present.
   pub async fn create(
      &mut self,
      descriptor: &CollectionDescriptor,
      key: &str,
      value: &[u8],
      index_values: &[(&str, &str)],
   ) -> Result<i64> {
      self.insert_row(descriptor, key, value, index_values, true).await
   }

   /// Inserts or replaces a row unconditionally.
   pub async fn upsert(
      &mut self,
      descriptor: &CollectionDescriptor,
      key: &str,
      value: &[u8],
      index_values: &[(&str, &str)],
   ) -> Result<i64> {
      self.insert_row(descriptor, key, value, index_values, false).await
   }

   /// Replaces an existing row's value. Fails with `NotFound` if the key is absent.
   pub async fn update(
      &mut self,
      descriptor: &CollectionDescriptor,
      key: &str,
      value: &[u8],
      index_values: &[(&str, &str)],
   ) -> Result<i64> {
      let table = descriptor.table_name();
      let rev = next_rev(self.inner_mut()?).await?;
      let sql = format!(
         "UPDATE {table} SET value = $1, updated_rev = $2, updated_at = now() WHERE key = $3"
      );
      let result = sqlx::query(&sql)
         .bind(value)
         .bind(rev)
         .bind(key)
         .execute(self.inner_mut()?.as_mut())
         .await
         .map_err(Error::classify)?;
      if result.rows_affected() == 0 {
         return Err(Error::NotFound {
            collection: descriptor.name.clone(),
            key: key.to_string(),
         });
      }
      self.reindex(descriptor, key, index_values).await?;
      self.buffer_notification(descriptor, NotificationRecord::put(key, rev, value));
      Ok(rev)
   }

   async fn insert_row(
      &mut self,
      descriptor: &CollectionDescriptor,
      key: &str,
      value: &[u8],
      index_values: &[(&str, &str)],
      fail_if_exists: bool,
   ) -> Result<i64> {
      let table = descriptor.table_name();
      let rev = next_rev(self.inner_mut()?).await?;
      let sql = if fail_if_exists {
         format!(
            "INSERT INTO {table} (key, value, created_rev, updated_rev) VALUES ($1, $2, $3, $3)"
         )
      } else {
         format!(
            "INSERT INTO {table} (key, value, created_rev, updated_rev) VALUES ($1, $2, $3, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_rev = EXCLUDED.updated_rev, updated_at = now()"
         )
      };
      let result = sqlx::query(&sql)
         .bind(key)
         .bind(value)
         .bind(rev)
         .execute(self.inner_mut()?.as_mut())
         .await;
      match result {
         Ok(_) => {}
         Err(e) => {
            let classified = Error::classify(e);
            if fail_if_exists && is_unique_violation(&classified) {
               return Err(Error::Exists {
                  collection: descriptor.name.clone(),
                  key: key.to_string(),
               });
            }
            return Err(classified);
         }
      }
      self.reindex(descriptor, key, index_values).await?;
      self.buffer_notification(descriptor, NotificationRecord::put(key, rev, value));
      Ok(rev)
   }

   async fn reindex(
      &mut self,
      descriptor: &CollectionDescriptor,
      key: &str,
      index_values: &[(&str, &str)],
   ) -> Result<()> {
      for (index_name, index_value) in index_values {
         let idx_table = descriptor.index_table_name(index_name);
         let sql = format!(
            "INSERT INTO {idx_table} (index_value, key) VALUES ($1, $2) \
             ON CONFLICT (index_value, key) DO NOTHING"
         );
         sqlx::query(&sql)
            .bind(*index_value)
            .bind(key)
            .execute(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?;
      }
      Ok(())
   }

   /// Deletes a single row. Fails with `NotFound` if the key is absent.
   pub async fn delete(&mut self, descriptor: &CollectionDescriptor, key: &str) -> Result<i64> {
      let table = descriptor.table_name();
      let rev = next_rev(self.inner_mut()?).await?;
      let sql = format!("DELETE FROM {table} WHERE key = $1");
      let result = sqlx::query(&sql)
         .bind(key)
         .execute(self.inner_mut()?.as_mut())
         .await
         .map_err(Error::classify)?;
      if result.rows_affected() == 0 {
         return Err(Error::NotFound {
            collection: descriptor.name.clone(),
            key: key.to_string(),
         });
      }
      self.buffer_notification(descriptor, NotificationRecord::delete(key, rev));
      Ok(rev)
   }

   /// Deletes every row in the collection.
   ///
   /// Rows are removed in storage order, not creation or key order; callers
   /// that need a specific eviction order should delete individually.
   pub async fn delete_all(&mut self, descriptor: &CollectionDescriptor) -> Result<u64> {
      let table = descriptor.table_name();
      let rev = next_rev(self.inner_mut()?).await?;
      let keys: Vec<String> = sqlx::query_scalar(&format!("DELETE FROM {table} RETURNING key"))
         .fetch_all(self.inner_mut()?.as_mut())
         .await
         .map_err(Error::classify)?;
      let affected = keys.len() as u64;
      for key in keys {
         self.buffer_notification(descriptor, NotificationRecord::delete(key, rev));
      }
      Ok(affected)
   }

   fn buffer_notification(&mut self, descriptor: &CollectionDescriptor, record: NotificationRecord) {
      self.pending_notifications.push((descriptor.channel_name(), record));
   }

   /// Commits the transaction, emitting every buffered notification via
   /// `pg_notify` as part of the same commit.
   #[instrument(skip(self), fields(pending = self.pending_notifications.len()))]
   pub async fn commit(mut self) -> Result<()> {
      for (channel, record) in std::mem::take(&mut self.pending_notifications) {
         let payload = record
            .to_payload()
            .map_err(|e| Error::Fatal(format!("failed to encode notification payload: {e}")))?;
         sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&channel)
            .bind(&payload)
            .execute(self.inner_mut()?.as_mut())
            .await
            .map_err(Error::classify)?;
      }
      let tx = self.inner.take().ok_or(Error::Closed)?;
      tx.commit().await.map_err(Error::classify)
   }

   /// Rolls back the transaction, discarding any buffered notifications.
   pub async fn rollback(mut self) -> Result<()> {
      self.pending_notifications.clear();
      if let Some(tx) = self.inner.take() {
         tx.rollback().await.map_err(Error::classify)?;
      }
      Ok(())
   }
}

async fn next_rev(tx: &mut sqlx::Transaction<'static, Postgres>) -> Result<i64> {
   sqlx::query_scalar("SELECT nextval('relwatch_rev_seq')")
      .fetch_one(tx.as_mut())
      .await
      .map_err(Error::classify)
}

fn is_unique_violation(err: &Error) -> bool {
   matches!(err, Error::Sqlx(e) if e
      .as_database_error()
      .and_then(|d| d.code())
      .map(|c| c == "23505")
      .unwrap_or(false))
}

/// Used by callers that want to wait before retrying a transient connection
/// failure outside of the transaction retry loop (e.g. while reconnecting a
/// listener).
pub async fn sleep_for_reconnect(delay: Duration) {
   tokio::time::sleep(delay).await;
}
