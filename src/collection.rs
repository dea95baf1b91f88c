//! Typed read/write surface over a single collection within a transaction.

use std::marker::PhantomData;
use std::ops::ControlFlow;

use relwatch_store::StoreTransaction;

use crate::codec::Record;
use crate::descriptor::CollectionDescriptor;
use crate::error::Result;
use crate::options::{Filter, ListOptions};

/// A typed handle for reading and writing one collection within a
/// [`crate::Transaction`].
///
/// Borrows the transaction's underlying SQL transaction for its lifetime;
/// every operation participates in that transaction and is only durable
/// once the transaction commits.
pub struct Collection<'a, T: Record> {
   store_tx: &'a mut StoreTransaction,
   descriptor: &'a CollectionDescriptor<T>,
   _marker: PhantomData<T>,
}

impl<'a, T: Record> Collection<'a, T> {
   pub(crate) fn new(
      store_tx: &'a mut StoreTransaction,
      descriptor: &'a CollectionDescriptor<T>,
   ) -> Self {
      Self {
         store_tx,
         descriptor,
         _marker: PhantomData,
      }
   }

   /// Fetches the record stored under `key`.
   ///
   /// Errors with `NotFound` if no row exists for `key`.
   pub async fn get(&mut self, key: &str) -> Result<T> {
      let row = self.store_tx.get(self.descriptor.untyped(), key).await?;
      Ok(T::decode(&row.value)?)
   }

   /// Iterates every row matching `filter` in the order given by `options`,
   /// invoking `callback` for each decoded record.
   ///
   /// `callback` returning [`ControlFlow::Break`] stops iteration early and
   /// returns `Ok(())`; returning an `Err` from `callback` stops iteration
   /// and propagates that error out of `list` without affecting rows
   /// already visited.
   pub async fn list<F>(&mut self, filter: &Filter, options: ListOptions, mut callback: F) -> Result<()>
   where
      F: FnMut(&str, T) -> Result<ControlFlow<()>>,
   {
      let index = filter.as_store_index();
      let rows = self
         .store_tx
         .list(self.descriptor.untyped(), index, options.target.into(), options.order.into())
         .await?;

      for row in rows {
         if let Filter::OneKey(key) = filter {
            if &row.key != key {
               continue;
            }
         }
         let record = T::decode(&row.value)?;
         match callback(&row.key, record)? {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(()) => break,
         }
      }
      Ok(())
   }

   /// Collects every row matching `filter` into a `Vec`, in the order given
   /// by `options`.
   pub async fn list_all(&mut self, filter: &Filter, options: ListOptions) -> Result<Vec<(String, T)>> {
      let mut out = Vec::new();
      self
         .list(filter, options, |key, record| {
            out.push((key.to_string(), record));
            Ok(ControlFlow::Continue(()))
         })
         .await?;
      Ok(out)
   }

   /// Counts rows matching `filter`.
   pub async fn count(&mut self, filter: &Filter) -> Result<i64> {
      let index = filter.as_store_index();
      Ok(self.store_tx.count(self.descriptor.untyped(), index).await?)
   }

   /// Inserts `record` under `key`. Errors with `Exists` if `key` is
   /// already present.
   pub async fn create(&mut self, key: &str, record: &T) -> Result<i64> {
      let value = record.encode()?;
      let indexes = self.descriptor.index_entries(record);
      let indexes: Vec<(&str, &str)> = indexes.iter().map(|(n, v)| (*n, v.as_str())).collect();
      Ok(self.store_tx.create(self.descriptor.untyped(), key, &value, &indexes).await?)
   }

   /// Inserts or replaces the row at `key` unconditionally.
   pub async fn put(&mut self, key: &str, record: &T) -> Result<i64> {
      let value = record.encode()?;
      let indexes = self.descriptor.index_entries(record);
      let indexes: Vec<(&str, &str)> = indexes.iter().map(|(n, v)| (*n, v.as_str())).collect();
      Ok(self.store_tx.upsert(self.descriptor.untyped(), key, &value, &indexes).await?)
   }

   /// Replaces the row at `key` with the result of applying `mutator` to
   /// its current value. Errors with `NotFound` if `key` is absent.
   pub async fn update<F>(&mut self, key: &str, mutator: F) -> Result<i64>
   where
      F: FnOnce(T) -> Result<T>,
   {
      let current = self.get(key).await?;
      let updated = mutator(current)?;
      let value = updated.encode()?;
      let indexes = self.descriptor.index_entries(&updated);
      let indexes: Vec<(&str, &str)> = indexes.iter().map(|(n, v)| (*n, v.as_str())).collect();
      Ok(self.store_tx.update(self.descriptor.untyped(), key, &value, &indexes).await?)
   }

   /// Replaces the row at `key` with the result of applying `mutator` to
   /// its current value, or `None` if `key` is absent.
   pub async fn upsert<F>(&mut self, key: &str, mutator: F) -> Result<i64>
   where
      F: FnOnce(Option<T>) -> Result<T>,
   {
      let current = match self.get(key).await {
         Ok(record) => Some(record),
         Err(crate::error::Error::NotFound { .. }) => None,
         Err(e) => return Err(e),
      };
      let updated = mutator(current)?;
      let value = updated.encode()?;
      let indexes = self.descriptor.index_entries(&updated);
      let indexes: Vec<(&str, &str)> = indexes.iter().map(|(n, v)| (*n, v.as_str())).collect();
      Ok(self.store_tx.upsert(self.descriptor.untyped(), key, &value, &indexes).await?)
   }

   /// Removes the row at `key`. Errors with `NotFound` if `key` is absent.
   pub async fn delete(&mut self, key: &str) -> Result<i64> {
      Ok(self.store_tx.delete(self.descriptor.untyped(), key).await?)
   }

   /// Removes every row in the collection.
   ///
   /// The order of the resulting `Delete` notifications across keys is
   /// unspecified; consumers must not rely on it.
   pub async fn delete_all(&mut self) -> Result<u64> {
      Ok(self.store_tx.delete_all(self.descriptor.untyped()).await?)
   }
}
