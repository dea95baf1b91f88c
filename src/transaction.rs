//! A single atomic unit of work spanning one or more collections.

use tokio_util::sync::CancellationToken;

use crate::collection::Collection;
use crate::codec::Record;
use crate::descriptor::CollectionDescriptor;
use crate::error::{Error, Result};

/// An open transaction against the database.
///
/// Obtained from [`crate::Database::transact`]; operations on
/// [`Collection`] handles borrowed from it observe each other's writes
/// (read-your-own-writes) because they all share the one underlying SQL
/// transaction. A `Transaction` is never committed or rolled back directly
/// by user code — the closure passed to `transact` determines the outcome
/// by returning `Ok` or `Err`.
pub struct Transaction<'a> {
   pub(crate) store_tx: &'a mut relwatch_store::StoreTransaction,
   pub(crate) cancellation: CancellationToken,
}

impl<'a> Transaction<'a> {
   pub(crate) fn new(
      store_tx: &'a mut relwatch_store::StoreTransaction,
      cancellation: CancellationToken,
   ) -> Self {
      Self { store_tx, cancellation }
   }

   /// Returns a typed handle for reading and writing the given collection
   /// within this transaction.
   ///
   /// The collection must already have been provisioned via
   /// [`crate::Database::ensure_collection`]; this method does not issue any
   /// schema DDL itself.
   pub fn collection<'b, T: Record>(
      &'b mut self,
      descriptor: &'b CollectionDescriptor<T>,
   ) -> Collection<'b, T> {
      Collection::new(self.store_tx, descriptor)
   }

   /// Returns the cancellation token bound to this transaction.
   ///
   /// Long-running transaction bodies should check this between operations
   /// and return [`Error::Canceled`] promptly; `Database::transact` also
   /// races commit against this token so cancellation before commit always
   /// forces rollback even if the body does not check it itself.
   pub fn cancellation_token(&self) -> CancellationToken {
      self.cancellation.clone()
   }

   /// Returns `Err(Error::Canceled)` if this transaction's context has been
   /// canceled, otherwise `Ok(())`. A convenience for transaction bodies
   /// that want to bail out early between operations.
   pub fn check_canceled(&self) -> Result<()> {
      if self.cancellation.is_cancelled() {
         Err(Error::Canceled)
      } else {
         Ok(())
      }
   }
}
