//! Typed collection descriptors.

use std::marker::PhantomData;

use crate::codec::Record;
use crate::error::Result;

/// Names a collection and its secondary indexes for a specific record type.
///
/// This is the typed counterpart of [`relwatch_store::CollectionDescriptor`];
/// it carries no schema beyond names, since the actual index values come
/// from `T::index_value` at write time.
#[derive(Debug)]
pub struct CollectionDescriptor<T> {
   inner: relwatch_store::CollectionDescriptor,
   _marker: PhantomData<fn() -> T>,
}

// Manual impl: `T` itself is never stored, so cloning a descriptor must not
// require `T: Clone` (the derive would add that bound unnecessarily).
impl<T> Clone for CollectionDescriptor<T> {
   fn clone(&self) -> Self {
      Self {
         inner: self.inner.clone(),
         _marker: PhantomData,
      }
   }
}

impl<T: Record> CollectionDescriptor<T> {
   /// Creates a descriptor for a collection with no secondary indexes.
   pub fn new(name: impl Into<String>) -> Result<Self> {
      let inner = relwatch_store::CollectionDescriptor::new(name)?;
      Ok(Self {
         inner,
         _marker: PhantomData,
      })
   }

   /// Adds a named secondary index, whose values come from `T::index_value`.
   pub fn with_index(mut self, index_name: impl Into<String>) -> Result<Self> {
      self.inner = self.inner.with_index(index_name)?;
      Ok(self)
   }

   /// The collection's name.
   pub fn name(&self) -> &str {
      &self.inner.name
   }

   /// The names of this collection's secondary indexes.
   pub fn indexes(&self) -> &[String] {
      &self.inner.indexes
   }

   pub(crate) fn untyped(&self) -> &relwatch_store::CollectionDescriptor {
      &self.inner
   }

   /// Computes the `(index_name, index_value)` pairs for `record` across
   /// every index this descriptor declares.
   pub(crate) fn index_entries(&self, record: &T) -> Vec<(&str, String)> {
      self
         .inner
         .indexes
         .iter()
         .filter_map(|name| record.index_value(name).map(|value| (name.as_str(), value)))
         .collect()
   }
}
