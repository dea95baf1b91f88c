//! Schema provisioning: one row table and zero or more index tables per collection.

use crate::error::{Error, Result};

/// Describes the on-disk shape of a collection: its name and the set of
/// named secondary indexes maintained alongside its row table.
///
/// This is the untyped, store-level counterpart of `relwatch`'s
/// `CollectionDescriptor<T>` — it knows nothing about the record type, only
/// the names needed to generate and address SQL tables.
#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
   pub name: String,
   pub indexes: Vec<String>,
}

impl CollectionDescriptor {
   /// Creates a descriptor for a collection with no secondary indexes.
   pub fn new(name: impl Into<String>) -> Result<Self> {
      let name = name.into();
      validate_identifier(&name)?;
      Ok(Self {
         name,
         indexes: Vec::new(),
      })
   }

   /// Adds a named secondary index to this descriptor.
   pub fn with_index(mut self, index_name: impl Into<String>) -> Result<Self> {
      let index_name = index_name.into();
      validate_identifier(&index_name)?;
      self.indexes.push(index_name);
      Ok(self)
   }

   /// The row table name for this collection.
   pub fn table_name(&self) -> String {
      format!("relwatch_{}", self.name)
   }

   /// The index table name for the given index.
   ///
   /// # Panics
   ///
   /// Panics if `index_name` was not registered via [`with_index`]. Callers
   /// only ever invoke this with names sourced from `self.indexes`.
   ///
   /// [`with_index`]: Self::with_index
   pub fn index_table_name(&self, index_name: &str) -> String {
      format!("relwatch_{}_idx_{}", self.name, index_name)
   }

   /// The `LISTEN`/`NOTIFY` channel name for this collection.
   pub fn channel_name(&self) -> String {
      format!("relwatch.{}", self.name)
   }

   /// DDL statements that idempotently provision this collection's tables.
   ///
   /// Callers execute these once per collection, typically the first time a
   /// [`crate::Store`] is asked to operate on it.
   pub fn ddl_statements(&self) -> Vec<String> {
      let table = self.table_name();
      let mut statements = vec![
         "CREATE SEQUENCE IF NOT EXISTS relwatch_rev_seq".to_string(),
         format!(
            "CREATE TABLE IF NOT EXISTS {table} (
               key TEXT PRIMARY KEY,
               value BYTEA NOT NULL,
               created_rev BIGINT NOT NULL,
               updated_rev BIGINT NOT NULL,
               created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
               updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
         ),
         format!("CREATE INDEX IF NOT EXISTS {table}_updated_rev_idx ON {table} (updated_rev)"),
         format!("CREATE INDEX IF NOT EXISTS {table}_created_rev_idx ON {table} (created_rev)"),
      ];
      for index in &self.indexes {
         let idx_table = self.index_table_name(index);
         statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {idx_table} (
               index_value TEXT NOT NULL,
               key TEXT NOT NULL REFERENCES {table}(key) ON DELETE CASCADE,
               PRIMARY KEY (index_value, key)
            )"
         ));
         statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {idx_table}_key_idx ON {idx_table} (key)"
         ));
      }
      statements
   }
}

/// Validates that a collection or index name is safe to interpolate directly
/// into generated SQL (table and channel names cannot be bound as
/// parameters).
///
/// Mirrors the identifier validation used for attached-database schema names
/// in comparable connection managers: ASCII alphanumeric plus underscore,
/// non-empty, and not leading with a digit.
pub fn validate_identifier(name: &str) -> Result<()> {
   let valid = !name.is_empty()
      && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
      && !name.chars().next().unwrap().is_ascii_digit();
   if valid {
      Ok(())
   } else {
      Err(Error::Fatal(format!(
         "invalid identifier '{name}': must be non-empty, alphanumeric/underscore, and not start with a digit"
      )))
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn rejects_empty_name() {
      assert!(validate_identifier("").is_err());
   }

   #[test]
   fn rejects_leading_digit() {
      assert!(validate_identifier("1items").is_err());
   }

   #[test]
   fn rejects_sql_metacharacters() {
      assert!(validate_identifier("items; DROP TABLE x--").is_err());
   }

   #[test]
   fn accepts_normal_identifier() {
      assert!(validate_identifier("pipeline_state").is_ok());
   }

   #[test]
   fn table_and_channel_names_are_namespaced() {
      let desc = CollectionDescriptor::new("items").unwrap();
      assert_eq!(desc.table_name(), "relwatch_items");
      assert_eq!(desc.channel_name(), "relwatch.items");
   }

   #[test]
   fn index_table_name_is_namespaced_per_collection() {
      let desc = CollectionDescriptor::new("items")
         .unwrap()
         .with_index("owner")
         .unwrap();
      assert_eq!(desc.index_table_name("owner"), "relwatch_items_idx_owner");
   }

   #[test]
   fn ddl_includes_one_statement_per_index() {
      let desc = CollectionDescriptor::new("items")
         .unwrap()
         .with_index("owner")
         .unwrap()
         .with_index("status")
         .unwrap();
      let ddl = desc.ddl_statements();
      let idx_creates = ddl
         .iter()
         .filter(|s| s.contains("CREATE TABLE IF NOT EXISTS relwatch_items_idx_"))
         .count();
      assert_eq!(idx_creates, 2);
   }
}
