//! Shared fixtures for integration tests: a disposable Postgres container
//! and a small `Record` type used across the test suite.

use std::str::FromStr;

use relwatch::{CodecError, Database, DatabaseConfig, Record};
use serde::{Deserialize, Serialize};
use testcontainers::ContainerAsync;
use testcontainers_modules::{postgres, testcontainers::runners::AsyncRunner};
use tracing::Level;

#[ctor::ctor]
fn init_tracing() {
   if let Ok(level) = std::env::var("LOG_LEVEL") {
      let _ = tracing_subscriber::fmt()
         .with_max_level(Level::from_str(&level).unwrap_or(Level::INFO))
         .with_test_writer()
         .try_init();
   } else {
      let _ = tracing_subscriber::fmt()
         .with_max_level(Level::WARN)
         .with_test_writer()
         .try_init();
   }
}

/// The record type used throughout this crate's integration tests, matching
/// the `items` collection from the testable-properties scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
   pub id: String,
   pub value: String,
}

impl Item {
   pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
      Self {
         id: id.into(),
         value: value.into(),
      }
   }
}

impl Record for Item {
   fn primary_key(&self) -> String {
      self.id.clone()
   }

   fn encode(&self) -> Result<Vec<u8>, CodecError> {
      relwatch::codec::encode_json(self)
   }

   fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
      relwatch::codec::decode_json(bytes)
   }

   fn index_value(&self, index_name: &str) -> Option<String> {
      match index_name {
         "value" => Some(self.value.clone()),
         _ => None,
      }
   }
}

/// Starts a disposable Postgres container and connects a [`Database`] to it.
///
/// The returned container must be kept alive for as long as the database is
/// used; dropping it tears down the container.
pub async fn connect() -> (ContainerAsync<postgres::Postgres>, Database) {
   connect_with_config(DatabaseConfig::new()).await
}

/// Like [`connect`], but with caller-supplied configuration (e.g. a shrunk
/// listener buffer capacity for exercising overflow behavior).
pub async fn connect_with_config(config: DatabaseConfig) -> (ContainerAsync<postgres::Postgres>, Database) {
   let container = postgres::Postgres::default()
      .with_db_name("relwatch")
      .with_user("relwatch")
      .with_password("relwatch")
      .start()
      .await
      .expect("failed to start postgres container");

   let host = container.get_host().await.expect("container host");
   let port = container
      .get_host_port_ipv4(5432)
      .await
      .expect("container port");
   let connect_string =
      format!("postgres://relwatch:relwatch@{host}:{port}/relwatch");

   let db = Database::connect(&connect_string, config)
      .await
      .expect("failed to connect to test database");

   (container, db)
}
