//! Postgres connection pooling, schema provisioning, and transactional row
//! storage for `relwatch`.
//!
//! This crate has no notion of typed records or watch streams; it exposes a
//! byte-oriented [`Store`] that the `relwatch` facade builds its typed
//! collections and transactions on top of, and that `relwatch-notify` reads
//! the connection pool from to open its own listener connection.

mod adapter;
mod config;
mod error;
mod notification;
mod row;
mod schema;

pub use adapter::{Store, StoreTransaction};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use notification::{NotificationRecord, Op, INLINE_VALUE_LIMIT};
pub use row::{OrderColumn, OrderDirection, Row};
pub use schema::{validate_identifier, CollectionDescriptor};
