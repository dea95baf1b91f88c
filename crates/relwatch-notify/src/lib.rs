//! Single-connection `LISTEN`/`NOTIFY` fan-out for `relwatch`.
//!
//! A [`ListenerMultiplexer`] owns exactly one Postgres connection dedicated
//! to `LISTEN`, regardless of how many channels or subscribers are
//! registered against it, and routes incoming notifications to bounded,
//! per-subscriber queues. A subscriber that falls behind is unsubscribed and
//! told to resynchronize rather than slowing down or losing data for
//! everyone else.

mod config;
mod error;
mod multiplexer;
mod subscriber;

pub use config::ListenerConfig;
pub use error::{Error, Result};
pub use multiplexer::ListenerMultiplexer;
pub use subscriber::{Delivery, SubscriberId, Subscription};

pub use relwatch_store::{NotificationRecord, Op};
