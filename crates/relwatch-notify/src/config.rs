//! Configuration for the listener multiplexer.

use std::time::Duration;

/// Configuration for [`crate::ListenerMultiplexer`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
   /// Capacity of each subscriber's notification queue.
   ///
   /// **Important:** this is per-subscriber, not shared. A slow subscriber
   /// only drops its own notifications and is unsubscribed on overflow; it
   /// never blocks or affects other subscribers.
   ///
   /// Default: 1000.
   pub buffer_capacity: usize,

   /// Base delay before the first reconnect attempt after the `LISTEN`
   /// connection is lost.
   ///
   /// Default: 100ms.
   pub reconnect_base_delay: Duration,

   /// Cap on the exponential backoff between reconnect attempts.
   ///
   /// Default: 30 seconds.
   pub reconnect_max_delay: Duration,
}

impl Default for ListenerConfig {
   fn default() -> Self {
      Self {
         buffer_capacity: 1000,
         reconnect_base_delay: Duration::from_millis(100),
         reconnect_max_delay: Duration::from_secs(30),
      }
   }
}

impl ListenerConfig {
   /// Creates a configuration with default settings.
   pub fn new() -> Self {
      Self::default()
   }

   /// Computes the backoff delay for the given (zero-based) reconnect attempt.
   pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
      let exp = self
         .reconnect_base_delay
         .saturating_mul(1u32 << attempt.min(16));
      exp.min(self.reconnect_max_delay)
   }
}
