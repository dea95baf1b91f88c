//! Fan-out of a single `LISTEN` connection to many bounded subscriber queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sqlx::postgres::PgListener;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::subscriber::{Delivery, DeliverySender, OverflowPermit, SubscriberId, Subscription};
use relwatch_store::NotificationRecord;

type RouteEntry = (SubscriberId, DeliverySender, Option<OverflowPermit>);
type RoutingTable = RwLock<HashMap<String, Vec<RouteEntry>>>;

/// Waiters blocked in `subscribe` on the first `LISTEN` for a channel.
type ListenWaiters = Mutex<HashMap<String, Vec<oneshot::Sender<Result<()>>>>>;

struct Inner {
   connect_string: String,
   config: ListenerConfig,
   routes: RoutingTable,
   next_id: AtomicU64,
   cancellation: CancellationToken,
   /// Wakes the listener task out of `listener.recv()` so a freshly
   /// registered channel gets its `LISTEN` issued promptly instead of
   /// waiting for unrelated traffic on an already-subscribed channel.
   new_route: Notify,
   pending_listens: ListenWaiters,
}

/// A single Postgres `LISTEN` connection, multiplexed out to many bounded
/// per-subscriber queues.
///
/// There is exactly one underlying connection regardless of how many
/// channels or subscribers are registered; Postgres's `LISTEN` is
/// per-connection, so fanning a single connection out in-process avoids one
/// connection per watcher.
#[derive(Clone)]
pub struct ListenerMultiplexer {
   inner: Arc<Inner>,
}

impl ListenerMultiplexer {
   /// Connects to Postgres and spawns the background task that drives the
   /// `LISTEN` connection, reconnecting with exponential backoff on failure.
   pub async fn connect(connect_string: impl Into<String>, config: ListenerConfig) -> Result<Self> {
      let connect_string = connect_string.into();
      let inner = Arc::new(Inner {
         connect_string: connect_string.clone(),
         config,
         routes: RwLock::new(HashMap::new()),
         next_id: AtomicU64::new(0),
         cancellation: CancellationToken::new(),
         new_route: Notify::new(),
         pending_listens: Mutex::new(HashMap::new()),
      });

      let listener = PgListener::connect(&connect_string)
         .await
         .map_err(|e| Error::Malformed(format!("initial LISTEN connect failed: {e}")))?;

      let task_inner = Arc::clone(&inner);
      tokio::spawn(run_listener_loop(task_inner, listener));

      Ok(Self { inner })
   }

   /// Subscribes to a channel, returning a stream of notifications for it.
   ///
   /// Issues `LISTEN <channel>` on first subscriber for that channel; a
   /// second subscriber to the same channel reuses the existing `LISTEN`.
   pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
      let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
      // One extra slot is carved out and reserved up front so the terminal
      // Overflow sentinel always has somewhere to go, even when the
      // subscriber's own `buffer_capacity` slots are all full.
      let (tx, rx) = mpsc::channel(self.inner.config.buffer_capacity + 1);
      let overflow_permit = tx.clone().try_reserve_owned().map_err(|_| {
         Error::Malformed("failed to reserve overflow slot for new subscriber".into())
      })?;

      let ready_rx = {
         let mut routes = self.inner.routes.write();
         let entry = routes.entry(channel.to_string()).or_default();
         let is_new = entry.is_empty();
         entry.push((id, tx, Some(overflow_permit)));

         if is_new {
            let (ready_tx, ready_rx) = oneshot::channel();
            self.inner
               .pending_listens
               .lock()
               .entry(channel.to_string())
               .or_default()
               .push(ready_tx);
            Some(ready_rx)
         } else {
            None
         }
      };

      if let Some(ready_rx) = ready_rx {
         // The background task owns the actual PgListener; channel
         // registration happens there so LISTEN stays serialized with
         // reconnects. Wake it in case it's parked in `listener.recv()` on
         // existing channels, then wait for it to confirm the LISTEN is
         // actually in effect before handing back a subscription — otherwise
         // a NOTIFY sent between registration and the real LISTEN would
         // simply never reach this subscriber.
         debug!(channel, "first subscriber for channel, waiting for LISTEN");
         self.inner.new_route.notify_one();
         let outcome = ready_rx.await.map_err(|_| {
            Error::Malformed("listener task shut down before issuing LISTEN".into())
         })?;
         outcome?;
      }

      Ok(Subscription::new(id, rx))
   }

   /// Removes a subscription. Safe to call more than once for the same id.
   pub fn unsubscribe(&self, channel: &str, id: SubscriberId) {
      let mut routes = self.inner.routes.write();
      if let Some(subs) = routes.get_mut(channel) {
         subs.retain(|(sub_id, _, _)| *sub_id != id);
         if subs.is_empty() {
            routes.remove(channel);
         }
      }
   }

   /// Shuts down the background listener task. Existing subscriptions
   /// receive [`Error::Closed`] and then end.
   pub fn close(&self) {
      self.inner.cancellation.cancel();
   }
}

async fn run_listener_loop(inner: Arc<Inner>, mut listener: PgListener) {
   let mut attempt = 0u32;
   loop {
      if inner.cancellation.is_cancelled() {
         broadcast_terminal(&inner, Error::Closed);
         return;
      }

      resubscribe_channels(&inner, &mut listener).await;

      tokio::select! {
         _ = inner.cancellation.cancelled() => {
            broadcast_terminal(&inner, Error::Closed);
            return;
         }
         _ = inner.new_route.notified() => {
            // Loop back around to resubscribe_channels before the next recv.
         }
         notification = listener.recv() => {
            match notification {
               Ok(raw) => {
                  attempt = 0;
                  dispatch(&inner, raw.channel(), raw.payload());
               }
               Err(err) => {
                  warn!(error = %err, "LISTEN connection lost, reconnecting");
                  broadcast_transient(&inner, Error::Reconnect);
                  let delay = inner.config.backoff_for_attempt(attempt);
                  attempt = attempt.saturating_add(1);
                  tokio::time::sleep(delay).await;
                  match PgListener::connect(&inner.connect_string).await {
                     Ok(new_listener) => {
                        info!("LISTEN connection reestablished");
                        listener = new_listener;
                     }
                     Err(reconnect_err) => {
                        warn!(error = %reconnect_err, "reconnect attempt failed");
                     }
                  }
               }
            }
         }
      }
   }
}

async fn resubscribe_channels(inner: &Arc<Inner>, listener: &mut PgListener) {
   let channels: Vec<String> = inner.routes.read().keys().cloned().collect();
   for channel in channels {
      let outcome = listener.listen(&channel).await.map_err(|err| {
         warn!(channel = %channel, error = %err, "failed to issue LISTEN for channel");
         Error::Malformed(format!("LISTEN {channel} failed: {err}"))
      });

      let waiters = inner.pending_listens.lock().remove(&channel);
      if let Some(waiters) = waiters {
         for waiter in waiters {
            let _ = waiter.send(outcome.clone());
         }
      }
   }
}

fn dispatch(inner: &Arc<Inner>, channel: &str, payload: &str) {
   let record = match NotificationRecord::from_payload(payload) {
      Ok(record) => record,
      Err(err) => {
         warn!(channel, error = %err, "dropping malformed notification payload");
         return;
      }
   };

   let mut overflowed = Vec::new();
   {
      let routes = inner.routes.read();
      if let Some(subs) = routes.get(channel) {
         for (id, tx, _) in subs {
            let delivery: Delivery = Ok(record.clone());
            if tx.try_send(delivery).is_err() {
               overflowed.push(*id);
            }
         }
      }
   }

   if !overflowed.is_empty() {
      let mut routes = inner.routes.write();
      if let Some(subs) = routes.get_mut(channel) {
         for id in &overflowed {
            if let Some(pos) = subs.iter().position(|(sub_id, _, _)| sub_id == id) {
               let (_, _, permit) = subs.remove(pos);
               // The regular queue is full by definition here, so the
               // sentinel goes out through the slot reserved at
               // subscription time instead of competing for space with it.
               if let Some(permit) = permit {
                  permit.send(Err(Error::Overflow));
               }
            }
         }
         if subs.is_empty() {
            routes.remove(channel);
         }
      }
   }
}

fn broadcast_transient(inner: &Arc<Inner>, err: Error) {
   let routes = inner.routes.read();
   for subs in routes.values() {
      for (_, tx, _) in subs {
         let _ = tx.try_send(Err(err.clone()));
      }
   }
}

fn broadcast_terminal(inner: &Arc<Inner>, err: Error) {
   let mut routes = inner.routes.write();
   for (_, subs) in routes.drain() {
      for (_, tx, _) in subs {
         let _ = tx.try_send(Err(err.clone()));
      }
   }
}
