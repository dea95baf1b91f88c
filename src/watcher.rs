//! Per-subscription watch state machine: initial snapshot, then live tail.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use relwatch_store::{NotificationRecord, Op, OrderColumn, OrderDirection};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::codec::Record;
use crate::database::Database;
use crate::descriptor::CollectionDescriptor;
use crate::error::Error;
use crate::options::Filter;

/// The state a watch subscription is in.
///
/// Mirrors the per-subscription state machine: a watcher starts
/// `Snapshotting`, transitions to `Live` once the initial read and staged
/// buffer drain complete, and ends in either `Closed` (consumer-initiated)
/// or `Errored` (overflow, reconnect-without-resubscribe, or cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
   Snapshotting,
   Live,
   Errored,
   Closed,
}

/// A single delivered change, or a terminal error ending the subscription.
#[derive(Debug)]
pub enum Event<T> {
   Put { key: String, value: T },
   Delete { key: String },
   Error(Error),
}

/// What a [`WatchSink`] wants to happen after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
   Continue,
   Break,
}

/// A push-based consumer of watch events.
///
/// `on_event` returning `Ok(SinkControl::Break)` ends the subscription
/// cleanly; returning `Err` ends it with that error. Both are terminal —
/// the watcher task stops driving the sink either way.
pub trait WatchSink<T>: Send {
   fn on_event(
      &mut self,
      event: Event<T>,
   ) -> impl std::future::Future<Output = Result<SinkControl, Error>> + Send;
}

/// A pull-based stream of watch events for a single subscription.
///
/// Ends only when the watcher transitions to `Closed` or `Errored`; the
/// final item delivered is always an `Event::Error` in the `Errored` case.
pub struct WatchStream<T> {
   receiver: mpsc::Receiver<Event<T>>,
   cancellation: CancellationToken,
}

impl<T> WatchStream<T> {
   /// Cancels this subscription. The stream yields one final
   /// `Event::Error(Error::Canceled)` and then ends.
   pub fn cancel(&self) {
      self.cancellation.cancel();
   }
}

impl<T> Stream for WatchStream<T> {
   type Item = Event<T>;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
      self.receiver.poll_recv(cx)
   }
}

/// Starts a watch subscription over `descriptor` matching `filter`,
/// returning a [`WatchStream`] for pull-based consumption.
#[instrument(skip(database, descriptor), fields(collection = %descriptor.name()))]
pub async fn watch_stream<T: Record>(
   database: &Database,
   descriptor: &CollectionDescriptor<T>,
   filter: Filter,
) -> crate::error::Result<WatchStream<T>> {
   let cancellation = CancellationToken::new();
   let (tx, rx) = mpsc::channel(database.listener_config().buffer_capacity);
   spawn_driver(database.clone(), descriptor.clone(), filter, cancellation.clone(), tx);
   Ok(WatchStream {
      receiver: rx,
      cancellation,
   })
}

/// Starts a watch subscription over `descriptor` matching `filter`, driving
/// `sink` until it returns `Break`, an error, or the subscription ends.
///
/// Returns once the subscription has fully ended; the returned `Result`
/// reflects how it ended (`Ok(())` for a clean `Break` or consumer-driven
/// `Canceled`, `Err` for anything else).
#[instrument(skip(database, descriptor, sink), fields(collection = %descriptor.name()))]
pub async fn watch_sink<T, S>(
   database: &Database,
   descriptor: &CollectionDescriptor<T>,
   filter: Filter,
   mut sink: S,
) -> crate::error::Result<()>
where
   T: Record,
   S: WatchSink<T>,
{
   let mut stream = watch_stream(database, descriptor, filter).await?;
   loop {
      let Some(event) = tokio_stream::StreamExt::next(&mut stream).await else {
         return Ok(());
      };
      let is_error = matches!(event, Event::Error(_));
      match sink.on_event(event).await {
         Ok(SinkControl::Continue) => {
            if is_error {
               return Ok(());
            }
         }
         Ok(SinkControl::Break) => return Ok(()),
         Err(e) => return Err(e),
      }
   }
}

fn spawn_driver<T: Record>(
   database: Database,
   descriptor: CollectionDescriptor<T>,
   filter: Filter,
   cancellation: CancellationToken,
   events: mpsc::Sender<Event<T>>,
) {
   tokio::spawn(async move {
      if let Err(e) = drive(&database, &descriptor, &filter, &cancellation, &events).await {
         let _ = events.send(Event::Error(e)).await;
      }
   });
}

#[instrument(skip_all, fields(collection = %descriptor.name()))]
async fn drive<T: Record>(
   database: &Database,
   descriptor: &CollectionDescriptor<T>,
   filter: &Filter,
   cancellation: &CancellationToken,
   events: &mpsc::Sender<Event<T>>,
) -> crate::error::Result<()> {
   'resubscribe: loop {
      debug!("entering snapshotting state");
      let channel = descriptor.untyped().channel_name();
      let mut subscription = database.multiplexer().subscribe(&channel).await?;

      let index = filter.as_store_index();
      let (rows, cutoff) = database
         .store()
         .snapshot(descriptor.untyped(), index, OrderColumn::Key, OrderDirection::Unordered)
         .await?;

      for row in rows {
         if let Filter::OneKey(key) = filter {
            if &row.key != key {
               continue;
            }
         }
         let value = T::decode(&row.value)?;
         if events.send(Event::Put { key: row.key, value }).await.is_err() {
            return Ok(());
         }
      }

      debug!(cutoff, "snapshot complete, transitioning to live");

      loop {
         tokio::select! {
            _ = cancellation.cancelled() => {
               let _ = events.send(Event::Error(Error::Canceled)).await;
               return Ok(());
            }
            delivery = tokio_stream::StreamExt::next(&mut subscription) => {
               match delivery {
                  None => return Ok(()),
                  Some(Ok(record)) => {
                     if record.rev <= cutoff {
                        continue;
                     }
                     if !matches_filter(database, descriptor, filter, &record).await? {
                        continue;
                     }
                     if !deliver(database, descriptor, events, record).await? {
                        return Ok(());
                     }
                  }
                  Some(Err(relwatch_notify::Error::Reconnect)) => {
                     warn!("listener reconnected, forcing re-snapshot");
                     continue 'resubscribe;
                  }
                  Some(Err(e)) => {
                     let _ = events.send(Event::Error(e.into())).await;
                     return Ok(());
                  }
               }
            }
         }
      }
   }
}

async fn matches_filter<T: Record>(
   database: &Database,
   descriptor: &CollectionDescriptor<T>,
   filter: &Filter,
   record: &NotificationRecord,
) -> crate::error::Result<bool> {
   match filter {
      Filter::AllKeys => Ok(true),
      Filter::OneKey(key) => Ok(&record.key == key),
      Filter::OneIndex { index_name, value } => {
         if record.op == Op::Delete {
            // The row is already gone; membership at delete time is decided
            // by whether it was in the index set before removal, which we
            // cannot recover from the notification alone. Conservatively
            // deliver Delete events for OneIndex filters; callers that need
            // precise membership should key their filter on a stable field.
            return Ok(true);
         }
         let row = database.store().read_row(descriptor.untyped(), &record.key).await;
         match row {
            Ok(row) => {
               let decoded = T::decode(&row.value)?;
               Ok(decoded.index_value(index_name).as_deref() == Some(value.as_str()))
            }
            Err(_) => Ok(false),
         }
      }
   }
}

async fn deliver<T: Record>(
   database: &Database,
   descriptor: &CollectionDescriptor<T>,
   events: &mpsc::Sender<Event<T>>,
   record: NotificationRecord,
) -> crate::error::Result<bool> {
   let event = match record.op {
      Op::Delete => Event::Delete { key: record.key },
      Op::Put => {
         let value = if let Some(bytes) = record.value {
            T::decode(&bytes)?
         } else {
            let row = database.store().read_row(descriptor.untyped(), &record.key).await?;
            T::decode(&row.value)?
         };
         Event::Put { key: record.key, value }
      }
   };
   Ok(events.send(event).await.is_ok())
}
