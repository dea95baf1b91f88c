//! A single subscriber's delivery channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use crate::error::Error;
use relwatch_store::NotificationRecord;

/// A delivered item: either a decoded notification, or an error condition
/// that terminates the subscription (overflow, reconnect, closed).
pub type Delivery = std::result::Result<NotificationRecord, Error>;

/// Opaque identifier for a registered subscription, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

/// The sending half registered with a [`crate::ListenerMultiplexer`]; not
/// constructed directly by callers.
pub(crate) type DeliverySender = mpsc::Sender<Delivery>;

/// A permit reserved on a subscriber's channel at registration time,
/// carved out of its capacity so the channel can never be too full to
/// accept it.
///
/// `dispatch` uses this to guarantee that a terminal `Overflow` event is
/// always delivered: a plain `try_send` on a channel that is already full
/// (the very definition of overflow) would itself fail, so the sentinel
/// needs capacity set aside in advance rather than competing for it.
pub(crate) type OverflowPermit = mpsc::OwnedPermit<Delivery>;

/// A stream of notifications for a single channel subscription.
///
/// Ends (yields `None`) only after the multiplexer sends a terminal error
/// (`Closed`) or the sender half is dropped; transient conditions
/// (`Overflow`, `Reconnect`) are yielded as `Some(Err(_))` items so the
/// caller can decide whether to resubscribe.
pub struct Subscription {
   id: SubscriberId,
   inner: ReceiverStream<Delivery>,
}

impl Subscription {
   pub(crate) fn new(id: SubscriberId, receiver: mpsc::Receiver<Delivery>) -> Self {
      Self {
         id,
         inner: ReceiverStream::new(receiver),
      }
   }

   /// The identifier this subscription was registered under.
   pub fn id(&self) -> SubscriberId {
      self.id
   }
}

impl Stream for Subscription {
   type Item = Delivery;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      Pin::new(&mut self.inner).poll_next(cx)
   }
}
