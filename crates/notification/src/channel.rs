//! Subscriber channel handles.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DeliveryError;
use crate::event::OrderNotification;

/// Write end of a live push connection.
///
/// Writes never block: a channel that cannot take an event right away
/// reports an error instead.
pub trait SubscriberChannel: Send + Sync {
    fn send(&self, event: &OrderNotification) -> Result<(), DeliveryError>;

    /// Closes the channel. Later sends fail with [`DeliveryError::Closed`].
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Channel backed by a bounded tokio mpsc queue.
///
/// The receiving half is typically turned into an SSE stream; closing the
/// channel drops the sender, which ends that stream.
pub struct PushChannel {
    tx: Mutex<Option<mpsc::Sender<OrderNotification>>>,
}

/// Creates a push channel buffering up to `buffer` undelivered events.
pub fn push_channel(buffer: usize) -> (PushChannel, mpsc::Receiver<OrderNotification>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (
        PushChannel {
            tx: Mutex::new(Some(tx)),
        },
        rx,
    )
}

impl SubscriberChannel for PushChannel {
    fn send(&self, event: &OrderNotification) -> Result<(), DeliveryError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(DeliveryError::Closed)?;
        tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|tx| tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{MemberEmail, OrderId};

    fn event() -> OrderNotification {
        OrderNotification::order_created(OrderId::new(), &MemberEmail::new("buyer@a.com"))
    }

    #[tokio::test]
    async fn delivers_to_receiver() {
        let (channel, mut rx) = push_channel(4);
        let sent = event();
        channel.send(&sent).unwrap();
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn close_ends_receiver_and_rejects_sends() {
        let (channel, mut rx) = push_channel(4);
        channel.close();
        assert!(channel.is_closed());
        assert!(rx.recv().await.is_none());
        assert_eq!(channel.send(&event()), Err(DeliveryError::Closed));
    }

    #[test]
    fn dropped_receiver_reports_disconnect() {
        let (channel, rx) = push_channel(4);
        drop(rx);
        assert!(channel.is_closed());
        assert_eq!(channel.send(&event()), Err(DeliveryError::Disconnected));
    }

    #[test]
    fn full_buffer_reports_lagging() {
        let (channel, _rx) = push_channel(1);
        channel.send(&event()).unwrap();
        assert_eq!(channel.send(&event()), Err(DeliveryError::Lagging));
    }
}
