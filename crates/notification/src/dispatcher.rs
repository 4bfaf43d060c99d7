//! Best-effort event delivery.

use std::sync::Arc;

use common::MemberEmail;

use crate::event::OrderNotification;
use crate::registry::NotificationRegistry;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to the subscriber's channel.
    Delivered,
    /// No channel registered; the event was dropped.
    Offline,
    /// The write failed; the event was dropped and the subscriber removed.
    Dropped,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Offline => "offline",
            DispatchOutcome::Dropped => "dropped",
        }
    }
}

/// Publishes events to registered subscribers.
///
/// Delivery is at-most-once: nothing is queued for offline subscribers and
/// failed writes are not retried.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: Arc<NotificationRegistry>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<NotificationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NotificationRegistry> {
        &self.registry
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub fn publish(&self, subscriber: &MemberEmail, event: &OrderNotification) -> DispatchOutcome {
        let outcome = match self.registry.lookup_registration(subscriber) {
            None => {
                tracing::debug!("subscriber offline, event dropped");
                DispatchOutcome::Offline
            }
            Some((token, channel)) => match channel.send(event) {
                Ok(()) => DispatchOutcome::Delivered,
                Err(error) => {
                    tracing::warn!(%error, "push failed, removing subscriber");
                    self.registry.unregister_if(subscriber, token);
                    DispatchOutcome::Dropped
                }
            },
        };
        metrics::counter!("notifications_dispatched_total", "outcome" => outcome.as_str())
            .increment(1);
        outcome
    }
}
