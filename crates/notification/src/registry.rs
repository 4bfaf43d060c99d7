//! Subscriber → channel bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::MemberEmail;
use dashmap::DashMap;

use crate::channel::SubscriberChannel;

struct Registration {
    token: u64,
    channel: Arc<dyn SubscriberChannel>,
}

/// Concurrent map of subscriber identity to its live channel.
///
/// Each subscriber has at most one channel. Registering again closes and
/// replaces the previous one. Every registration gets a token so that a
/// failure observed on an old channel cannot remove its replacement.
pub struct NotificationRegistry {
    channels: DashMap<MemberEmail, Registration>,
    next_token: AtomicU64,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// Stores `channel` for `subscriber`, closing any channel it replaces.
    ///
    /// Returns the registration token.
    pub fn register(&self, subscriber: MemberEmail, channel: Arc<dyn SubscriberChannel>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .channels
            .insert(subscriber.clone(), Registration { token, channel });

        if let Some(previous) = previous {
            previous.channel.close();
            tracing::debug!(%subscriber, "replaced existing subscription");
        } else {
            tracing::debug!(%subscriber, "subscription registered");
        }
        metrics::gauge!("notification_subscribers").set(self.channels.len() as f64);
        token
    }

    /// Removes and closes the channel of `subscriber`.
    ///
    /// Returns false if there was nothing to remove.
    pub fn unregister(&self, subscriber: &MemberEmail) -> bool {
        match self.channels.remove(subscriber) {
            Some((_, registration)) => {
                registration.channel.close();
                tracing::debug!(%subscriber, "subscription removed");
                metrics::gauge!("notification_subscribers").set(self.channels.len() as f64);
                true
            }
            None => false,
        }
    }

    /// Removes the channel of `subscriber` only if it is still the
    /// registration identified by `token`.
    pub fn unregister_if(&self, subscriber: &MemberEmail, token: u64) -> bool {
        match self
            .channels
            .remove_if(subscriber, |_, registration| registration.token == token)
        {
            Some((_, registration)) => {
                registration.channel.close();
                tracing::debug!(%subscriber, token, "subscription removed after failure");
                metrics::gauge!("notification_subscribers").set(self.channels.len() as f64);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, subscriber: &MemberEmail) -> Option<Arc<dyn SubscriberChannel>> {
        self.channels
            .get(subscriber)
            .map(|registration| registration.channel.clone())
    }

    /// Like [`lookup`](Self::lookup), also returning the registration token.
    pub fn lookup_registration(
        &self,
        subscriber: &MemberEmail,
    ) -> Option<(u64, Arc<dyn SubscriberChannel>)> {
        self.channels
            .get(subscriber)
            .map(|registration| (registration.token, registration.channel.clone()))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for NotificationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
