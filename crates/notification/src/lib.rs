//! Push notifications for order events.
//!
//! - [`NotificationRegistry`] maps a subscriber to its single live channel
//! - [`NotificationDispatcher`] delivers events best-effort, dropping them for
//!   offline subscribers and unregistering subscribers whose channel fails
//! - [`PushChannel`] is the in-process channel handle backing SSE streams

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod registry;

pub use channel::{PushChannel, SubscriberChannel, push_channel};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::DeliveryError;
pub use event::OrderNotification;
pub use registry::NotificationRegistry;
