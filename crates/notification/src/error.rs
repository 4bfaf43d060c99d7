use thiserror::Error;

/// Reasons an event could not be written to a subscriber channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The channel was closed by the registry.
    #[error("Channel is closed")]
    Closed,

    /// The receiving end went away.
    #[error("Subscriber disconnected")]
    Disconnected,

    /// The subscriber is not draining its buffer.
    #[error("Subscriber buffer is full")]
    Lagging,
}
