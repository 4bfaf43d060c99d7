use thiserror::Error;

/// Errors raised by the stock channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The target partition holds as many unacknowledged records as it may.
    #[error("Partition {partition} is full ({capacity} pending records)")]
    Backpressure { partition: usize, capacity: usize },

    /// Another consumer group already owns the partitions.
    #[error("Channel already has an active consumer group")]
    AlreadyConsumed,

    /// A payload could not be decoded into a stock command.
    #[error("Malformed stock command: {0}")]
    MessageFormat(String),

    /// A command could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
