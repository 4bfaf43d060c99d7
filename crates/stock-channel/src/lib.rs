//! Asynchronous stock settlement channel.
//!
//! Stock decrement commands travel from the order authority to the product
//! authority over an ordered-per-key, at-least-once channel:
//! - [`StockDecrementCommand`] is the message body (`stock-update-topic`)
//! - [`StockEventPublisher`] is the publish capability the ordering side uses
//! - [`StockCommandHandler`] is the consume-with-ack capability of the consumer
//! - [`PartitionedChannel`] is the in-process implementation of both ends

pub mod channel;
pub mod command;
pub mod error;
pub mod partitioned;

pub use channel::{Ack, Delivery, StockCommandHandler, StockEventPublisher};
pub use command::{CommandId, StockDecrementCommand};
pub use error::{ChannelError, Result};
pub use partitioned::{
    ChannelConfig, ConsumerGroup, DeadLetter, PartitionedChannel, STOCK_UPDATE_TOPIC,
};
