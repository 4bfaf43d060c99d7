//! Publish and consume capabilities of the stock channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::StockDecrementCommand;
use crate::error::Result;

/// A record handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Partition the record was read from.
    pub partition: usize,
    /// Position of the record within its partition.
    pub offset: u64,
    /// Partition key the record was published with.
    pub key: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Delivery attempt, starting at 1. Greater than 1 means redelivery.
    pub attempt: u32,
}

impl Delivery {
    /// Returns true if this record has been handed out before.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Consumer verdict for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The record is done with and may be removed from the partition.
    Ack,
    /// The record failed transiently and should be delivered again.
    Retry,
}

/// Publish side of the channel.
#[async_trait]
pub trait StockEventPublisher: Send + Sync {
    /// Enqueues a command, keyed by its product.
    ///
    /// Must not block on consumer progress.
    async fn publish(&self, command: &StockDecrementCommand) -> Result<()>;
}

#[async_trait]
impl<T: StockEventPublisher + ?Sized> StockEventPublisher for Arc<T> {
    async fn publish(&self, command: &StockDecrementCommand) -> Result<()> {
        (**self).publish(command).await
    }
}

/// Consume side of the channel.
///
/// Deliveries of one partition are handed to `handle` one at a time, in
/// publish order.
#[async_trait]
pub trait StockCommandHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Ack;
}

#[async_trait]
impl<T: StockCommandHandler + ?Sized> StockCommandHandler for Arc<T> {
    async fn handle(&self, delivery: &Delivery) -> Ack {
        (**self).handle(delivery).await
    }
}
