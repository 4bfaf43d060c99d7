//! In-process partitioned channel with at-least-once delivery.
//!
//! Records are hashed by key onto a fixed set of partitions. Each partition is
//! an ordered log; a record stays at the head of its log until a consumer
//! acknowledges it, so a consumer group that goes away mid-delivery leaves the
//! record in place for the next group to receive again.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::channel::{Ack, Delivery, StockCommandHandler, StockEventPublisher};
use crate::command::StockDecrementCommand;
use crate::error::{ChannelError, Result};

/// Topic name stock commands are published under.
pub const STOCK_UPDATE_TOPIC: &str = "stock-update-topic";

/// Channel sizing and redelivery policy.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Number of partitions. Values below 1 are treated as 1.
    pub partitions: usize,
    /// Maximum unacknowledged records per partition before publishes are refused.
    pub partition_capacity: usize,
    /// How many times a record may be redelivered after `Ack::Retry` before it
    /// is moved to the dead-letter list.
    pub max_redeliveries: u32,
    /// Pause before redelivering a record the handler asked to retry.
    pub redelivery_backoff: Duration,
    /// Number of dead letters retained for inspection.
    pub dead_letter_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            partition_capacity: 1024,
            max_redeliveries: 5,
            redelivery_backoff: Duration::from_millis(100),
            dead_letter_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    offset: u64,
    key: String,
    payload: Vec<u8>,
}

/// A record that exhausted its redeliveries.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub partition: usize,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub attempts: u32,
}

#[derive(Default)]
struct PartitionLog {
    records: VecDeque<Record>,
    next_offset: u64,
    /// Deliveries made of the current head record.
    head_attempts: u32,
}

struct Partition {
    log: Mutex<PartitionLog>,
    notify: Notify,
    claimed: AtomicBool,
}

impl Partition {
    fn new() -> Self {
        Self {
            log: Mutex::new(PartitionLog::default()),
            notify: Notify::new(),
            claimed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PartitionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out the head record without removing it.
    fn next_delivery(&self, index: usize) -> Option<Delivery> {
        let mut log = self.lock();
        let record = log.records.front()?.clone();
        log.head_attempts += 1;
        Some(Delivery {
            partition: index,
            offset: record.offset,
            key: record.key,
            payload: record.payload,
            attempt: log.head_attempts,
        })
    }

    /// Removes the head record if it is still the one at `offset`.
    fn complete(&self, offset: u64) -> Option<Record> {
        let mut log = self.lock();
        if log.records.front().map(|r| r.offset) != Some(offset) {
            return None;
        }
        log.head_attempts = 0;
        log.records.pop_front()
    }
}

struct Shared {
    config: ChannelConfig,
    partitions: Vec<Partition>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
}

impl Shared {
    fn dead_letter(&self, record: Record, partition: usize, attempts: u32) {
        let mut dead = self
            .dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if dead.len() >= self.config.dead_letter_capacity {
            dead.pop_front();
        }
        dead.push_back(DeadLetter {
            partition,
            offset: record.offset,
            key: record.key,
            payload: record.payload,
            attempts,
        });
    }
}

/// Ordered-per-key, at-least-once channel living in the current process.
///
/// Cloning is cheap and every clone publishes into the same partitions.
#[derive(Clone)]
pub struct PartitionedChannel {
    shared: Arc<Shared>,
}

impl PartitionedChannel {
    /// Creates a channel with the given configuration.
    pub fn new(config: ChannelConfig) -> Self {
        let count = config.partitions.max(1);
        let partitions = (0..count).map(|_| Partition::new()).collect();
        Self {
            shared: Arc::new(Shared {
                config,
                partitions,
                dead_letters: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Returns the number of partitions.
    pub fn partition_count(&self) -> usize {
        self.shared.partitions.len()
    }

    /// Returns the partition a key is routed to.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shared.partitions.len() as u64) as usize
    }

    /// Appends a raw record to the partition owning `key`.
    ///
    /// Returns the record's offset within that partition.
    pub fn send(&self, key: &str, payload: Vec<u8>) -> Result<u64> {
        let index = self.partition_for(key);
        let partition = &self.shared.partitions[index];
        let offset = {
            let mut log = partition.lock();
            let capacity = self.shared.config.partition_capacity;
            if log.records.len() >= capacity {
                return Err(ChannelError::Backpressure {
                    partition: index,
                    capacity,
                });
            }
            let offset = log.next_offset;
            log.next_offset += 1;
            log.records.push_back(Record {
                offset,
                key: key.to_string(),
                payload,
            });
            offset
        };
        partition.notify.notify_one();
        Ok(offset)
    }

    /// Returns the number of records not yet acknowledged, across partitions.
    pub fn pending(&self) -> usize {
        self.shared
            .partitions
            .iter()
            .map(|p| p.lock().records.len())
            .sum()
    }

    /// Returns the retained dead letters, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared
            .dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Starts a consumer group: one worker per partition, all feeding `handler`.
    ///
    /// Fails with [`ChannelError::AlreadyConsumed`] while another group is
    /// alive, so a partition never has two records in flight at once.
    pub fn subscribe<H>(&self, handler: Arc<H>) -> Result<ConsumerGroup>
    where
        H: StockCommandHandler + ?Sized + 'static,
    {
        let partitions = &self.shared.partitions;
        for (index, partition) in partitions.iter().enumerate() {
            if partition
                .claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                for claimed in partitions.iter().take(index) {
                    claimed.claimed.store(false, Ordering::Release);
                }
                return Err(ChannelError::AlreadyConsumed);
            }
        }

        let handles = (0..partitions.len())
            .map(|index| {
                tokio::spawn(run_partition(self.shared.clone(), index, handler.clone()))
            })
            .collect();

        tracing::info!(
            topic = STOCK_UPDATE_TOPIC,
            partitions = partitions.len(),
            "consumer group started"
        );

        Ok(ConsumerGroup {
            shared: self.shared.clone(),
            handles,
        })
    }
}

impl Default for PartitionedChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl StockEventPublisher for PartitionedChannel {
    #[tracing::instrument(
        skip(self, command),
        fields(command_id = %command.command_id, product_id = %command.product_id)
    )]
    async fn publish(&self, command: &StockDecrementCommand) -> Result<()> {
        let payload = command.to_bytes()?;
        let offset = self.send(&command.partition_key(), payload)?;
        metrics::counter!("stock_commands_published_total").increment(1);
        tracing::debug!(offset, topic = STOCK_UPDATE_TOPIC, "stock command published");
        Ok(())
    }
}

async fn run_partition<H>(shared: Arc<Shared>, index: usize, handler: Arc<H>)
where
    H: StockCommandHandler + ?Sized,
{
    let partition = &shared.partitions[index];
    loop {
        let Some(delivery) = partition.next_delivery(index) else {
            partition.notify.notified().await;
            continue;
        };

        match handler.handle(&delivery).await {
            Ack::Ack => {
                partition.complete(delivery.offset);
            }
            Ack::Retry if delivery.attempt > shared.config.max_redeliveries => {
                if let Some(record) = partition.complete(delivery.offset) {
                    tracing::error!(
                        partition = index,
                        offset = delivery.offset,
                        key = %delivery.key,
                        attempts = delivery.attempt,
                        "record exhausted redeliveries, moved to dead letters"
                    );
                    metrics::counter!("stock_commands_dead_lettered_total").increment(1);
                    shared.dead_letter(record, index, delivery.attempt);
                }
            }
            Ack::Retry => {
                tracing::warn!(
                    partition = index,
                    offset = delivery.offset,
                    attempt = delivery.attempt,
                    "handler requested redelivery"
                );
                tokio::time::sleep(shared.config.redelivery_backoff).await;
            }
        }
    }
}

/// Running set of partition workers.
///
/// Dropping the group stops its workers; unacknowledged records stay in the
/// channel and are delivered again to the next group.
pub struct ConsumerGroup {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroup")
            .field("workers", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl ConsumerGroup {
    /// Stops all workers and waits for them to finish.
    pub async fn shutdown(mut self) {
        let handles = std::mem::take(&mut self.handles);
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(topic = STOCK_UPDATE_TOPIC, "consumer group stopped");
    }
}

impl Drop for ConsumerGroup {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        for partition in &self.shared.partitions {
            partition.claimed.store(false, Ordering::Release);
        }
    }
}
