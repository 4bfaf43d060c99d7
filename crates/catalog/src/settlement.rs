//! Asynchronous stock settlement.
//!
//! [`StockSettlementConsumer`] applies [`StockDecrementCommand`]s read from the
//! stock channel. Delivery is at-least-once, so every command id is remembered
//! for a retention window and a redelivered command is acknowledged without
//! touching stock again.
//!
//! Outcomes and acknowledgement:
//!
//! | outcome                  | ack     |
//! |--------------------------|---------|
//! | applied / duplicate      | `Ack`   |
//! | product not found        | `Ack`   |
//! | insufficient stock       | `Ack`   |
//! | malformed payload        | `Ack`   |
//! | store failure            | `Retry` |

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use stock_channel::{Ack, CommandId, Delivery, StockCommandHandler, StockDecrementCommand};
use thiserror::Error;
use tokio::time::Instant;

use crate::error::CatalogError;
use crate::store::ProductStore;

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// How long a processed command id is remembered.
    pub dedup_retention: Duration,
    /// Most recent rejections kept for inspection.
    pub rejection_log_capacity: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            dedup_retention: Duration::from_secs(24 * 60 * 60),
            rejection_log_capacity: 1024,
        }
    }
}

/// Why a command was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("Malformed stock command: {0}")]
    MessageFormat(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Transient; the command should be delivered again.
    #[error("Product store error: {0}")]
    Store(String),
}

impl SettlementError {
    fn outcome_label(&self) -> &'static str {
        match self {
            SettlementError::MessageFormat(_) => "malformed",
            SettlementError::ProductNotFound(_) => "not_found",
            SettlementError::InsufficientStock { .. } => "insufficient_stock",
            SettlementError::Store(_) => "store_error",
        }
    }
}

impl From<CatalogError> for SettlementError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => SettlementError::ProductNotFound(id),
            CatalogError::InsufficientStock {
                product_id,
                requested,
                available,
            } => SettlementError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            CatalogError::Store(msg) => SettlementError::Store(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Stock was decremented.
    Applied { remaining: u32 },
    /// The command id was already processed; nothing changed.
    Duplicate,
}

/// A command that could not be satisfied from current stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRejection {
    pub command_id: CommandId,
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Default)]
struct DedupWindow {
    seen: HashMap<CommandId, Instant>,
    order: VecDeque<(Instant, CommandId)>,
}

impl DedupWindow {
    fn evict(&mut self, now: Instant, retention: Duration) {
        while let Some((at, id)) = self.order.front().copied() {
            if now.duration_since(at) < retention {
                break;
            }
            self.order.pop_front();
            if self.seen.get(&id) == Some(&at) {
                self.seen.remove(&id);
            }
        }
    }

    /// Marks `id` as taken. Returns false if it already was.
    fn claim(&mut self, id: CommandId, now: Instant) -> bool {
        if self.seen.contains_key(&id) {
            return false;
        }
        self.seen.insert(id, now);
        self.order.push_back((now, id));
        true
    }

    fn forget(&mut self, id: &CommandId) {
        self.seen.remove(id);
    }
}

/// Applies stock decrement commands to a product store exactly once per
/// command id within the retention window.
pub struct StockSettlementConsumer<S: ProductStore> {
    store: S,
    config: SettlementConfig,
    dedup: Mutex<DedupWindow>,
    rejections: Mutex<VecDeque<StockRejection>>,
}

impl<S: ProductStore> StockSettlementConsumer<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SettlementConfig::default())
    }

    pub fn with_config(store: S, config: SettlementConfig) -> Self {
        Self {
            store,
            config,
            dedup: Mutex::new(DedupWindow::default()),
            rejections: Mutex::new(VecDeque::new()),
        }
    }

    /// Applies one command.
    ///
    /// The command id is claimed before the store is touched. The claim is
    /// kept once the store gives a terminal answer, so rejections are
    /// remembered like successes. A store failure or a cancelled call
    /// releases it and the redelivered command is applied again.
    #[tracing::instrument(
        skip(self, command),
        fields(
            command_id = %command.command_id,
            product_id = %command.product_id,
            quantity = command.quantity
        )
    )]
    pub async fn apply(
        &self,
        command: &StockDecrementCommand,
    ) -> Result<SettlementOutcome, SettlementError> {
        let Some(claim) = self.claim(command.command_id) else {
            tracing::debug!("duplicate stock command ignored");
            record_outcome("duplicate");
            return Ok(SettlementOutcome::Duplicate);
        };

        match self
            .store
            .decrement_stock(command.product_id, command.quantity)
            .await
        {
            Ok(product) => {
                claim.settle();
                tracing::info!(remaining = product.stock_quantity, "stock settled");
                record_outcome("applied");
                Ok(SettlementOutcome::Applied {
                    remaining: product.stock_quantity,
                })
            }
            Err(err) => {
                let err = SettlementError::from(err);
                if !matches!(err, SettlementError::Store(_)) {
                    claim.settle();
                }
                if let SettlementError::InsufficientStock {
                    requested,
                    available,
                    ..
                } = err
                {
                    self.record_rejection(command, requested, available);
                }
                record_outcome(err.outcome_label());
                Err(err)
            }
        }
    }

    /// Returns recorded insufficient-stock rejections, oldest first.
    pub fn rejections(&self) -> Vec<StockRejection> {
        self.lock_rejections().iter().cloned().collect()
    }

    /// Number of command ids currently remembered.
    pub fn remembered(&self) -> usize {
        self.lock_dedup().seen.len()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn claim(&self, id: CommandId) -> Option<Claim<'_>> {
        let now = Instant::now();
        let mut dedup = self.lock_dedup();
        dedup.evict(now, self.config.dedup_retention);
        dedup.claim(id, now).then(|| Claim {
            dedup: &self.dedup,
            id,
            settled: false,
        })
    }

    fn record_rejection(&self, command: &StockDecrementCommand, requested: u32, available: u32) {
        tracing::warn!(requested, available, "insufficient stock, command rejected");
        let mut log = self.lock_rejections();
        if log.len() >= self.config.rejection_log_capacity.max(1) {
            log.pop_front();
        }
        log.push_back(StockRejection {
            command_id: command.command_id,
            product_id: command.product_id,
            requested,
            available,
            rejected_at: Utc::now(),
        });
    }

    fn lock_dedup(&self) -> MutexGuard<'_, DedupWindow> {
        lock_window(&self.dedup)
    }

    fn lock_rejections(&self) -> MutexGuard<'_, VecDeque<StockRejection>> {
        self.rejections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_window(dedup: &Mutex<DedupWindow>) -> MutexGuard<'_, DedupWindow> {
    dedup.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A claimed command id. Released on drop unless settled.
struct Claim<'a> {
    dedup: &'a Mutex<DedupWindow>,
    id: CommandId,
    settled: bool,
}

impl Claim<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            lock_window(self.dedup).forget(&self.id);
        }
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("stock_settlements_total", "outcome" => outcome).increment(1);
}

#[async_trait]
impl<S: ProductStore> StockCommandHandler for StockSettlementConsumer<S> {
    async fn handle(&self, delivery: &Delivery) -> Ack {
        let command = match StockDecrementCommand::from_bytes(&delivery.payload) {
            Ok(command) => command,
            Err(err) => {
                tracing::error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %err,
                    "discarding malformed stock command"
                );
                record_outcome("malformed");
                return Ack::Ack;
            }
        };

        match self.apply(&command).await {
            Ok(_) => Ack::Ack,
            Err(SettlementError::Store(msg)) => {
                tracing::warn!(
                    attempt = delivery.attempt,
                    error = %msg,
                    "stock store unavailable, requesting redelivery"
                );
                Ack::Retry
            }
            Err(err) => {
                tracing::warn!(error = %err, "stock command not applied");
                Ack::Ack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::product::{NewProduct, Product};
    use crate::store::InMemoryProductStore;

    /// Hangs every decrement while `stalled` is set.
    struct StallingStore {
        inner: InMemoryProductStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl ProductStore for StallingStore {
        async fn insert(&self, product: NewProduct) -> crate::Result<Product> {
            self.inner.insert(product).await
        }

        async fn get(&self, id: ProductId) -> crate::Result<Option<Product>> {
            self.inner.get(id).await
        }

        async fn decrement_stock(&self, id: ProductId, quantity: u32) -> crate::Result<Product> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.decrement_stock(id, quantity).await
        }
    }

    async fn consumer_with_product(
        stock: u32,
    ) -> (StockSettlementConsumer<InMemoryProductStore>, ProductId) {
        let store = InMemoryProductStore::new();
        let product = store.insert(NewProduct::new("P1", 1000, stock)).await.unwrap();
        (StockSettlementConsumer::new(store), product.id)
    }

    fn delivery(command: &StockDecrementCommand, attempt: u32) -> Delivery {
        Delivery {
            partition: 0,
            offset: 0,
            key: command.partition_key(),
            payload: command.to_bytes().unwrap(),
            attempt,
        }
    }

    async fn stock_of(
        consumer: &StockSettlementConsumer<InMemoryProductStore>,
        id: ProductId,
    ) -> u32 {
        consumer.store().get(id).await.unwrap().unwrap().stock_quantity
    }

    #[tokio::test]
    async fn applies_decrement() {
        let (consumer, id) = consumer_with_product(5).await;
        let outcome = consumer.apply(&StockDecrementCommand::new(id, 2)).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::Applied { remaining: 3 });
        assert_eq!(stock_of(&consumer, id).await, 3);
    }

    #[tokio::test]
    async fn insufficient_stock_is_recorded_and_stock_unchanged() {
        let (consumer, id) = consumer_with_product(1).await;
        let command = StockDecrementCommand::new(id, 2);

        let err = consumer.apply(&command).await.unwrap_err();
        assert_eq!(
            err,
            SettlementError::InsufficientStock {
                product_id: id,
                requested: 2,
                available: 1,
            }
        );
        assert_eq!(stock_of(&consumer, id).await, 1);

        let rejections = consumer.rejections();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].command_id, command.command_id);
        assert_eq!(rejections[0].requested, 2);
        assert_eq!(rejections[0].available, 1);
    }

    #[tokio::test]
    async fn redelivered_command_is_applied_once() {
        let (consumer, id) = consumer_with_product(5).await;
        let command = StockDecrementCommand::new(id, 2);

        assert_eq!(consumer.handle(&delivery(&command, 1)).await, Ack::Ack);
        assert_eq!(consumer.handle(&delivery(&command, 2)).await, Ack::Ack);
        assert_eq!(
            consumer.apply(&command).await.unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(stock_of(&consumer, id).await, 3);
    }

    #[tokio::test]
    async fn rejected_command_is_not_reevaluated_on_redelivery() {
        let (consumer, id) = consumer_with_product(1).await;
        let command = StockDecrementCommand::new(id, 2);

        assert!(consumer.apply(&command).await.is_err());
        assert_eq!(
            consumer.apply(&command).await.unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(consumer.rejections().len(), 1);
    }

    #[tokio::test]
    async fn unknown_product_is_acknowledged() {
        let (consumer, _) = consumer_with_product(5).await;
        let command = StockDecrementCommand::new(ProductId::new(999), 1);
        assert_eq!(consumer.handle(&delivery(&command, 1)).await, Ack::Ack);
        assert!(matches!(
            consumer.apply(&StockDecrementCommand::new(ProductId::new(999), 1)).await,
            Err(SettlementError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_without_retry() {
        let (consumer, id) = consumer_with_product(5).await;
        let broken = Delivery {
            partition: 0,
            offset: 0,
            key: id.to_string(),
            payload: b"{not json".to_vec(),
            attempt: 1,
        };
        assert_eq!(consumer.handle(&broken).await, Ack::Ack);
        assert_eq!(stock_of(&consumer, id).await, 5);
    }

    #[tokio::test]
    async fn store_failure_requests_retry_and_is_not_remembered() {
        let (consumer, id) = consumer_with_product(5).await;
        let command = StockDecrementCommand::new(id, 2);

        consumer.store().set_unavailable(true);
        assert_eq!(consumer.handle(&delivery(&command, 1)).await, Ack::Retry);
        assert_eq!(consumer.remembered(), 0);

        consumer.store().set_unavailable(false);
        assert_eq!(consumer.handle(&delivery(&command, 2)).await, Ack::Ack);
        assert_eq!(stock_of(&consumer, id).await, 3);
    }

    #[tokio::test]
    async fn cancelled_apply_releases_command_id() {
        let inner = InMemoryProductStore::new();
        let product = inner.insert(NewProduct::new("P1", 1000, 5)).await.unwrap();
        let consumer = StockSettlementConsumer::new(StallingStore {
            inner,
            stalled: AtomicBool::new(true),
        });
        let command = StockDecrementCommand::new(product.id, 2);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), consumer.apply(&command)).await;
        assert!(cancelled.is_err());
        assert_eq!(consumer.remembered(), 0);

        consumer.store().stalled.store(false, Ordering::SeqCst);
        assert_eq!(
            consumer.apply(&command).await.unwrap(),
            SettlementOutcome::Applied { remaining: 3 }
        );
        assert_eq!(
            consumer.apply(&command).await.unwrap(),
            SettlementOutcome::Duplicate
        );
    }

    #[tokio::test(start_paused = true)]
    async fn command_ids_expire_after_retention() {
        let store = InMemoryProductStore::new();
        let product = store.insert(NewProduct::new("P1", 1000, 10)).await.unwrap();
        let consumer = StockSettlementConsumer::with_config(
            store,
            SettlementConfig {
                dedup_retention: Duration::from_secs(60),
                ..SettlementConfig::default()
            },
        );
        let command = StockDecrementCommand::new(product.id, 1);

        consumer.apply(&command).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            consumer.apply(&command).await.unwrap(),
            SettlementOutcome::Duplicate
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        consumer
            .apply(&StockDecrementCommand::new(product.id, 1))
            .await
            .unwrap();
        assert_eq!(consumer.remembered(), 1);
    }

    #[tokio::test]
    async fn rejection_log_is_bounded() {
        let store = InMemoryProductStore::new();
        let product = store.insert(NewProduct::new("P1", 1000, 0)).await.unwrap();
        let consumer = StockSettlementConsumer::with_config(
            store,
            SettlementConfig {
                rejection_log_capacity: 2,
                ..SettlementConfig::default()
            },
        );

        for _ in 0..3 {
            let _ = consumer.apply(&StockDecrementCommand::new(product.id, 1)).await;
        }
        assert_eq!(consumer.rejections().len(), 2);
    }
}
