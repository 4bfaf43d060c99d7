//! Order creation orchestration.

use std::time::Instant;

use common::{MemberEmail, OrderId, ProductId};
use notification::{NotificationDispatcher, OrderNotification};
use resilience::{CircuitBreakerGate, GateError};
use stock_channel::{StockDecrementCommand, StockEventPublisher};

use crate::client::{ProductQueryClient, ProductQueryError, ProductSnapshot};
use crate::error::{OrderError, Result};
use crate::order::{Order, OrderLineRequest};
use crate::store::OrderStore;

/// Subscriber told about every new order unless configured otherwise.
pub const DEFAULT_ORDER_OBSERVER: &str = "admin@naver.com";

/// Message returned when the product service cannot be used.
pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str =
    "product service is not responding, please try again later";

/// Largest quantity a single line may carry.
const MAX_LINE_QUANTITY: i64 = i32::MAX as i64;

/// Creates orders across the product and stock services.
pub struct OrderCoordinator<S, C, P>
where
    S: OrderStore,
    C: ProductQueryClient,
    P: StockEventPublisher,
{
    store: S,
    products: C,
    stock: P,
    gate: CircuitBreakerGate,
    notifications: NotificationDispatcher,
    observer: MemberEmail,
}

impl<S, C, P> OrderCoordinator<S, C, P>
where
    S: OrderStore,
    C: ProductQueryClient,
    P: StockEventPublisher,
{
    pub fn new(
        store: S,
        products: C,
        stock: P,
        gate: CircuitBreakerGate,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            products,
            stock,
            gate,
            notifications,
            observer: MemberEmail::new(DEFAULT_ORDER_OBSERVER),
        }
    }

    /// Sets the subscriber notified of new orders.
    pub fn with_observer(mut self, observer: MemberEmail) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gate(&self) -> &CircuitBreakerGate {
        &self.gate
    }

    pub fn observer(&self) -> &MemberEmail {
        &self.observer
    }

    /// Creates an order for `requester` from the requested lines.
    ///
    /// Nothing is stored unless every product lookup succeeds. Once the
    /// order is committed, stock commands and the observer notification are
    /// best-effort and never fail the call.
    #[tracing::instrument(skip(self, lines), fields(requester = %requester, lines = lines.len()))]
    pub async fn create_order(
        &self,
        lines: Vec<OrderLineRequest>,
        requester: &MemberEmail,
    ) -> Result<OrderId> {
        let started = Instant::now();
        let quantities = validate(&lines, requester)?;

        let mut order = Order::new(requester.clone());
        for (line, quantity) in lines.iter().zip(quantities) {
            let product = self.fetch_product(line.product_id).await?;
            order.add_line(product.id, product.name, quantity);
        }

        self.store.commit(&order).await?;
        tracing::info!(order_id = %order.id, "order created");

        for line in &order.lines {
            let command = StockDecrementCommand::new(line.product_id, line.quantity);
            if let Err(e) = self.stock.publish(&command).await {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    command_id = %command.command_id,
                    error = %e,
                    "failed to publish stock command"
                );
                metrics::counter!("stock_commands_publish_failures_total").increment(1);
            }
        }

        self.notifications.publish(
            &self.observer,
            &OrderNotification::order_created(order.id, requester),
        );

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(order.id)
    }

    /// Every order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_all().await?)
    }

    /// Orders placed by `requester`.
    #[tracing::instrument(skip(self))]
    pub async fn my_orders(&self, requester: &MemberEmail) -> Result<Vec<Order>> {
        if requester.is_blank() {
            return Err(OrderError::Validation("requester must not be blank".to_string()));
        }
        Ok(self.store.list_by_requester(requester).await?)
    }

    async fn fetch_product(&self, id: ProductId) -> Result<ProductSnapshot> {
        let result = self
            .gate
            .call_classified(
                || self.products.fetch(id),
                ProductQueryError::is_dependency_failure,
            )
            .await;

        match result {
            Ok(product) => Ok(product),
            Err(GateError::Failed(ProductQueryError::NotFound(id))) => {
                Err(OrderError::ProductNotFound(id))
            }
            Err(e) => {
                tracing::warn!(product_id = %id, error = %e, "product lookup unavailable");
                Err(OrderError::UpstreamUnavailable(UPSTREAM_UNAVAILABLE_MESSAGE))
            }
        }
    }
}

/// Checks the request and returns the line quantities.
fn validate(lines: &[OrderLineRequest], requester: &MemberEmail) -> Result<Vec<u32>> {
    if requester.is_blank() {
        return Err(OrderError::Validation("requester must not be blank".to_string()));
    }
    if lines.is_empty() {
        return Err(OrderError::Validation(
            "order must contain at least one line".to_string(),
        ));
    }
    lines
        .iter()
        .map(|line| {
            if line.product_count <= 0 || line.product_count > MAX_LINE_QUANTITY {
                return Err(OrderError::Validation(format!(
                    "invalid quantity {} for product {}",
                    line.product_count, line.product_id
                )));
            }
            u32::try_from(line.product_count).map_err(|_| {
                OrderError::Validation(format!("invalid quantity {}", line.product_count))
            })
        })
        .collect()
}
