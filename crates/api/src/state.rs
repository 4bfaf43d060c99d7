//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use catalog::{InMemoryProductStore, ProductService, StockSettlementConsumer};
use common::MemberEmail;
use notification::{NotificationDispatcher, NotificationRegistry};
use ordering::{
    HttpProductClient, InMemoryOrderStore, OrderCoordinator, OrderStore, ProductQueryClient,
};
use resilience::CircuitBreakerGate;
use stock_channel::{ConsumerGroup, PartitionedChannel};

use crate::catalog_client::CatalogQueryClient;
use crate::config::Config;
use crate::error::StartupError;

/// Order coordinator as wired by the server.
pub type Coordinator =
    OrderCoordinator<Arc<dyn OrderStore>, Arc<dyn ProductQueryClient>, PartitionedChannel>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Coordinator,
    pub products: Arc<ProductService<InMemoryProductStore>>,
    pub settlement: Arc<StockSettlementConsumer<InMemoryProductStore>>,
    pub notifications: Arc<NotificationRegistry>,
    pub stock_channel: PartitionedChannel,
}

/// Builds state with an in-memory order store.
///
/// Must run inside a tokio runtime: the stock settlement consumer group is
/// started here. Keep the returned [`ConsumerGroup`] alive for as long as
/// stock commands should be applied.
pub fn create_default_state(
    config: &Config,
) -> Result<(Arc<AppState>, ConsumerGroup), StartupError> {
    create_state(config, Arc::new(InMemoryOrderStore::new()))
}

/// Builds state around the given order store.
pub fn create_state(
    config: &Config,
    order_store: Arc<dyn OrderStore>,
) -> Result<(Arc<AppState>, ConsumerGroup), StartupError> {
    let products = Arc::new(ProductService::new(InMemoryProductStore::new()));
    let settlement = Arc::new(StockSettlementConsumer::new(products.store().clone()));

    let stock_channel = PartitionedChannel::new(config.channel_config());
    let consumer_group = stock_channel.subscribe(settlement.clone())?;

    let product_client: Arc<dyn ProductQueryClient> = match &config.product_service_url {
        Some(url) => {
            let url = url
                .parse::<reqwest::Url>()
                .map_err(|e| StartupError::ProductServiceUrl(format!("{url}: {e}")))?;
            let timeout = config.cb_call_timeout.unwrap_or(Duration::from_secs(10));
            tracing::info!(%url, "using remote product service");
            Arc::new(HttpProductClient::new(url, timeout)?)
        }
        None => Arc::new(CatalogQueryClient::new(products.clone())),
    };

    let notifications = Arc::new(NotificationRegistry::new());
    let coordinator = OrderCoordinator::new(
        order_store,
        product_client,
        stock_channel.clone(),
        CircuitBreakerGate::new("product-service", config.circuit_breaker_config()),
        NotificationDispatcher::new(notifications.clone()),
    )
    .with_observer(MemberEmail::new(config.order_observer.as_str()));

    let state = Arc::new(AppState {
        coordinator,
        products,
        settlement,
        notifications,
        stock_channel,
    });
    Ok((state, consumer_group))
}
