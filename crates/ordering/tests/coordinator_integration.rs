//! Order creation end to end: coordinator, stock channel and settlement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog::{
    CatalogError, InMemoryProductStore, NewProduct, ProductStore, StockSettlementConsumer,
};
use common::{MemberEmail, ProductId};
use notification::{NotificationDispatcher, NotificationRegistry, push_channel};
use ordering::{
    InMemoryOrderStore, OrderCoordinator, OrderLineRequest, OrderStore, ProductQueryClient,
    ProductQueryError, ProductSnapshot,
};
use resilience::{CircuitBreakerConfig, CircuitBreakerGate};
use stock_channel::{ChannelConfig, PartitionedChannel};

/// Answers product lookups straight from the catalog store.
struct CatalogLookup(InMemoryProductStore);

#[async_trait]
impl ProductQueryClient for CatalogLookup {
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError> {
        match self.0.get(id).await {
            Ok(Some(p)) => Ok(ProductSnapshot {
                id: p.id,
                name: p.name,
                price: p.price,
                stock_quantity: p.stock_quantity,
            }),
            Ok(None) => Err(ProductQueryError::NotFound(id)),
            Err(CatalogError::Store(e)) => Err(ProductQueryError::Unavailable(e)),
            Err(e) => Err(ProductQueryError::Unavailable(e.to_string())),
        }
    }
}

struct System {
    coordinator: OrderCoordinator<InMemoryOrderStore, CatalogLookup, PartitionedChannel>,
    orders: InMemoryOrderStore,
    products: InMemoryProductStore,
    consumer: Arc<StockSettlementConsumer<InMemoryProductStore>>,
    channel: PartitionedChannel,
    registry: Arc<NotificationRegistry>,
    _group: stock_channel::ConsumerGroup,
}

async fn system() -> System {
    let products = InMemoryProductStore::new();
    let orders = InMemoryOrderStore::new();
    let channel = PartitionedChannel::new(ChannelConfig::default());
    let consumer = Arc::new(StockSettlementConsumer::new(products.clone()));
    let group = channel.subscribe(consumer.clone()).unwrap();
    let registry = Arc::new(NotificationRegistry::new());

    let coordinator = OrderCoordinator::new(
        orders.clone(),
        CatalogLookup(products.clone()),
        channel.clone(),
        CircuitBreakerGate::new("product-service", CircuitBreakerConfig::default()),
        NotificationDispatcher::new(registry.clone()),
    );

    System {
        coordinator,
        orders,
        products,
        consumer,
        channel,
        registry,
        _group: group,
    }
}

async fn wait_until_drained(channel: &PartitionedChannel) {
    for _ in 0..200 {
        if channel.pending() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel did not drain");
}

#[tokio::test]
async fn order_of_two_from_stock_of_five_leaves_three() {
    let sys = system().await;
    let p1 = sys.products.insert(NewProduct::new("P1", 1000, 5)).await.unwrap();

    let order_id = sys
        .coordinator
        .create_order(
            vec![OrderLineRequest::new(p1.id, 2)],
            &MemberEmail::new("buyer@a.com"),
        )
        .await
        .unwrap();
    wait_until_drained(&sys.channel).await;

    let order = sys.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].product_name, "P1");
    assert_eq!(order.lines[0].quantity, 2);
    assert_eq!(sys.products.get(p1.id).await.unwrap().unwrap().stock_quantity, 3);
}

#[tokio::test]
async fn order_exceeding_stock_is_created_but_settlement_rejects() {
    let sys = system().await;
    let p1 = sys.products.insert(NewProduct::new("P1", 1000, 1)).await.unwrap();

    let order_id = sys
        .coordinator
        .create_order(
            vec![OrderLineRequest::new(p1.id, 2)],
            &MemberEmail::new("buyer@a.com"),
        )
        .await
        .unwrap();
    wait_until_drained(&sys.channel).await;

    assert!(sys.orders.get(order_id).await.unwrap().is_some());
    assert_eq!(sys.products.get(p1.id).await.unwrap().unwrap().stock_quantity, 1);

    let rejections = sys.consumer.rejections();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].product_id, p1.id);
    assert_eq!(rejections[0].requested, 2);
    assert_eq!(rejections[0].available, 1);
}

#[tokio::test]
async fn observer_receives_event_for_every_order() {
    let sys = system().await;
    let p1 = sys.products.insert(NewProduct::new("P1", 1000, 10)).await.unwrap();
    let (channel, mut rx) = push_channel(8);
    sys.registry
        .register(MemberEmail::new(ordering::DEFAULT_ORDER_OBSERVER), Arc::new(channel));

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            sys.coordinator
                .create_order(
                    vec![OrderLineRequest::new(p1.id, 1)],
                    &MemberEmail::new("buyer@a.com"),
                )
                .await
                .unwrap(),
        );
    }

    for id in ids {
        assert_eq!(rx.recv().await.unwrap().order_id, id);
    }
}

#[tokio::test]
async fn concurrent_orders_settle_without_overselling() {
    let sys = Arc::new(system().await);
    let p1 = sys.products.insert(NewProduct::new("P1", 1000, 10)).await.unwrap();

    let tasks: Vec<_> = (0..15)
        .map(|i| {
            let sys = sys.clone();
            tokio::spawn(async move {
                sys.coordinator
                    .create_order(
                        vec![OrderLineRequest::new(p1.id, 1)],
                        &MemberEmail::new(format!("buyer{i}@a.com")),
                    )
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    wait_until_drained(&sys.channel).await;

    assert_eq!(sys.orders.order_count().await, 15);
    assert_eq!(sys.products.get(p1.id).await.unwrap().unwrap().stock_quantity, 0);
    assert_eq!(sys.consumer.rejections().len(), 5);
}
