//! Order persistence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{MemberEmail, OrderId};
use tokio::sync::RwLock;

use crate::error::OrderStoreError;
use crate::order::Order;

/// Storage for committed orders.
///
/// `commit` writes the header and every line as one unit: after it returns
/// `Ok` all rows exist, after it returns `Err` none do.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn commit(&self, order: &Order) -> Result<(), OrderStoreError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// Every order, oldest first.
    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError>;

    /// Orders placed by `requester`, oldest first.
    async fn list_by_requester(
        &self,
        requester: &MemberEmail,
    ) -> Result<Vec<Order>, OrderStoreError>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn commit(&self, order: &Order) -> Result<(), OrderStoreError> {
        (**self).commit(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).get(id).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_all().await
    }

    async fn list_by_requester(
        &self,
        requester: &MemberEmail,
    ) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_by_requester(requester).await
    }
}

/// In-memory order store for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes following commits fail.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn line_count(&self) -> usize {
        self.orders.read().await.iter().map(|o| o.lines.len()).sum()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn commit(&self, order: &Order) -> Result<(), OrderStoreError> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable("commit rejected".to_string()));
        }
        self.orders.write().await.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        Ok(self.orders.read().await.clone())
    }

    async fn list_by_requester(
        &self,
        requester: &MemberEmail,
    ) -> Result<Vec<Order>, OrderStoreError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| &o.member_email == requester)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn order_for(email: &str, lines: usize) -> Order {
        let mut order = Order::new(MemberEmail::new(email));
        for i in 0..lines {
            order.add_line(ProductId::new(i as i64 + 1), format!("P{i}"), 1);
        }
        order
    }

    #[tokio::test]
    async fn commit_and_get() {
        let store = InMemoryOrderStore::new();
        let order = order_for("a@a.com", 2);
        store.commit(&order).await.unwrap();

        assert_eq!(store.get(order.id).await.unwrap(), Some(order));
        assert_eq!(store.line_count().await, 2);
    }

    #[tokio::test]
    async fn failed_commit_stores_nothing() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_commit(true);
        assert!(store.commit(&order_for("a@a.com", 3)).await.is_err());
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.line_count().await, 0);
    }

    #[tokio::test]
    async fn list_by_requester_filters() {
        let store = InMemoryOrderStore::new();
        store.commit(&order_for("a@a.com", 1)).await.unwrap();
        store.commit(&order_for("b@a.com", 1)).await.unwrap();
        store.commit(&order_for("a@a.com", 1)).await.unwrap();

        let mine = store.list_by_requester(&MemberEmail::new("a@a.com")).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }
}
