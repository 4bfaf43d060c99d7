//! Product persistence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::ProductId;
use tokio::sync::RwLock;

use crate::error::{CatalogError, Result};
use crate::product::{NewProduct, Product};

/// Storage for products.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Stores a new product and assigns its id.
    async fn insert(&self, product: NewProduct) -> Result<Product>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Subtracts `quantity` from the product's stock as one atomic step.
    ///
    /// Fails with [`CatalogError::InsufficientStock`] and leaves the stock
    /// untouched if `quantity` exceeds it. Returns the updated product.
    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<Product>;
}

#[async_trait]
impl<T: ProductStore + ?Sized> ProductStore for Arc<T> {
    async fn insert(&self, product: NewProduct) -> Result<Product> {
        (**self).insert(product).await
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        (**self).get(id).await
    }

    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        (**self).decrement_stock(id, quantity).await
    }
}

#[derive(Debug, Default)]
struct Products {
    by_id: BTreeMap<ProductId, Product>,
    next_id: i64,
}

/// In-memory product store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<Products>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with [`CatalogError::Store`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.by_id.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Store("product store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: NewProduct) -> Result<Product> {
        self.check_available()?;
        let mut products = self.products.write().await;
        products.next_id += 1;
        let product = Product {
            id: ProductId::new(products.next_id),
            name: product.name,
            category: product.category,
            price: product.price,
            stock_quantity: product.stock_quantity,
            member_email: product.member_email,
        };
        products.by_id.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.products.read().await.by_id.get(&id).cloned())
    }

    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        self.check_available()?;
        let mut products = self.products.write().await;
        let product = products
            .by_id
            .get_mut(&id)
            .ok_or(CatalogError::NotFound(id))?;

        if quantity > product.stock_quantity {
            return Err(CatalogError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available: product.stock_quantity,
            });
        }
        product.stock_quantity -= quantity;
        Ok(product.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryProductStore::new();
        let a = store.insert(NewProduct::new("Widget", 1000, 5)).await.unwrap();
        let b = store.insert(NewProduct::new("Gadget", 2000, 3)).await.unwrap();

        assert_eq!(a.id, ProductId::new(1));
        assert_eq!(b.id, ProductId::new(2));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn decrement_reduces_stock() {
        let store = InMemoryProductStore::new();
        let p = store.insert(NewProduct::new("Widget", 1000, 5)).await.unwrap();

        let updated = store.decrement_stock(p.id, 2).await.unwrap();
        assert_eq!(updated.stock_quantity, 3);
    }

    #[tokio::test]
    async fn decrement_to_zero_is_allowed() {
        let store = InMemoryProductStore::new();
        let p = store.insert(NewProduct::new("Widget", 1000, 2)).await.unwrap();
        assert_eq!(store.decrement_stock(p.id, 2).await.unwrap().stock_quantity, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_stock_unchanged() {
        let store = InMemoryProductStore::new();
        let p = store.insert(NewProduct::new("Widget", 1000, 1)).await.unwrap();

        let err = store.decrement_stock(p.id, 2).await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::InsufficientStock {
                product_id: p.id,
                requested: 2,
                available: 1,
            }
        );
        assert_eq!(store.get(p.id).await.unwrap().unwrap().stock_quantity, 1);
    }

    #[tokio::test]
    async fn decrement_unknown_product_is_not_found() {
        let store = InMemoryProductStore::new();
        let err = store.decrement_stock(ProductId::new(9), 1).await.unwrap_err();
        assert_eq!(err, CatalogError::NotFound(ProductId::new(9)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_calls() {
        let store = InMemoryProductStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get(ProductId::new(1)).await,
            Err(CatalogError::Store(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let store = InMemoryProductStore::new();
        let p = store.insert(NewProduct::new("Widget", 1000, 10)).await.unwrap();

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.decrement_stock(p.id, 1).await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 10);
        assert_eq!(store.get(p.id).await.unwrap().unwrap().stock_quantity, 0);
    }
}
