//! Product service used by the product authority's HTTP surface.

use common::ProductId;

use crate::error::{CatalogError, Result};
use crate::product::{NewProduct, Product};
use crate::store::ProductStore;

/// Product queries and the legacy synchronous stock decrement.
pub struct ProductService<S: ProductStore> {
    store: S,
}

impl<S: ProductStore> ProductService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a product.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, product: NewProduct) -> Result<Product> {
        let product = self.store.insert(product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Returns the current state of a product.
    #[tracing::instrument(skip(self))]
    pub async fn detail(&self, id: ProductId) -> Result<Product> {
        self.store.get(id).await?.ok_or(CatalogError::NotFound(id))
    }

    /// Synchronously subtracts `quantity` from a product's stock.
    ///
    /// Order creation settles stock through the asynchronous channel; this
    /// path stays for direct callers.
    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        let product = self.store.decrement_stock(id, quantity).await?;
        tracing::info!(remaining = product.stock_quantity, "stock decremented");
        Ok(product)
    }
}
