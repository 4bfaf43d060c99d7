//! In-process product lookups against the local catalog.

use std::sync::Arc;

use async_trait::async_trait;
use catalog::{CatalogError, ProductService, ProductStore};
use common::ProductId;
use ordering::{ProductQueryClient, ProductQueryError, ProductSnapshot};

/// Serves [`ProductQueryClient`] lookups from a [`ProductService`] in the
/// same process, used when no `PRODUCT_SERVICE_URL` is configured.
pub struct CatalogQueryClient<S: ProductStore> {
    service: Arc<ProductService<S>>,
}

impl<S: ProductStore> CatalogQueryClient<S> {
    pub fn new(service: Arc<ProductService<S>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: ProductStore> ProductQueryClient for CatalogQueryClient<S> {
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError> {
        match self.service.detail(id).await {
            Ok(product) => Ok(ProductSnapshot {
                id: product.id,
                name: product.name,
                price: product.price,
                stock_quantity: product.stock_quantity,
            }),
            Err(CatalogError::NotFound(id)) => Err(ProductQueryError::NotFound(id)),
            Err(err) => Err(ProductQueryError::Unavailable(err.to_string())),
        }
    }
}
