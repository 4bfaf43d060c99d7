//! Catalog error types.

use common::ProductId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The backing store could not be reached.
    #[error("Product store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
