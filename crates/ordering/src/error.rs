//! Ordering error types.

use common::ProductId;
use thiserror::Error;

/// Errors returned by [`OrderCoordinator`](crate::OrderCoordinator).
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request itself is invalid; nothing was looked up or stored.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The product service could not be reached or the circuit is open.
    #[error("{0}")]
    UpstreamUnavailable(&'static str),

    /// The product service answered that the product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),
}

/// Errors raised by an [`OrderStore`](crate::OrderStore).
#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the operation.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back to an order.
    #[error("Corrupt order row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;
