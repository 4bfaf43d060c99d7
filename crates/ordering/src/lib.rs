//! Order authority.
//!
//! [`OrderCoordinator::create_order`] looks every requested product up through
//! a circuit-breaker-guarded [`ProductQueryClient`], snapshots the product
//! names into a new [`Order`], commits it through an [`OrderStore`], then
//! publishes one stock decrement command per line and notifies the order
//! observer.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod order;
pub mod postgres;
pub mod store;

pub use client::{
    HttpProductClient, InMemoryProductClient, ProductQueryClient, ProductQueryError,
    ProductSnapshot,
};
pub use coordinator::{DEFAULT_ORDER_OBSERVER, OrderCoordinator, UPSTREAM_UNAVAILABLE_MESSAGE};
pub use error::{OrderError, OrderStoreError, Result};
pub use order::{Order, OrderLine, OrderLineRequest, OrderStatus};
pub use postgres::PostgresOrderStore;
pub use store::{InMemoryOrderStore, OrderStore};
