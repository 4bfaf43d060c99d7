//! Product authority.
//!
//! Owns product stock. Stock only moves down through
//! [`ProductService::update_stock`] (legacy synchronous path) or the
//! [`StockSettlementConsumer`] reading the stock channel.

pub mod error;
pub mod product;
pub mod service;
pub mod settlement;
pub mod store;

pub use error::{CatalogError, Result};
pub use product::{NewProduct, Product};
pub use service::ProductService;
pub use settlement::{
    SettlementConfig, SettlementError, SettlementOutcome, StockRejection,
    StockSettlementConsumer,
};
pub use store::{InMemoryProductStore, ProductStore};
