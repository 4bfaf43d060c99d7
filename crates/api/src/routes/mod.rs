pub mod health;
pub mod metrics;
pub mod ordering;
pub mod products;
pub mod sse;
