//! Shared types for the order system.
//!
//! Identifiers used across the order and product authorities, plus the
//! [`CommonDto`] envelope every HTTP response is wrapped in.

pub mod dto;
pub mod types;

pub use dto::CommonDto;
pub use types::{MemberEmail, OrderId, OrderLineId, ProductId};
