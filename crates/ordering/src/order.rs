//! Order model.

use chrono::{DateTime, Utc};
use common::{MemberEmail, OrderId, OrderLineId, ProductId};
use serde::{Deserialize, Serialize};

/// Status of an order. Orders are created `Ordered` and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Ordered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ORDERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDERED" => Some(OrderStatus::Ordered),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested line as it arrives on the wire.
///
/// The count is signed so that zero and negative values reach validation
/// instead of failing to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub product_count: i64,
}

impl OrderLineRequest {
    pub fn new(product_id: ProductId, product_count: i64) -> Self {
        Self {
            product_id,
            product_count,
        }
    }
}

/// A line of a committed order.
///
/// `product_name` is the name at order time and does not follow later
/// renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
}

/// A purchase order with at least one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_email: MemberEmail,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Starts a new order with no lines.
    pub fn new(member_email: MemberEmail) -> Self {
        Self {
            id: OrderId::new(),
            member_email,
            status: OrderStatus::Ordered,
            created_at: Utc::now(),
            lines: Vec::new(),
        }
    }

    pub fn add_line(
        &mut self,
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
    ) {
        self.lines.push(OrderLine {
            id: OrderLineId::new(),
            order_id: self.id,
            product_id,
            product_name: product_name.into(),
            quantity,
        });
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}
