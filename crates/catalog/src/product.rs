//! Product records.

use common::{MemberEmail, ProductId};
use serde::{Deserialize, Serialize};

/// A product as stored by the catalog. Stock is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub stock_quantity: u32,
    pub member_email: MemberEmail,
}

/// Fields of a product before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub price: i64,
    pub stock_quantity: u32,
    pub member_email: MemberEmail,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: i64, stock_quantity: u32) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            price,
            stock_quantity,
            member_email: MemberEmail::default(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_owner(mut self, owner: MemberEmail) -> Self {
        self.member_email = owner;
        self
    }
}
