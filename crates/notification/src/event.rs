//! Order event pushed to observers.

use common::{MemberEmail, OrderId};
use serde::{Deserialize, Serialize};

/// Event type of [`OrderNotification::order_created`].
pub const ORDER_CREATED: &str = "ORDER_CREATED";

/// Payload `{eventType, message, orderId}` written to a push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
    pub event_type: String,
    pub message: String,
    pub order_id: OrderId,
}

impl OrderNotification {
    /// Announces a new order; the message carries the requester identity.
    pub fn order_created(order_id: OrderId, requester: &MemberEmail) -> Self {
        Self {
            event_type: ORDER_CREATED.to_string(),
            message: requester.to_string(),
            order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_fields() {
        let order_id = OrderId::new();
        let event = OrderNotification::order_created(order_id, &MemberEmail::new("buyer@a.com"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], ORDER_CREATED);
        assert_eq!(json["message"], "buyer@a.com");
        assert_eq!(json["orderId"], order_id.to_string());
    }
}
