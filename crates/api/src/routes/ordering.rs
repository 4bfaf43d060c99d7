//! Order authority endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{CommonDto, MemberEmail, OrderId, OrderLineId};
use ordering::{Order, OrderLineRequest, OrderStatus};
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::RequesterEmail;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub member_email: MemberEmail,
    pub order_status: OrderStatus,
    pub order_details: Vec<OrderDetailResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailResponse {
    pub detail_id: OrderLineId,
    pub product_name: String,
    pub product_count: u32,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            member_email: order.member_email,
            order_status: order.status,
            order_details: order
                .lines
                .into_iter()
                .map(|line| OrderDetailResponse {
                    detail_id: line.id,
                    product_name: line.product_name,
                    product_count: line.quantity,
                })
                .collect(),
        }
    }
}

/// POST /ordering/create — body is an array of `{productId, productCount}`.
#[tracing::instrument(skip(state, lines))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    RequesterEmail(requester): RequesterEmail,
    Json(lines): Json<Vec<OrderLineRequest>>,
) -> Result<(StatusCode, Json<CommonDto<OrderId>>), ApiError> {
    let order_id = state.coordinator.create_order(lines, &requester).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommonDto::new(order_id, StatusCode::CREATED.as_u16(), "order created")),
    ))
}

/// GET /ordering/list
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommonDto<Vec<OrderResponse>>>, ApiError> {
    let orders = state.coordinator.list_orders().await?;
    Ok(Json(CommonDto::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        200,
        "orders found",
    )))
}

/// GET /ordering/myorders
#[tracing::instrument(skip(state))]
pub async fn my_orders(
    State(state): State<Arc<AppState>>,
    RequesterEmail(requester): RequesterEmail,
) -> Result<Json<CommonDto<Vec<OrderResponse>>>, ApiError> {
    let orders = state.coordinator.my_orders(&requester).await?;
    Ok(Json(CommonDto::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        200,
        "orders found",
    )))
}
