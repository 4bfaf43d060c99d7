//! Product authority endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use catalog::Product;
use common::{CommonDto, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub stock_quantity: u32,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            category: product.category,
            price: product.price,
            stock_quantity: product.stock_quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdateRequest {
    pub product_id: ProductId,
    pub product_count: i64,
}

/// GET /product/detail/{id}
#[tracing::instrument(skip(state))]
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CommonDto<ProductResponse>>, ApiError> {
    let product = state.products.detail(ProductId::new(id)).await?;
    Ok(Json(CommonDto::new(product.into(), 200, "product found")))
}

/// PUT /product/updatestock — synchronous stock decrement.
#[tracing::instrument(skip(state))]
pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StockUpdateRequest>,
) -> Result<Json<CommonDto<ProductId>>, ApiError> {
    let quantity = u32::try_from(req.product_count)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("invalid productCount {}", req.product_count))
        })?;

    let product = state.products.update_stock(req.product_id, quantity).await?;
    Ok(Json(CommonDto::new(product.id, 200, "stock updated")))
}
