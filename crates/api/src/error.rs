//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::CatalogError;
use common::CommonDto;
use ordering::OrderError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every error body is a [`CommonDto`] with a `null` result.
#[derive(Debug)]
pub enum ApiError {
    /// A required request header is absent or blank.
    MissingHeader(&'static str),
    /// Bad request from the client.
    BadRequest(String),
    /// Order service error.
    Order(OrderError),
    /// Product service error.
    Catalog(CatalogError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingHeader(name) => {
                (StatusCode::BAD_REQUEST, format!("missing {name} header"))
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Catalog(err) => catalog_error_to_response(err),
        };

        let body = CommonDto::new(serde_json::Value::Null, status.as_u16(), message);
        (status, Json(body)).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    match &err {
        OrderError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        OrderError::UpstreamUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string()),
        OrderError::Store(_) => {
            tracing::error!(error = %err, "order store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn catalog_error_to_response(err: CatalogError) -> (StatusCode, String) {
    match &err {
        CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CatalogError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        CatalogError::Store(_) => {
            tracing::error!(error = %err, "product store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid PRODUCT_SERVICE_URL: {0}")]
    ProductServiceUrl(String),

    #[error("Could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stock channel error: {0}")]
    Channel(#[from] stock_channel::ChannelError),
}
