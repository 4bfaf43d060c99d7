//! Synchronous product lookup.
//!
//! The order authority never owns product data; it asks the product
//! authority for a [`ProductSnapshot`] while building an order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{CommonDto, ProductId};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Product state at query time. Not persisted by the order side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: i64,
    pub stock_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductQueryError {
    /// The product service answered and the product does not exist.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// Transport failure, bad status or undecodable body.
    #[error("Product service unavailable: {0}")]
    Unavailable(String),
}

impl ProductQueryError {
    /// Returns true if the error says something about the dependency's
    /// health rather than about the requested product.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, ProductQueryError::Unavailable(_))
    }
}

/// Capability to look a product up by id.
#[async_trait]
pub trait ProductQueryClient: Send + Sync {
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError>;
}

#[async_trait]
impl<T: ProductQueryClient + ?Sized> ProductQueryClient for Arc<T> {
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError> {
        (**self).fetch(id).await
    }
}

/// Queries `GET {base}/product/detail/{id}` on the product service.
pub struct HttpProductClient {
    client: Client,
    base_url: Url,
}

impl HttpProductClient {
    /// Builds a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(mut base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn detail_url(&self, id: ProductId) -> Result<Url, ProductQueryError> {
        self.base_url
            .join(&format!("product/detail/{id}"))
            .map_err(|e| ProductQueryError::Unavailable(format!("invalid product URL: {e}")))
    }
}

#[async_trait]
impl ProductQueryClient for HttpProductClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError> {
        let response = self
            .client
            .get(self.detail_url(id)?)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        decode_detail(id, status, body.as_ref())
    }
}

fn map_transport_error(error: reqwest::Error) -> ProductQueryError {
    if error.is_timeout() {
        ProductQueryError::Unavailable("product service timed out".to_string())
    } else {
        ProductQueryError::Unavailable(error.to_string())
    }
}

fn decode_detail(
    id: ProductId,
    status: StatusCode,
    body: &[u8],
) -> Result<ProductSnapshot, ProductQueryError> {
    if status == StatusCode::NOT_FOUND {
        return Err(ProductQueryError::NotFound(id));
    }
    if !status.is_success() {
        return Err(ProductQueryError::Unavailable(format!(
            "product service returned {status}"
        )));
    }
    let envelope: CommonDto<ProductSnapshot> = serde_json::from_slice(body).map_err(|e| {
        ProductQueryError::Unavailable(format!("invalid product payload: {e}"))
    })?;
    Ok(envelope.into_result())
}

/// Product lookups served from memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductClient {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
}

impl InMemoryProductClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: ProductSnapshot) {
        self.products.write().await.insert(product.id, product);
    }

    /// Makes every lookup fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups that reached this client.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductQueryClient for InMemoryProductClient {
    async fn fetch(&self, id: ProductId) -> Result<ProductSnapshot, ProductQueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProductQueryError::Unavailable(
                "product service not responding".to_string(),
            ));
        }
        self.products
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ProductQueryError::NotFound(id))
    }
}
