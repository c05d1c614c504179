//! Remote order source.
//!
//! Fetches the order collection and, per order, one dependent call for
//! its items. Every call goes through the retry policy. The trait seam
//! lets the pipeline run against fixture sources in tests.

use async_trait::async_trait;
use snafu::ResultExt;

use crate::config::ApiConfig;
use crate::error::{DecodeSnafu, FetchError, RequestSnafu, StatusSnafu};
use crate::record::RawRecord;
use crate::retry::RetryPolicy;

/// Produces parent orders and their dependent item records.
#[async_trait]
pub trait OrderSource {
    /// Fetch the full order collection.
    async fn list_orders(&self) -> Result<Vec<RawRecord>, FetchError>;

    /// Fetch the items belonging to one order.
    async fn fetch_items(&self, order_id: &str) -> Result<Vec<RawRecord>, FetchError>;
}

/// HTTP order source backed by `reqwest`.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context(RequestSnafu {
                url: config.base_url.clone(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// URL of the order collection endpoint.
    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }

    /// URL of the dependent items endpoint for one order.
    fn items_url(&self, order_id: &str) -> String {
        format!("{}/orders/{order_id}/items", self.base_url)
    }

    /// One GET returning a JSON array of objects.
    async fn get_collection(&self, url: &str) -> Result<Vec<RawRecord>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(RequestSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu {
                url,
                status: status.as_u16(),
            }
            .fail();
        }

        response.json().await.context(DecodeSnafu { url })
    }
}

#[async_trait]
impl OrderSource for ApiClient {
    async fn list_orders(&self) -> Result<Vec<RawRecord>, FetchError> {
        let url = self.orders_url();
        self.retry
            .run("list orders", || self.get_collection(&url))
            .await
    }

    async fn fetch_items(&self, order_id: &str) -> Result<Vec<RawRecord>, FetchError> {
        let url = self.items_url(order_id);
        self.retry
            .run("fetch order items", || self.get_collection(&url))
            .await
    }
}
