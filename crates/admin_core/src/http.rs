use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{LabelId, OrderId, PaymentStatus, TelegramId},
    error::ErrorBody,
    protocol::{
        BotHealth, BotLogs, BotMetrics, CommandAck, ExpenseStats, LeaderboardEntry, NewOrder, Order,
        OrderCreated, Stats, TrackingInfo, User, UserDetails,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    download::filename_from_content_disposition, error::DashboardError, BackendApi, Download,
    ExpenseRange, Result,
};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

type Query = Vec<(&'static str, String)>;

/// [`BackendApi`] over the backend's HTTP/JSON endpoints.
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| DashboardError::transport("client setup", source))?;
        Self::with_client(base_url, http)
    }

    fn with_client(base_url: &str, http: Client) -> Result<Self> {
        let invalid = |reason: &str| DashboardError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };
        let parsed = Url::parse(base_url.trim()).map_err(|err| invalid(&err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if parsed.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path"));
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response> {
        let endpoint = url.path().to_string();
        debug!(%endpoint, "backend request");
        let response = request
            .send()
            .await
            .map_err(|source| DashboardError::transport(endpoint.clone(), source))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = ErrorBody::parse_message(&body);
        warn!(%endpoint, status = status.as_u16(), ?message, "backend rejected request");
        Err(DashboardError::Server {
            endpoint,
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str], query: Query) -> Result<T> {
        let url = self.endpoint(segments);
        let response = self
            .send(self.http.get(url.clone()).query(&query), &url)
            .await?;
        response
            .json()
            .await
            .map_err(|source| DashboardError::transport(url.path(), source))
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        let response = self
            .send(self.http.post(url.clone()).json(body), &url)
            .await?;
        response
            .json()
            .await
            .map_err(|source| DashboardError::transport(url.path(), source))
    }

    async fn post_command(&self, request: RequestBuilder, url: &Url) -> Result<CommandAck> {
        let response = self.send(request, url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| DashboardError::transport(url.path(), source))?;
        // Acks are informational; an empty or odd body is still a success.
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn post(&self, segments: &[&str], query: Query) -> Result<CommandAck> {
        let url = self.endpoint(segments);
        self.post_command(self.http.post(url.clone()).query(&query), &url)
            .await
    }

    async fn get_binary(&self, segments: &[&str], query: Query) -> Result<Download> {
        let url = self.endpoint(segments);
        let response = self
            .send(self.http.get(url.clone()).query(&query), &url)
            .await?;
        let suggested_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_content_disposition);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|source| DashboardError::transport(url.path(), source))?;
        Ok(Download {
            suggested_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

fn status_query(payment_status: Option<PaymentStatus>) -> Query {
    payment_status
        .map(|status| vec![("payment_status", status.as_str().to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_stats(&self) -> Result<Stats> {
        self.get_json(&["stats"], Vec::new()).await
    }

    async fn fetch_expenses(&self, range: &ExpenseRange) -> Result<ExpenseStats> {
        self.get_json(&["stats", "expenses"], range.query_pairs())
            .await
    }

    async fn fetch_orders(&self) -> Result<Vec<Order>> {
        self.get_json(&["orders"], Vec::new()).await
    }

    async fn search_orders(
        &self,
        query: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Vec<Order>> {
        let mut params = vec![("query", query.to_string())];
        params.extend(status_query(payment_status));
        self.get_json(&["orders", "search"], params).await
    }

    async fn export_orders_csv(&self, payment_status: Option<PaymentStatus>) -> Result<Download> {
        self.get_binary(&["orders", "export", "csv"], status_query(payment_status))
            .await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreated> {
        self.post_json(&["orders"], order).await
    }

    async fn refund_order(&self, order_id: &OrderId, reason: Option<&str>) -> Result<CommandAck> {
        let query = reason
            .map(|reason| vec![("refund_reason", reason.to_string())])
            .unwrap_or_default();
        self.post(&["orders", order_id.as_str(), "refund"], query)
            .await
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        self.get_json(&["users"], Vec::new()).await
    }

    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        self.get_json(&["users", "leaderboard"], Vec::new()).await
    }

    async fn fetch_user_details(&self, telegram_id: TelegramId) -> Result<UserDetails> {
        let id = telegram_id.to_string();
        self.get_json(&["users", id.as_str(), "details"], Vec::new()).await
    }

    async fn add_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck> {
        let id = telegram_id.to_string();
        self.post(
            &["users", id.as_str(), "balance", "add"],
            vec![("amount", amount.to_string())],
        )
        .await
    }

    async fn deduct_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck> {
        let id = telegram_id.to_string();
        self.post(
            &["users", id.as_str(), "balance", "deduct"],
            vec![("amount", amount.to_string())],
        )
        .await
    }

    async fn set_discount(&self, telegram_id: TelegramId, discount: u8) -> Result<CommandAck> {
        let id = telegram_id.to_string();
        self.post(
            &["users", id.as_str(), "discount"],
            vec![("discount", discount.to_string())],
        )
        .await
    }

    async fn block_user(
        &self,
        telegram_id: TelegramId,
        reason: Option<&str>,
    ) -> Result<CommandAck> {
        let id = telegram_id.to_string();
        let query = reason
            .map(|reason| vec![("reason", reason.to_string())])
            .unwrap_or_default();
        self.post(&["users", id.as_str(), "block"], query).await
    }

    async fn unblock_user(&self, telegram_id: TelegramId) -> Result<CommandAck> {
        let id = telegram_id.to_string();
        self.post(&["users", id.as_str(), "unblock"], Vec::new()).await
    }

    async fn download_label(&self, label_id: &LabelId) -> Result<Download> {
        self.get_binary(&["labels", label_id.as_str(), "download"], Vec::new())
            .await
    }

    async fn track_shipment(&self, tracking_number: &str, carrier: &str) -> Result<TrackingInfo> {
        self.get_json(
            &["shipping", "track", tracking_number],
            vec![("carrier", carrier.to_string())],
        )
        .await
    }

    async fn bot_health(&self) -> Result<BotHealth> {
        self.get_json(&["bot", "health"], Vec::new()).await
    }

    async fn bot_logs(&self, limit: u32) -> Result<BotLogs> {
        self.get_json(&["bot", "logs"], vec![("limit", limit.to_string())])
            .await
    }

    async fn bot_metrics(&self) -> Result<BotMetrics> {
        self.get_json(&["bot", "metrics"], Vec::new()).await
    }

    async fn restart_bot(&self, admin_key: &str) -> Result<CommandAck> {
        let url = self.endpoint(&["bot", "restart"]);
        let request = self
            .http
            .post(url.clone())
            .header(ADMIN_KEY_HEADER, admin_key)
            .json(&serde_json::json!({}));
        self.post_command(request, &url).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
