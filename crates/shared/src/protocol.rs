use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{LabelId, OrderId, PaymentStatus, ProgressColor, RefundStatus, TelegramId},
    lenient,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_orders: u64,
    #[serde(default)]
    pub paid_orders: u64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub total_revenue: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub total_profit: f64,
    #[serde(default)]
    pub total_labels: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_user_balance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub name: String,
    #[serde(default, alias = "street", deserialize_with = "lenient::null_as_default")]
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub zip: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub address_from: Address,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub address_to: Address,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub amount: f64,
    pub payment_status: PaymentStatus,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub shipping_status: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub refund_status: RefundStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub label_id: Option<LabelId>,
    #[serde(default, deserialize_with = "lenient::timestamp_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the refund action should be offered for this order.
    pub fn refund_available(&self) -> bool {
        self.payment_status == PaymentStatus::Paid && self.refund_status != RefundStatus::Refunded
    }

    pub fn is_refunded(&self) -> bool {
        self.refund_status == RefundStatus::Refunded
    }

    /// First eight characters of the id, as shown in order lists.
    pub fn short_id(&self) -> &str {
        let id = self.id.as_str();
        match id.char_indices().nth(8) {
            Some((cut, _)) => &id[..cut],
            None => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub telegram_id: TelegramId,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub balance: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub discount: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub blocked: bool,
    #[serde(default, deserialize_with = "lenient::timestamp_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub telegram_id: TelegramId,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub rating_score: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub rating_level: String,
    #[serde(default, alias = "orders_count")]
    pub total_orders: u64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub total_spent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status: String,
    #[serde(default)]
    pub status_details: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "status_date", deserialize_with = "lenient::timestamp_opt")]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub tracking_number: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub carrier: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub progress_color: ProgressColor,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status_name: String,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    /// Oldest first.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub tracking_events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseStats {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub total_expense: f64,
    #[serde(default)]
    pub labels_count: u64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub today_expense: f64,
    #[serde(default)]
    pub today_labels: u64,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDetailStats {
    #[serde(default)]
    pub total_orders: u64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceHistoryEntry {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetails {
    pub user: User,
    #[serde(default)]
    pub stats: UserDetailStats,
    /// Newest first, at most ten entries.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub balance_history: Vec<BalanceHistoryEntry>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub recent_orders: Vec<Order>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotHealth {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status: String,
    #[serde(default)]
    pub bot_username: Option<String>,
    #[serde(default)]
    pub bot_id: Option<i64>,
    #[serde(default)]
    pub bot_name: Option<String>,
    #[serde(default)]
    pub application_running: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BotHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotLogEntry {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_category")]
    pub category: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub message: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_category() -> String {
    "general".to_string()
}

impl BotLogEntry {
    /// Wraps one line of an unstructured log dump.
    pub fn from_raw_line(line: &str) -> Self {
        let level = ["ERROR", "WARNING", "DEBUG"]
            .into_iter()
            .find(|level| line.contains(level))
            .unwrap_or("INFO");
        Self {
            level: level.to_string(),
            category: default_log_category(),
            timestamp: None,
            message: line.to_string(),
        }
    }
}

/// `bot/logs` answers either with structured entries or with the raw tail
/// of the log file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LogsPayload {
    Entries(Vec<BotLogEntry>),
    Raw(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawBotLogs {
    #[serde(default)]
    logs: Option<LogsPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBotLogs")]
pub struct BotLogs {
    pub logs: Vec<BotLogEntry>,
}

impl From<RawBotLogs> for BotLogs {
    fn from(value: RawBotLogs) -> Self {
        let logs = match value.logs {
            Some(LogsPayload::Entries(entries)) => entries,
            Some(LogsPayload::Raw(text)) => text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(BotLogEntry::from_raw_line)
                .collect(),
            None => Vec::new(),
        };
        Self { logs }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueMetrics {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub total: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub average_order: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserActivityMetrics {
    #[serde(default)]
    pub active_today: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotMetrics {
    #[serde(default)]
    pub total_users: Option<u64>,
    #[serde(default)]
    pub total_orders: Option<u64>,
    #[serde(default)]
    pub active_sessions: Option<u64>,
    #[serde(default)]
    pub pending_orders: Option<u64>,
    #[serde(default)]
    pub revenue: Option<RevenueMetrics>,
    #[serde(default)]
    pub users: Option<UserActivityMetrics>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    #[serde(default = "default_distance_unit")]
    pub distance_unit: String,
    #[serde(default = "default_mass_unit")]
    pub mass_unit: String,
}

fn default_distance_unit() -> String {
    "in".to_string()
}

fn default_mass_unit() -> String {
    "lb".to_string()
}

impl Default for Parcel {
    fn default() -> Self {
        Self {
            length: 5.0,
            width: 5.0,
            height: 5.0,
            weight: 2.0,
            distance_unit: default_distance_unit(),
            mass_unit: default_mass_unit(),
        }
    }
}

/// Body of `POST orders`. The backend prices the label and messages the
/// user a payment link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub telegram_id: TelegramId,
    pub address_from: Address,
    pub address_to: Address,
    pub parcel: Parcel,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderCreated {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
}

/// Acknowledgement body returned by state-changing endpoints. Only the
/// message is surfaced; the dashboard never trusts the numbers in it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
