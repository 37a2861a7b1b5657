//! View-model layer of the shipping bot admin dashboard.
//!
//! [`Dashboard`] fans out the overview fetches and owns the admin commands,
//! [`Monitor`] does the same for bot health/logs/metrics. Both mutate a
//! caller-owned state object and report outcomes as [`DashboardEvent`]s.

use async_trait::async_trait;
use shared::{
    domain::{LabelId, OrderId, PaymentStatus, TelegramId},
    protocol::{
        BotHealth, BotLogs, BotMetrics, CommandAck, ExpenseStats, LeaderboardEntry, NewOrder, Order,
        OrderCreated, Stats, TrackingInfo, User, UserDetails,
    },
};
use tokio::sync::broadcast;

pub mod aggregator;
pub mod download;
pub mod error;
pub mod http;
pub mod input;
pub mod monitoring;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

pub use aggregator::{Dashboard, DashboardState, LoadPhase, OrderFilter, Snapshot};
pub use download::Download;
pub use error::DashboardError;
pub use http::HttpBackend;
pub use input::{AddressDraft, ExpenseRange, InputError, OrderDraft, ParcelDraft};
pub use monitoring::{AutoRefresh, Monitor, MonitoringSnapshot, MonitoringState};

pub type Result<T> = std::result::Result<T, DashboardError>;

/// The backend REST surface the dashboard consumes. Every method maps to
/// exactly one HTTP request.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_stats(&self) -> Result<Stats>;
    async fn fetch_expenses(&self, range: &ExpenseRange) -> Result<ExpenseStats>;
    async fn fetch_orders(&self) -> Result<Vec<Order>>;
    async fn search_orders(
        &self,
        query: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Vec<Order>>;
    async fn export_orders_csv(&self, payment_status: Option<PaymentStatus>) -> Result<Download>;
    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreated>;
    async fn refund_order(&self, order_id: &OrderId, reason: Option<&str>) -> Result<CommandAck>;
    async fn fetch_users(&self) -> Result<Vec<User>>;
    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>>;
    async fn fetch_user_details(&self, telegram_id: TelegramId) -> Result<UserDetails>;
    async fn add_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck>;
    async fn deduct_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck>;
    async fn set_discount(&self, telegram_id: TelegramId, discount: u8) -> Result<CommandAck>;
    async fn block_user(&self, telegram_id: TelegramId, reason: Option<&str>)
        -> Result<CommandAck>;
    async fn unblock_user(&self, telegram_id: TelegramId) -> Result<CommandAck>;
    async fn download_label(&self, label_id: &LabelId) -> Result<Download>;
    async fn track_shipment(&self, tracking_number: &str, carrier: &str) -> Result<TrackingInfo>;
    async fn bot_health(&self) -> Result<BotHealth>;
    async fn bot_logs(&self, limit: u32) -> Result<BotLogs>;
    async fn bot_metrics(&self) -> Result<BotMetrics>;
    async fn restart_bot(&self, admin_key: &str) -> Result<CommandAck>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// One operator-facing message per outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Notice(Notification),
    SnapshotReplaced,
    OrdersReplaced { count: usize },
    MonitoringReplaced,
}

pub(crate) fn emit(events: &broadcast::Sender<DashboardEvent>, event: DashboardEvent) {
    // No subscribers is fine; nobody is looking at the screen.
    let _ = events.send(event);
}
