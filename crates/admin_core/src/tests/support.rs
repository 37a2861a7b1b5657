//! In-memory [`BackendApi`] double with scripted responses and a call log.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use shared::{
    domain::{LabelId, OrderId, PaymentStatus, RefundStatus, TelegramId},
    protocol::{
        BotHealth, BotLogEntry, BotLogs, BotMetrics, CommandAck, ExpenseStats, LeaderboardEntry,
        NewOrder, Order, OrderCreated, Stats, TrackingInfo, User, UserDetails,
    },
};
use tokio::sync::Barrier;

use crate::{BackendApi, DashboardError, Download, ExpenseRange, Result};

#[derive(Default)]
struct Script {
    stats: Stats,
    expenses: ExpenseStats,
    orders: Vec<Order>,
    search_results: Vec<Order>,
    users: Vec<User>,
    leaderboard: Vec<LeaderboardEntry>,
    users_after_command: Option<Vec<User>>,
    health: BotHealth,
    logs: Vec<BotLogEntry>,
    metrics: BotMetrics,
    csv: Vec<u8>,
    failures: HashMap<&'static str, Option<String>>,
    unreachable: HashSet<&'static str>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    rendezvous: Mutex<Option<Arc<Barrier>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_stats(&self, stats: Stats) {
        self.script.lock().expect("script").stats = stats;
    }

    pub fn set_orders(&self, orders: Vec<Order>) {
        self.script.lock().expect("script").orders = orders;
    }

    pub fn set_search_results(&self, orders: Vec<Order>) {
        self.script.lock().expect("script").search_results = orders;
    }

    pub fn set_users(&self, users: Vec<User>) {
        self.script.lock().expect("script").users = users;
    }

    /// Users the backend reports once any command has been applied.
    pub fn set_users_after_command(&self, users: Vec<User>) {
        self.script.lock().expect("script").users_after_command = Some(users);
    }

    pub fn set_health(&self, health: BotHealth) {
        self.script.lock().expect("script").health = health;
    }

    pub fn set_csv(&self, csv: &[u8]) {
        self.script.lock().expect("script").csv = csv.to_vec();
    }

    /// Makes `endpoint` answer with a 400 carrying `message` (or no detail).
    pub fn fail(&self, endpoint: &'static str, message: Option<&str>) {
        self.script
            .lock()
            .expect("script")
            .failures
            .insert(endpoint, message.map(str::to_string));
    }

    /// Makes `endpoint` behave as if the server could not be reached.
    pub fn unreachable(&self, endpoint: &'static str) {
        self.script
            .lock()
            .expect("script")
            .unreachable
            .insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        let mut script = self.script.lock().expect("script");
        script.failures.remove(endpoint);
        script.unreachable.remove(endpoint);
    }

    /// Every read endpoint waits until `parties` reads are in flight at once.
    /// A load that issues its fetches one after another never gets past it.
    pub fn set_rendezvous(&self, parties: usize) {
        *self.rendezvous.lock().expect("rendezvous") = Some(Arc::new(Barrier::new(parties)));
    }

    async fn meet(&self) {
        let barrier = self.rendezvous.lock().expect("rendezvous").clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(':').next() == Some(endpoint))
            .count()
    }

    fn record(&self, endpoint: &'static str, detail: String) -> Result<()> {
        let call = if detail.is_empty() {
            endpoint.to_string()
        } else {
            format!("{endpoint}:{detail}")
        };
        self.calls.lock().expect("calls").push(call);

        let script = self.script.lock().expect("script");
        if script.unreachable.contains(endpoint) {
            return Err(DashboardError::Server {
                endpoint: endpoint.to_string(),
                status: 503,
                message: None,
            });
        }
        if let Some(message) = script.failures.get(endpoint) {
            return Err(DashboardError::Server {
                endpoint: endpoint.to_string(),
                status: 400,
                message: message.clone(),
            });
        }
        Ok(())
    }

    fn apply_command(&self) -> CommandAck {
        let mut script = self.script.lock().expect("script");
        if let Some(users) = script.users_after_command.take() {
            script.users = users;
        }
        CommandAck {
            status: Some("success".to_string()),
            message: None,
        }
    }
}

#[async_trait]
impl BackendApi for ScriptedBackend {
    async fn fetch_stats(&self) -> Result<Stats> {
        self.meet().await;
        self.record("stats", String::new())?;
        Ok(self.script.lock().expect("script").stats.clone())
    }

    async fn fetch_expenses(&self, range: &ExpenseRange) -> Result<ExpenseStats> {
        self.meet().await;
        let detail = range
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        self.record("expenses", detail)?;
        let mut expenses = self.script.lock().expect("script").expenses.clone();
        expenses.date_from = range.from();
        expenses.date_to = range.to();
        Ok(expenses)
    }

    async fn fetch_orders(&self) -> Result<Vec<Order>> {
        self.meet().await;
        self.record("orders", String::new())?;
        Ok(self.script.lock().expect("script").orders.clone())
    }

    async fn search_orders(
        &self,
        query: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Vec<Order>> {
        let status = payment_status.map(PaymentStatus::as_str).unwrap_or("any");
        self.record("search", format!("{query}:{status}"))?;
        Ok(self.script.lock().expect("script").search_results.clone())
    }

    async fn export_orders_csv(&self, payment_status: Option<PaymentStatus>) -> Result<Download> {
        let status = payment_status.map(PaymentStatus::as_str).unwrap_or("any");
        self.record("export", status.to_string())?;
        Ok(Download {
            suggested_name: None,
            content_type: Some("text/csv".to_string()),
            bytes: self.script.lock().expect("script").csv.clone(),
        })
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreated> {
        self.record(
            "create_order",
            format!("{}:{}", order.telegram_id, order.amount),
        )?;
        let mut script = self.script.lock().expect("script");
        let id = OrderId(format!("ord-new-{}", script.orders.len() + 1));
        let mut created = self::order(id.as_str(), PaymentStatus::Pending, RefundStatus::NotRefunded);
        created.address_from = order.address_from.clone();
        created.address_to = order.address_to.clone();
        created.amount = order.amount;
        script.orders.push(created);
        Ok(OrderCreated {
            payment_url: Some(format!("https://pay.example/{id}")),
            order_id: Some(id),
            amount: order.amount,
            currency: Some("USD".to_string()),
        })
    }

    async fn refund_order(&self, order_id: &OrderId, reason: Option<&str>) -> Result<CommandAck> {
        self.record("refund", format!("{order_id}:{}", reason.unwrap_or("")))?;
        let mut script = self.script.lock().expect("script");
        if let Some(order) = script.orders.iter_mut().find(|order| &order.id == order_id) {
            order.refund_status = RefundStatus::Refunded;
        }
        drop(script);
        Ok(self.apply_command())
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        self.meet().await;
        self.record("users", String::new())?;
        Ok(self.script.lock().expect("script").users.clone())
    }

    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        self.meet().await;
        self.record("leaderboard", String::new())?;
        Ok(self.script.lock().expect("script").leaderboard.clone())
    }

    async fn fetch_user_details(&self, telegram_id: TelegramId) -> Result<UserDetails> {
        self.record("user_details", telegram_id.to_string())?;
        let script = self.script.lock().expect("script");
        let user = script
            .users
            .iter()
            .find(|user| user.telegram_id == telegram_id)
            .cloned()
            .ok_or_else(|| DashboardError::Server {
                endpoint: "user_details".to_string(),
                status: 404,
                message: Some("User not found".to_string()),
            })?;
        Ok(UserDetails {
            user,
            stats: Default::default(),
            balance_history: Vec::new(),
            recent_orders: Vec::new(),
        })
    }

    async fn add_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck> {
        self.record("add_balance", format!("{telegram_id}:{amount}"))?;
        Ok(self.apply_command())
    }

    async fn deduct_balance(&self, telegram_id: TelegramId, amount: f64) -> Result<CommandAck> {
        self.record("deduct_balance", format!("{telegram_id}:{amount}"))?;
        Ok(self.apply_command())
    }

    async fn set_discount(&self, telegram_id: TelegramId, discount: u8) -> Result<CommandAck> {
        self.record("set_discount", format!("{telegram_id}:{discount}"))?;
        Ok(self.apply_command())
    }

    async fn block_user(
        &self,
        telegram_id: TelegramId,
        reason: Option<&str>,
    ) -> Result<CommandAck> {
        self.record(
            "block_user",
            format!("{telegram_id}:{}", reason.unwrap_or("")),
        )?;
        Ok(self.apply_command())
    }

    async fn unblock_user(&self, telegram_id: TelegramId) -> Result<CommandAck> {
        self.record("unblock_user", telegram_id.to_string())?;
        Ok(self.apply_command())
    }

    async fn download_label(&self, label_id: &LabelId) -> Result<Download> {
        self.record("label", label_id.to_string())?;
        Ok(Download {
            suggested_name: Some(format!("{label_id}.pdf")),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.4".to_vec(),
        })
    }

    async fn track_shipment(&self, tracking_number: &str, carrier: &str) -> Result<TrackingInfo> {
        self.record("track", format!("{tracking_number}:{carrier}"))?;
        Ok(TrackingInfo {
            tracking_number: tracking_number.to_string(),
            carrier: carrier.to_string(),
            progress: 50,
            progress_color: Default::default(),
            status_name: "In transit".to_string(),
            estimated_delivery: None,
            tracking_events: Vec::new(),
        })
    }

    async fn bot_health(&self) -> Result<BotHealth> {
        self.meet().await;
        self.record("health", String::new())?;
        Ok(self.script.lock().expect("script").health.clone())
    }

    async fn bot_logs(&self, limit: u32) -> Result<BotLogs> {
        self.meet().await;
        self.record("logs", limit.to_string())?;
        Ok(BotLogs {
            logs: self.script.lock().expect("script").logs.clone(),
        })
    }

    async fn bot_metrics(&self) -> Result<BotMetrics> {
        self.meet().await;
        self.record("metrics", String::new())?;
        Ok(self.script.lock().expect("script").metrics.clone())
    }

    async fn restart_bot(&self, admin_key: &str) -> Result<CommandAck> {
        self.record("restart", admin_key.to_string())?;
        Ok(CommandAck {
            status: Some("restarting".to_string()),
            message: Some("Bot restart initiated".to_string()),
        })
    }
}

pub fn order(id: &str, payment_status: PaymentStatus, refund_status: RefundStatus) -> Order {
    Order {
        id: OrderId::from(id),
        address_from: Default::default(),
        address_to: Default::default(),
        amount: 12.5,
        payment_status,
        shipping_status: "pending".to_string(),
        refund_status,
        tracking_number: None,
        carrier: None,
        label_id: None,
        created_at: None,
    }
}

pub fn user(telegram_id: i64, balance: f64) -> User {
    User {
        telegram_id: TelegramId(telegram_id),
        first_name: format!("user{telegram_id}"),
        username: None,
        balance,
        discount: 0.0,
        blocked: false,
        created_at: None,
    }
}
