use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{LabelId, OrderId, PaymentStatus, TelegramId},
    protocol::{
        ExpenseStats, LeaderboardEntry, Order, OrderCreated, Stats, TrackingInfo, User,
        UserDetails,
    },
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    download::{default_export_name, default_label_name},
    emit,
    input::{self, ExpenseRange, InputError, OrderDraft},
    BackendApi, DashboardError, DashboardEvent, Notification, Result,
};

const LOAD_FAILED: &str = "Failed to load data";
const SEARCH_FAILED: &str = "Search failed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Everything the overview screen shows, replaced as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub stats: Stats,
    pub orders: Vec<Order>,
    pub users: Vec<User>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub expenses: ExpenseStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub query: String,
    pub payment_status: Option<PaymentStatus>,
}

/// Caller-owned view state for the overview. Only [`Dashboard`] mutates it.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    phase: LoadPhase,
    snapshot: Snapshot,
    loaded_at: Option<DateTime<Utc>>,
    expense_range: ExpenseRange,
    order_filter: Option<OrderFilter>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn expense_range(&self) -> ExpenseRange {
        self.expense_range
    }

    /// The search currently narrowing `snapshot().orders`, if any.
    pub fn order_filter(&self) -> Option<&OrderFilter> {
        self.order_filter.as_ref()
    }

    pub fn find_order(&self, order_id: &OrderId) -> Option<&Order> {
        self.snapshot
            .orders
            .iter()
            .find(|order| &order.id == order_id)
    }

    pub fn find_user(&self, telegram_id: TelegramId) -> Option<&User> {
        self.snapshot
            .users
            .iter()
            .find(|user| user.telegram_id == telegram_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceDirection {
    Add,
    Deduct,
}

/// Aggregator and command dispatcher for the overview screen.
pub struct Dashboard {
    api: Arc<dyn BackendApi>,
    events: broadcast::Sender<DashboardEvent>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self { api, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    fn notify(&self, notification: Notification) {
        emit(&self.events, DashboardEvent::Notice(notification));
    }

    /// Fetches every overview resource concurrently and swaps the snapshot
    /// in only when all of them arrived.
    pub async fn load(&self, state: &mut DashboardState) -> Result<()> {
        state.phase = LoadPhase::Loading;
        let range = state.expense_range;

        let fetched = futures::try_join!(
            self.api.fetch_stats(),
            self.api.fetch_orders(),
            self.api.fetch_users(),
            self.api.fetch_leaderboard(),
            self.api.fetch_expenses(&range),
        );

        match fetched {
            Ok((stats, orders, users, leaderboard, expenses)) => {
                info!(
                    users = users.len(),
                    orders = orders.len(),
                    leaderboard = leaderboard.len(),
                    "dashboard snapshot replaced"
                );
                state.snapshot = Snapshot {
                    stats,
                    orders,
                    users,
                    leaderboard,
                    expenses,
                };
                state.order_filter = None;
                state.loaded_at = Some(Utc::now());
                state.phase = LoadPhase::Ready;
                emit(&self.events, DashboardEvent::SnapshotReplaced);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "dashboard load failed; keeping previous snapshot");
                state.phase = LoadPhase::Error(LOAD_FAILED.to_string());
                self.notify(Notification::error(LOAD_FAILED));
                Err(err)
            }
        }
    }

    /// Changes the expense report window and reloads.
    pub async fn set_expense_range(
        &self,
        state: &mut DashboardState,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()> {
        let range = match ExpenseRange::parse(from, to) {
            Ok(range) => range,
            Err(err) => return Err(self.reject(err)),
        };
        state.expense_range = range;
        self.load(state).await
    }

    /// Narrows the order list. An empty query is a full reload.
    pub async fn search(
        &self,
        state: &mut DashboardState,
        query: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return self.load(state).await;
        }

        state.phase = LoadPhase::Loading;
        match self.api.search_orders(query, payment_status).await {
            Ok(orders) => {
                info!(query, ?payment_status, hits = orders.len(), "order search");
                let count = orders.len();
                state.snapshot.orders = orders;
                state.order_filter = Some(OrderFilter {
                    query: query.to_string(),
                    payment_status,
                });
                state.phase = LoadPhase::Ready;
                emit(&self.events, DashboardEvent::OrdersReplaced { count });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, query, "order search failed");
                let message = err.notification_text(SEARCH_FAILED);
                state.phase = LoadPhase::Error(message.clone());
                self.notify(Notification::error(message));
                Err(err)
            }
        }
    }

    pub async fn add_balance(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
        raw_amount: &str,
    ) -> Result<()> {
        self.change_balance(state, telegram_id, raw_amount, BalanceDirection::Add)
            .await
    }

    pub async fn deduct_balance(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
        raw_amount: &str,
    ) -> Result<()> {
        self.change_balance(state, telegram_id, raw_amount, BalanceDirection::Deduct)
            .await
    }

    async fn change_balance(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
        raw_amount: &str,
        direction: BalanceDirection,
    ) -> Result<()> {
        let amount = input::parse_amount(raw_amount).map_err(|err| self.reject(err))?;
        match direction {
            BalanceDirection::Add => {
                self.dispatch(
                    state,
                    "add_balance",
                    "Failed to update balance",
                    format!("Added ${amount:.2} to balance"),
                    self.api.add_balance(telegram_id, amount),
                )
                .await
                .map(drop)
            }
            BalanceDirection::Deduct => {
                self.dispatch(
                    state,
                    "deduct_balance",
                    "Failed to update balance",
                    format!("Deducted ${amount:.2} from balance"),
                    self.api.deduct_balance(telegram_id, amount),
                )
                .await
                .map(drop)
            }
        }
    }

    pub async fn set_discount(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
        raw_discount: &str,
    ) -> Result<()> {
        let discount = input::parse_discount(raw_discount).map_err(|err| self.reject(err))?;
        self.dispatch(
            state,
            "set_discount",
            "Failed to set discount",
            format!("Discount set to {discount}%"),
            self.api.set_discount(telegram_id, discount),
        )
        .await
        .map(drop)
    }

    /// Creates an order on behalf of a user. The backend sends the user a
    /// payment link; the returned confirmation carries it too.
    pub async fn create_order(
        &self,
        state: &mut DashboardState,
        draft: &OrderDraft,
    ) -> Result<OrderCreated> {
        let order = draft.validate().map_err(|err| self.reject(err))?;
        self.dispatch(
            state,
            "create_order",
            "Failed to create order",
            "Order created! Payment link sent to user.".to_string(),
            self.api.create_order(&order),
        )
        .await
    }

    /// Refunds an order. Orders the snapshot already shows as refunded (or
    /// unpaid) are refused without contacting the backend.
    pub async fn refund(
        &self,
        state: &mut DashboardState,
        raw_order_id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let order_id = OrderId(
            input::require_path_id("Order id", raw_order_id)
                .map_err(|err| self.reject(err))?
                .to_string(),
        );
        if let Some(order) = state.find_order(&order_id) {
            if order.is_refunded() {
                return Err(self.reject(InputError::AlreadyRefunded(order_id)));
            }
            if !order.refund_available() {
                return Err(self.reject(InputError::NotRefundable(order_id)));
            }
        }

        let reason = input::optional_text(reason);
        self.dispatch(
            state,
            "refund",
            "Failed to refund order",
            format!("Order {order_id} refunded"),
            self.api.refund_order(&order_id, reason),
        )
        .await
        .map(drop)
    }

    pub async fn block_user(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
        reason: Option<&str>,
    ) -> Result<()> {
        let reason = input::optional_text(reason);
        self.dispatch(
            state,
            "block_user",
            "Failed to block user",
            format!("User {telegram_id} blocked"),
            self.api.block_user(telegram_id, reason),
        )
        .await
        .map(drop)
    }

    pub async fn unblock_user(
        &self,
        state: &mut DashboardState,
        telegram_id: TelegramId,
    ) -> Result<()> {
        self.dispatch(
            state,
            "unblock_user",
            "Failed to unblock user",
            format!("User {telegram_id} unblocked"),
            self.api.unblock_user(telegram_id),
        )
        .await
        .map(drop)
    }

    /// Downloads the order CSV into `dir` and returns the written path.
    pub async fn export_orders(
        &self,
        payment_status: Option<PaymentStatus>,
        dir: &Path,
    ) -> Result<PathBuf> {
        let default_name = default_export_name(payment_status, Utc::now());
        let saved = match self.api.export_orders_csv(payment_status).await {
            Ok(download) => download.save_into(dir, &default_name).await,
            Err(err) => Err(err),
        };
        self.report_download(saved, "Failed to export CSV", "Exported orders")
    }

    pub async fn download_label(&self, raw_label_id: &str, dir: &Path) -> Result<PathBuf> {
        let label_id = LabelId(
            input::require_path_id("Label id", raw_label_id)
                .map_err(|err| self.reject(err))?
                .to_string(),
        );
        let saved = match self.api.download_label(&label_id).await {
            Ok(download) => download.save_into(dir, &default_label_name(&label_id)).await,
            Err(err) => Err(err),
        };
        self.report_download(saved, "Failed to download label", "Downloaded label")
    }

    /// Live tracking lookup. The result is handed back, never kept.
    pub async fn track(
        &self,
        raw_tracking_number: &str,
        raw_carrier: &str,
    ) -> Result<TrackingInfo> {
        let tracking_number = input::require_path_id("Tracking number", raw_tracking_number)
            .map_err(|err| self.reject(err))?;
        let carrier = input::require_text("Carrier", raw_carrier).map_err(|err| self.reject(err))?;
        self.api
            .track_shipment(tracking_number, carrier)
            .await
            .map_err(|err| self.fail(err, "Failed to load tracking information"))
    }

    pub async fn user_details(&self, telegram_id: TelegramId) -> Result<UserDetails> {
        self.api
            .fetch_user_details(telegram_id)
            .await
            .map_err(|err| self.fail(err, "Failed to load user details"))
    }

    /// Runs one state-changing request, then resynchronizes from the
    /// backend. Nothing in `state` changes unless the request succeeded.
    async fn dispatch<T, F>(
        &self,
        state: &mut DashboardState,
        command: &'static str,
        fallback: &str,
        success: String,
        request: F,
    ) -> Result<T>
    where
        T: fmt::Debug,
        F: Future<Output = Result<T>>,
    {
        match request.await {
            Ok(reply) => {
                info!(command, ?reply, "admin command accepted");
                self.notify(Notification::success(success));
                if let Err(err) = self.load(state).await {
                    warn!(command, error = %err, "reload after admin command failed");
                }
                Ok(reply)
            }
            Err(err) => {
                warn!(command, error = %err, "admin command failed");
                Err(self.fail(err, fallback))
            }
        }
    }

    fn report_download(
        &self,
        saved: Result<PathBuf>,
        fallback: &str,
        success: &str,
    ) -> Result<PathBuf> {
        match saved {
            Ok(path) => {
                self.notify(Notification::success(format!(
                    "{success} to {}",
                    path.display()
                )));
                Ok(path)
            }
            Err(err) => {
                warn!(error = %err, "download failed");
                Err(self.fail(err, fallback))
            }
        }
    }

    fn reject(&self, err: InputError) -> DashboardError {
        self.fail(err.into(), "Invalid input")
    }

    fn fail(&self, err: DashboardError, fallback: &str) -> DashboardError {
        self.notify(Notification::error(err.notification_text(fallback)));
        err
    }
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
