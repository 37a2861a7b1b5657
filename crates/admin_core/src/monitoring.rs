//! Bot monitoring view: health, recent logs and metrics, plus the timer that
//! keeps them fresh.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use shared::protocol::{BotHealth, BotLogEntry, BotMetrics};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    emit, input, BackendApi, DashboardError, DashboardEvent, LoadPhase, Notification, Result,
};

pub const DEFAULT_LOG_LIMIT: u32 = 50;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RESTART_SETTLE: Duration = Duration::from_secs(10);

const MONITORING_FAILED: &str = "Failed to load monitoring data";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoringSnapshot {
    pub health: BotHealth,
    pub logs: Vec<BotLogEntry>,
    pub metrics: BotMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct MonitoringState {
    phase: LoadPhase,
    snapshot: Option<MonitoringSnapshot>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl MonitoringState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    pub fn snapshot(&self) -> Option<&MonitoringSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

pub struct Monitor {
    api: Arc<dyn BackendApi>,
    events: broadcast::Sender<DashboardEvent>,
    log_limit: u32,
    restart_settle: Duration,
}

impl Monitor {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            api,
            events,
            log_limit: DEFAULT_LOG_LIMIT,
            restart_settle: DEFAULT_RESTART_SETTLE,
        }
    }

    pub fn with_log_limit(mut self, log_limit: u32) -> Self {
        self.log_limit = log_limit.max(1);
        self
    }

    /// How long to wait after a restart request before reloading; the bot
    /// needs a few seconds to come back.
    pub fn with_restart_settle(mut self, restart_settle: Duration) -> Self {
        self.restart_settle = restart_settle;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub async fn load(&self, state: &mut MonitoringState) -> Result<()> {
        state.phase = LoadPhase::Loading;
        let fetched = futures::try_join!(
            self.api.bot_health(),
            self.api.bot_logs(self.log_limit),
            self.api.bot_metrics(),
        );

        match fetched {
            Ok((health, logs, metrics)) => {
                debug!(
                    status = %health.status,
                    log_lines = logs.logs.len(),
                    "monitoring snapshot replaced"
                );
                state.snapshot = Some(MonitoringSnapshot {
                    health,
                    logs: logs.logs,
                    metrics,
                });
                state.refreshed_at = Some(Utc::now());
                state.phase = LoadPhase::Ready;
                emit(&self.events, DashboardEvent::MonitoringReplaced);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "monitoring load failed; keeping previous snapshot");
                state.phase = LoadPhase::Error(MONITORING_FAILED.to_string());
                emit(
                    &self.events,
                    DashboardEvent::Notice(Notification::error(MONITORING_FAILED)),
                );
                Err(err)
            }
        }
    }

    /// Asks the backend to restart the bot, then reloads once it had time to
    /// come back up.
    pub async fn restart_bot(&self, state: &mut MonitoringState, admin_key: &str) -> Result<()> {
        let admin_key = match input::require_text("Admin key", admin_key) {
            Ok(key) => key,
            Err(err) => return Err(self.fail(err.into())),
        };

        match self.api.restart_bot(admin_key).await {
            Ok(ack) => {
                info!(status = ?ack.status, "bot restart requested");
                let message = ack
                    .message
                    .unwrap_or_else(|| "Bot restart initiated".to_string());
                emit(
                    &self.events,
                    DashboardEvent::Notice(Notification::success(message)),
                );
                if !self.restart_settle.is_zero() {
                    tokio::time::sleep(self.restart_settle).await;
                }
                if let Err(err) = self.load(state).await {
                    warn!(error = %err, "reload after restart failed");
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "bot restart failed");
                Err(self.fail(err))
            }
        }
    }

    fn fail(&self, err: DashboardError) -> DashboardError {
        emit(
            &self.events,
            DashboardEvent::Notice(Notification::error(
                err.notification_text("Failed to restart bot"),
            )),
        );
        err
    }
}

/// Periodic monitoring reload. Ticks are skipped while disabled; dropping
/// the handle stops the timer.
pub struct AutoRefresh {
    enabled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AutoRefresh {
    /// Starts the timer. The first tick fires one `period` from now; the
    /// caller is expected to have loaded once already.
    pub fn start(
        monitor: Arc<Monitor>,
        state: Arc<Mutex<MonitoringState>>,
        period: Duration,
        enabled: bool,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(enabled));
        let flag = Arc::clone(&enabled);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Acquire) {
                    continue;
                }
                // Holding the lock for the whole reload keeps refreshes from overlapping.
                let mut guard = state.lock().await;
                // The toggle may have flipped while waiting for the lock.
                if !flag.load(Ordering::Acquire) {
                    continue;
                }
                if let Err(err) = monitor.load(&mut guard).await {
                    debug!(error = %err, "auto refresh tick failed");
                }
            }
        });
        Self { enabled, task }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        info!(enabled, "auto refresh toggled");
    }

    /// Flips the toggle and returns the new value.
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::AcqRel);
        info!(enabled, "auto refresh toggled");
        enabled
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/monitoring_tests.rs"]
mod tests;
