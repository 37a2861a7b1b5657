//! Plain-text rendering of dashboard data for the terminal.

use std::fmt::Write;

use admin_core::{MonitoringSnapshot, NoticeLevel, Notification, Snapshot};
use chrono::{DateTime, Utc};
use shared::{
    domain::ProgressColor,
    protocol::{
        ExpenseStats, LeaderboardEntry, Order, OrderCreated, Stats, TrackingInfo, User,
        UserDetails,
    },
};

const MAX_LOG_MESSAGE: usize = 160;

pub fn notice(notification: &Notification) -> String {
    let tag = match notification.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    format!("[{tag}] {}", notification.message)
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn money(value: f64) -> String {
    format!("${value:.2}")
}

pub fn stats(stats: &Stats, expenses: &ExpenseStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Users        {}", stats.total_users);
    let _ = writeln!(
        out,
        "Orders       {} ({} paid)",
        stats.total_orders, stats.paid_orders
    );
    let _ = writeln!(out, "Revenue      {}", money(stats.total_revenue));
    let _ = writeln!(out, "Profit       {}", money(stats.total_profit));
    let _ = writeln!(out, "Labels       {}", stats.total_labels);
    if let Some(balance) = stats.total_user_balance {
        let _ = writeln!(out, "User balance {}", money(balance));
    }

    let window = match (expenses.date_from, expenses.date_to) {
        (None, None) => "all time".to_string(),
        (from, to) => format!(
            "{} .. {}",
            from.map(|d| d.to_string()).unwrap_or_default(),
            to.map(|d| d.to_string()).unwrap_or_default()
        ),
    };
    let _ = writeln!(
        out,
        "Expenses     {} over {} labels ({window}); today {} over {}",
        money(expenses.total_expense),
        expenses.labels_count,
        money(expenses.today_expense),
        expenses.today_labels
    );
    out
}

pub fn orders(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "No orders\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<16} {:>9} {:<8} {:<14} {:<9} {}",
        "ID", "CREATED", "AMOUNT", "PAYMENT", "SHIPPING", "REFUND", "ROUTE"
    );
    for order in orders {
        let refund = if order.is_refunded() {
            "refunded"
        } else if order.refund_available() {
            "available"
        } else {
            "-"
        };
        let _ = writeln!(
            out,
            "{:<10} {:<16} {:>9} {:<8} {:<14} {:<9} {} -> {}",
            order.short_id(),
            timestamp(order.created_at),
            money(order.amount),
            order.payment_status.as_str(),
            order.shipping_status,
            refund,
            order.address_from.city,
            order.address_to.city
        );
    }
    out
}

pub fn users(users: &[User]) -> String {
    if users.is_empty() {
        return "No users\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<20} {:>10} {:>8} {}",
        "TELEGRAM", "NAME", "BALANCE", "DISCOUNT", "STATUS"
    );
    for user in users {
        out.push_str(&user_row(user));
    }
    out
}

pub fn user_row(user: &User) -> String {
    let name = match &user.username {
        Some(username) => format!("{} (@{username})", user.first_name),
        None => user.first_name.clone(),
    };
    format!(
        "{:<12} {:<20} {:>10} {:>7}% {}\n",
        user.telegram_id.to_string(),
        name,
        money(user.balance),
        user.discount,
        if user.blocked { "blocked" } else { "active" }
    )
}

pub fn leaderboard(entries: &[LeaderboardEntry]) -> String {
    let mut out = String::new();
    for (rank, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {:<20} {:<10} score {:>6.1}  {} orders  {} spent",
            rank + 1,
            entry.first_name,
            entry.rating_level,
            entry.rating_score,
            entry.total_orders,
            money(entry.total_spent)
        );
    }
    out
}

pub fn overview(snapshot: &Snapshot, loaded_at: Option<DateTime<Utc>>) -> String {
    format!(
        "== Overview (loaded {}) ==\n{}\n== Orders ==\n{}\n== Users ==\n{}\n== Leaderboard ==\n{}",
        timestamp(loaded_at),
        stats(&snapshot.stats, &snapshot.expenses),
        orders(&snapshot.orders),
        users(&snapshot.users),
        leaderboard(&snapshot.leaderboard)
    )
}

pub fn order_created(created: &OrderCreated) -> String {
    let mut out = String::new();
    let id = created
        .order_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "Order {id}: {} {}",
        money(created.amount),
        created.currency.as_deref().unwrap_or("USD")
    );
    if let Some(url) = &created.payment_url {
        let _ = writeln!(out, "Payment link: {url}");
    }
    out
}

fn progress_bar(progress: u8, color: ProgressColor) -> String {
    let filled = usize::from(progress.min(100)) / 5;
    let label = match color {
        ProgressColor::Blue => "blue",
        ProgressColor::Orange => "orange",
        ProgressColor::Green => "green",
        ProgressColor::Red => "red",
        ProgressColor::Grey => "grey",
    };
    format!(
        "[{}{}] {progress}% ({label})",
        "#".repeat(filled),
        ".".repeat(20 - filled)
    )
}

pub fn tracking(info: &TrackingInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} via {}: {}",
        info.tracking_number, info.carrier, info.status_name
    );
    let _ = writeln!(out, "{}", progress_bar(info.progress, info.progress_color));
    if let Some(eta) = &info.estimated_delivery {
        let _ = writeln!(out, "Estimated delivery: {eta}");
    }
    // Newest event first on screen.
    for event in info.tracking_events.iter().rev() {
        let _ = writeln!(
            out,
            "  {}  {:<16} {}{}",
            timestamp(event.occurred_at),
            event.status,
            event.status_details.as_deref().unwrap_or(""),
            event
                .location
                .as_deref()
                .map(|location| format!(" [{location}]"))
                .unwrap_or_default()
        );
    }
    out
}

pub fn user_details(details: &UserDetails) -> String {
    let mut out = user_row(&details.user);
    let _ = writeln!(
        out,
        "Orders: {}  Balance: {}  Joined: {}",
        details.stats.total_orders,
        money(details.stats.balance),
        timestamp(details.user.created_at)
    );
    if !details.balance_history.is_empty() {
        let _ = writeln!(out, "Balance history:");
        for entry in &details.balance_history {
            let _ = writeln!(
                out,
                "  {}  {:>+10.2}  {}",
                timestamp(entry.timestamp),
                entry.amount,
                entry.description.as_deref().unwrap_or("")
            );
        }
    }
    if !details.recent_orders.is_empty() {
        let _ = writeln!(out, "Recent orders:");
        out.push_str(&orders(&details.recent_orders));
    }
    out
}

pub fn monitoring(snapshot: &MonitoringSnapshot, refreshed_at: Option<DateTime<Utc>>) -> String {
    let mut out = String::new();
    let health = &snapshot.health;
    let _ = writeln!(
        out,
        "== Bot {} (refreshed {}) ==",
        if health.is_healthy() { "healthy" } else { "UNHEALTHY" },
        timestamp(refreshed_at)
    );
    if let Some(username) = &health.bot_username {
        let _ = writeln!(out, "Bot: @{username}");
    }
    if let Some(message) = &health.message {
        let _ = writeln!(out, "Status: {message}");
    }

    let metrics = &snapshot.metrics;
    let count = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
    let _ = writeln!(
        out,
        "Users {}  Orders {}  Pending {}  Sessions {}",
        count(metrics.total_users),
        count(metrics.total_orders),
        count(metrics.pending_orders),
        count(metrics.active_sessions)
    );
    if let Some(revenue) = &metrics.revenue {
        let _ = writeln!(
            out,
            "Revenue {} (avg order {})",
            money(revenue.total),
            money(revenue.average_order)
        );
    }
    if let Some(users) = &metrics.users {
        let _ = writeln!(out, "Active today {}", users.active_today);
    }

    let _ = writeln!(out, "== Logs ==");
    for entry in &snapshot.logs {
        let mut message = entry.message.clone();
        if message.len() > MAX_LOG_MESSAGE {
            let mut cut = MAX_LOG_MESSAGE;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            message.push_str("...");
        }
        let _ = writeln!(
            out,
            "{:<7} {:<10} {} {}",
            entry.level,
            entry.category,
            entry.timestamp.as_deref().unwrap_or(""),
            message
        );
    }
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
