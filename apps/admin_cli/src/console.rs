//! Single-key commands typed while the monitor screen is live.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKey {
    /// Enter alone, or `p`.
    ToggleAutoRefresh,
    Reload,
    Quit,
    Help,
}

pub const MONITOR_HELP: &str = "keys: [enter]/p toggle auto refresh, r reload now, q quit";

pub fn parse_monitor_key(line: &str) -> MonitorKey {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "p" | "pause" => MonitorKey::ToggleAutoRefresh,
        "r" | "reload" => MonitorKey::Reload,
        "q" | "quit" | "exit" => MonitorKey::Quit,
        _ => MonitorKey::Help,
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;
