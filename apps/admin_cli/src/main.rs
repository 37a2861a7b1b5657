mod config;
mod console;
mod render;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use admin_core::{
    AddressDraft, AutoRefresh, BackendApi, Dashboard, DashboardEvent, DashboardState, HttpBackend,
    Monitor, MonitoringState, OrderDraft, ParcelDraft,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use shared::domain::{PaymentStatus, TelegramId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, Mutex},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::{load_settings, Settings};
use console::{parse_monitor_key, MonitorKey, MONITOR_HELP};

#[derive(Parser, Debug)]
#[command(name = "shipbot-admin", about = "Admin console for the shipping bot backend")]
struct Cli {
    /// Settings file; defaults to ./admin.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    admin_key: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    download_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BalanceAction {
    Add,
    Deduct,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Dashboard(DashboardCommand),
    /// Bot health, logs and metrics; refreshes until interrupted.
    Monitor {
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        log_limit: Option<u32>,
        #[arg(long)]
        no_auto_refresh: bool,
        #[arg(long)]
        once: bool,
    },
    RestartBot,
}

#[derive(Subcommand, Debug)]
enum DashboardCommand {
    /// Stats, orders, users, leaderboard and expenses in one view.
    Overview {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        status: Option<PaymentStatus>,
    },
    Balance {
        action: BalanceAction,
        telegram_id: i64,
        amount: String,
    },
    Discount {
        telegram_id: i64,
        percent: String,
    },
    /// Create an order for a user; the bot sends them the payment link.
    CreateOrder(CreateOrderArgs),
    Refund {
        order_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Block {
        telegram_id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    Unblock {
        telegram_id: i64,
    },
    /// Download the order list as CSV.
    Export {
        #[arg(long)]
        status: Option<PaymentStatus>,
    },
    /// Download a shipping label PDF.
    Label {
        label_id: String,
    },
    Track {
        tracking_number: String,
        carrier: String,
    },
    User {
        telegram_id: i64,
    },
}

#[derive(Args, Debug)]
struct CreateOrderArgs {
    #[arg(long)]
    telegram_id: String,
    #[arg(long)]
    amount: String,
    #[arg(long)]
    from_name: String,
    #[arg(long)]
    from_street: String,
    #[arg(long)]
    from_street2: Option<String>,
    #[arg(long)]
    from_city: String,
    #[arg(long)]
    from_state: String,
    #[arg(long)]
    from_zip: String,
    #[arg(long, default_value = "US")]
    from_country: String,
    #[arg(long)]
    from_phone: Option<String>,
    #[arg(long)]
    from_email: Option<String>,
    #[arg(long)]
    to_name: String,
    #[arg(long)]
    to_street: String,
    #[arg(long)]
    to_street2: Option<String>,
    #[arg(long)]
    to_city: String,
    #[arg(long)]
    to_state: String,
    #[arg(long)]
    to_zip: String,
    #[arg(long, default_value = "US")]
    to_country: String,
    #[arg(long)]
    to_phone: Option<String>,
    #[arg(long)]
    to_email: Option<String>,
    #[arg(long, default_value = "5")]
    length: String,
    #[arg(long, default_value = "5")]
    width: String,
    #[arg(long, default_value = "5")]
    height: String,
    #[arg(long, default_value = "2")]
    weight: String,
    #[arg(long)]
    distance_unit: Option<String>,
    #[arg(long)]
    mass_unit: Option<String>,
}

impl From<CreateOrderArgs> for OrderDraft {
    fn from(args: CreateOrderArgs) -> Self {
        Self {
            telegram_id: args.telegram_id,
            amount: args.amount,
            address_from: AddressDraft {
                name: args.from_name,
                street1: args.from_street,
                street2: args.from_street2,
                city: args.from_city,
                state: args.from_state,
                zip: args.from_zip,
                country: args.from_country,
                phone: args.from_phone,
                email: args.from_email,
            },
            address_to: AddressDraft {
                name: args.to_name,
                street1: args.to_street,
                street2: args.to_street2,
                city: args.to_city,
                state: args.to_state,
                zip: args.to_zip,
                country: args.to_country,
                phone: args.to_phone,
                email: args.to_email,
            },
            parcel: ParcelDraft {
                length: args.length,
                width: args.width,
                height: args.height,
                weight: args.weight,
                distance_unit: args.distance_unit,
                mass_unit: args.mass_unit,
            },
        }
    }
}

fn apply_flags(settings: &mut Settings, cli: &Cli) {
    if let Some(v) = &cli.backend_url {
        settings.backend_url = v.clone();
    }
    if let Some(v) = &cli.admin_key {
        settings.admin_key = Some(v.clone());
    }
    if let Some(v) = cli.timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = &cli.download_dir {
        settings.download_dir = v.clone();
    }
    if let Command::Monitor {
        interval_secs,
        log_limit,
        ..
    } = &cli.command
    {
        if let Some(v) = interval_secs {
            settings.refresh_interval_secs = *v;
        }
        if let Some(v) = log_limit {
            settings.log_limit = *v;
        }
    }
}

fn print_notices(events: &mut broadcast::Receiver<DashboardEvent>) {
    while let Ok(event) = events.try_recv() {
        if let DashboardEvent::Notice(notification) = event {
            println!("{}", render::notice(&notification));
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    apply_flags(&mut settings, &cli);
    settings.validate()?;
    info!(backend_url = %settings.backend_url, "admin console starting");

    let api: Arc<dyn BackendApi> = Arc::new(
        HttpBackend::with_timeout(&settings.backend_url, settings.request_timeout())
            .context("failed to set up backend client")?,
    );

    let outcome = match cli.command {
        Command::Monitor {
            no_auto_refresh,
            once,
            ..
        } => run_monitor(api, &settings, !no_auto_refresh, once).await,
        Command::RestartBot => restart_bot(api, &settings).await,
        Command::Dashboard(command) => run_dashboard(api, &settings, command).await,
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            // The notification already told the operator what went wrong.
            debug!(error = ?err, "command failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_dashboard(
    api: Arc<dyn BackendApi>,
    settings: &Settings,
    command: DashboardCommand,
) -> Result<()> {
    let dashboard = Dashboard::new(api);
    let mut events = dashboard.subscribe();
    let mut state = DashboardState::new();

    let result = dispatch(&dashboard, &mut state, settings, command).await;
    print_notices(&mut events);
    result
}

async fn dispatch(
    dashboard: &Dashboard,
    state: &mut DashboardState,
    settings: &Settings,
    command: DashboardCommand,
) -> Result<()> {
    let dir = settings.download_dir.as_path();
    match command {
        DashboardCommand::Overview { from, to } => {
            if from.is_some() || to.is_some() {
                dashboard
                    .set_expense_range(state, from.as_deref(), to.as_deref())
                    .await?;
            } else {
                dashboard.load(state).await?;
            }
            print!("{}", render::overview(state.snapshot(), state.loaded_at()));
        }
        DashboardCommand::Search { query, status } => {
            dashboard.search(state, &query, status).await?;
            print!("{}", render::orders(&state.snapshot().orders));
        }
        DashboardCommand::Balance {
            action,
            telegram_id,
            amount,
        } => {
            let telegram_id = TelegramId(telegram_id);
            match action {
                BalanceAction::Add => dashboard.add_balance(state, telegram_id, &amount).await?,
                BalanceAction::Deduct => {
                    dashboard.deduct_balance(state, telegram_id, &amount).await?
                }
            }
            print_user(state, telegram_id);
        }
        DashboardCommand::Discount {
            telegram_id,
            percent,
        } => {
            let telegram_id = TelegramId(telegram_id);
            dashboard.set_discount(state, telegram_id, &percent).await?;
            print_user(state, telegram_id);
        }
        DashboardCommand::CreateOrder(args) => {
            let created = dashboard.create_order(state, &args.into()).await?;
            print!("{}", render::order_created(&created));
        }
        DashboardCommand::Refund { order_id, reason } => {
            // The refund guard needs the current order list.
            dashboard.load(state).await?;
            dashboard.refund(state, &order_id, reason.as_deref()).await?;
        }
        DashboardCommand::Block {
            telegram_id,
            reason,
        } => {
            let telegram_id = TelegramId(telegram_id);
            dashboard
                .block_user(state, telegram_id, reason.as_deref())
                .await?;
            print_user(state, telegram_id);
        }
        DashboardCommand::Unblock { telegram_id } => {
            let telegram_id = TelegramId(telegram_id);
            dashboard.unblock_user(state, telegram_id).await?;
            print_user(state, telegram_id);
        }
        DashboardCommand::Export { status } => {
            dashboard.export_orders(status, dir).await?;
        }
        DashboardCommand::Label { label_id } => {
            dashboard.download_label(&label_id, dir).await?;
        }
        DashboardCommand::Track {
            tracking_number,
            carrier,
        } => {
            let info = dashboard.track(&tracking_number, &carrier).await?;
            print!("{}", render::tracking(&info));
        }
        DashboardCommand::User { telegram_id } => {
            let details = dashboard.user_details(TelegramId(telegram_id)).await?;
            print!("{}", render::user_details(&details));
        }
    }
    Ok(())
}

fn print_user(state: &DashboardState, telegram_id: TelegramId) {
    if let Some(user) = state.find_user(telegram_id) {
        print!("{}", render::user_row(user));
    }
}

fn monitor_for(api: Arc<dyn BackendApi>, settings: &Settings) -> Monitor {
    Monitor::new(api)
        .with_log_limit(settings.log_limit)
        .with_restart_settle(settings.restart_settle())
}

async fn restart_bot(api: Arc<dyn BackendApi>, settings: &Settings) -> Result<()> {
    let monitor = monitor_for(api, settings);
    let mut events = monitor.subscribe();
    let mut state = MonitoringState::new();

    let admin_key = settings.admin_key.as_deref().unwrap_or_default();
    let result = monitor.restart_bot(&mut state, admin_key).await;
    print_notices(&mut events);
    result?;
    if let Some(snapshot) = state.snapshot() {
        print!("{}", render::monitoring(snapshot, state.refreshed_at()));
    }
    Ok(())
}

async fn run_monitor(
    api: Arc<dyn BackendApi>,
    settings: &Settings,
    auto_refresh: bool,
    once: bool,
) -> Result<()> {
    let monitor = Arc::new(monitor_for(api, settings));
    let mut events = monitor.subscribe();
    let state = Arc::new(Mutex::new(MonitoringState::new()));

    {
        let mut guard = state.lock().await;
        let initial = monitor.load(&mut guard).await;
        print_notices(&mut events);
        if let Some(snapshot) = guard.snapshot() {
            print!("{}", render::monitoring(snapshot, guard.refreshed_at()));
        }
        if once {
            return initial.map_err(Into::into);
        }
    }

    let refresh = AutoRefresh::start(
        Arc::clone(&monitor),
        Arc::clone(&state),
        settings.refresh_interval(),
        auto_refresh,
    );
    info!(
        interval_secs = settings.refresh_interval().as_secs(),
        enabled = refresh.is_enabled(),
        "monitoring; press ctrl-c to stop"
    );
    println!("{MONITOR_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_monitor_key(&line) {
                    MonitorKey::ToggleAutoRefresh => {
                        let enabled = refresh.toggle();
                        println!("auto refresh {}", if enabled { "on" } else { "paused" });
                    }
                    MonitorKey::Reload => {
                        let mut guard = state.lock().await;
                        if let Err(err) = monitor.load(&mut guard).await {
                            debug!(error = %err, "manual reload failed");
                        }
                    }
                    MonitorKey::Quit => break,
                    MonitorKey::Help => println!("{MONITOR_HELP}"),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    debug!(error = %err, "stopped reading keys");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Ok(DashboardEvent::MonitoringReplaced) => {
                    let guard = state.lock().await;
                    if let Some(snapshot) = guard.snapshot() {
                        print!("{}", render::monitoring(snapshot, guard.refreshed_at()));
                    }
                }
                Ok(DashboardEvent::Notice(notification)) => {
                    println!("{}", render::notice(&notification));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "monitor display fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    refresh.stop();
    Ok(())
}
