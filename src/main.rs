// src/main.rs
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::time::Duration;

use fx_dashboard::application::cache::QueryCache;
use fx_dashboard::application::dashboard::{self, Dashboard};
use fx_dashboard::application::export::{export_trades, ExportFormat};
use fx_dashboard::application::mutations::TradingMutations;
use fx_dashboard::application::notifications::{
    Notification, NotificationCenter, NotificationLevel,
};
use fx_dashboard::application::queries::TradingQueries;
use fx_dashboard::application::realtime::{PushEvent, RealtimeBridge};
use fx_dashboard::application::store::ClientStore;
use fx_dashboard::config::Config;
use fx_dashboard::domain::errors::{AppError, AppResult};
use fx_dashboard::domain::filter::TradeFilters;
use fx_dashboard::domain::models::{OrderType, TradingSettings};
use fx_dashboard::domain::repository::TradingApi;
use fx_dashboard::infrastructure::http::HttpTradingApi;
use fx_dashboard::infrastructure::push::PushClient;

#[derive(Parser, Debug)]
#[command(name = "fx_dashboard", version, about = "Monitor and control the FX auto-trading backend")]
struct Cli {
    /// Load configuration from a JSON file instead of the environment
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live monitoring page (default)
    Monitor {
        /// Seconds between dashboard renders
        #[arg(long, default_value_t = 10)]
        every: u64,
    },
    /// Export trade history
    Export {
        /// csv or json
        format: String,
        /// Output file name, defaults to trades_YYYY-MM-DD.<ext>
        filename: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Start auto trading
    Start { symbol: String, timeframe: String },
    /// Stop auto trading
    Stop,
    /// Show or change trading settings
    Settings {
        /// key=value pairs to update
        updates: Vec<String>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    symbol: Option<String>,
    /// buy or sell
    #[arg(long = "type")]
    order_type: Option<String>,
    /// YYYY-MM-DD or RFC 3339
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    min_profit: Option<f64>,
    #[arg(long)]
    max_profit: Option<f64>,
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn to_filters(&self) -> AppResult<TradeFilters> {
        let mut filters = TradeFilters::new()
            .date_range(parse_time(self.from.as_deref(), false)?, parse_time(self.to.as_deref(), true)?)
            .profit_range(self.min_profit, self.max_profit);

        if let Some(symbol) = &self.symbol {
            filters = filters.symbol(symbol);
        }
        if let Some(order_type) = &self.order_type {
            filters = filters.order_type(parse_order_type(order_type)?);
        }
        if let Some(search) = &self.search {
            filters = filters.search(search);
        }
        Ok(filters)
    }
}

fn parse_order_type(value: &str) -> AppResult<OrderType> {
    match value.to_uppercase().as_str() {
        "BUY" => Ok(OrderType::Buy),
        "SELL" => Ok(OrderType::Sell),
        other => Err(AppError::Config(format!("Unknown order type: {}", other))),
    }
}

/// Plain dates cover the whole day: start of day for `from`, end of day for `to`
fn parse_time(value: Option<&str>, end_of_day: bool) -> AppResult<Option<DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(None);
    };

    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(time.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| AppError::Config(format!("Invalid date {}: {}", value, e)))?;
    let time = if end_of_day {
        date.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc()))
}

fn apply_setting(settings: &mut TradingSettings, update: &str) -> AppResult<()> {
    let (key, value) = update
        .split_once('=')
        .ok_or_else(|| AppError::Config(format!("Expected key=value, got {}", update)))?;
    let invalid = |e: &dyn std::fmt::Display| AppError::Config(format!("Invalid value for {}: {}", key, e));

    match key.trim() {
        "symbol" => settings.symbol = value.trim().to_uppercase(),
        "timeframe" => settings.timeframe = value.trim().to_uppercase(),
        "lot_size" => settings.lot_size = value.trim().parse().map_err(|e| invalid(&e))?,
        "stop_loss_pips" => settings.stop_loss_pips = value.trim().parse().map_err(|e| invalid(&e))?,
        "take_profit_pips" => {
            settings.take_profit_pips = value.trim().parse().map_err(|e| invalid(&e))?
        }
        "max_open_positions" => {
            settings.max_open_positions = value.trim().parse().map_err(|e| invalid(&e))?
        }
        "max_daily_loss" => settings.max_daily_loss = value.trim().parse().map_err(|e| invalid(&e))?,
        "auto_trading" => settings.auto_trading = value.trim().parse().map_err(|e| invalid(&e))?,
        other => return Err(AppError::Config(format!("Unknown setting: {}", other))),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting fx_dashboard v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using backend {}", config.api.base_url);

    let api: Arc<dyn TradingApi> = Arc::new(HttpTradingApi::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?);
    let cache = Arc::new(QueryCache::new());
    let notifications = Arc::new(NotificationCenter::new());
    let queries = Arc::new(TradingQueries::new(
        api.clone(),
        cache.clone(),
        notifications.clone(),
        config.query.clone(),
    ));
    let mutations = TradingMutations::new(api, cache.clone(), notifications.clone());

    match cli.command.unwrap_or(Command::Monitor { every: 10 }) {
        Command::Monitor { every } => {
            monitor(&config, queries, cache, notifications, every).await?
        }
        Command::Export {
            format,
            filename,
            filters,
        } => {
            let format: ExportFormat = format.parse()?;
            let filters = filters.to_filters()?;
            let state = queries.trades(&filters).await;
            let trades = state.data.ok_or_else(|| {
                state
                    .error
                    .map(AppError::from)
                    .unwrap_or_else(|| AppError::Unknown("No trade data".to_string()))
            })?;

            let path = export_trades(&trades, format, filename.as_deref(), &config.export.dir)?;
            log::info!("Saved {}", path.display());
        }
        Command::Start { symbol, timeframe } => {
            let status = mutations.start_trading(&symbol, &timeframe).await?;
            log::info!("Trading: {}", status);
        }
        Command::Stop => {
            let status = mutations.stop_trading().await?;
            log::info!("Trading: {}", status);
        }
        Command::Settings { updates } => {
            let state = queries.settings().await;
            let current = match (state.data, state.error) {
                (Some(settings), _) => settings,
                (None, Some(e)) => return Err(e.into()),
                (None, None) => return Err(AppError::Unknown("No settings data".to_string())),
            };

            if updates.is_empty() {
                dashboard::render_settings(&current);
            } else {
                let mut settings = current.as_ref().clone();
                for update in &updates {
                    apply_setting(&mut settings, update)?;
                }
                let saved = mutations.update_settings(&settings).await?;
                dashboard::render_settings(&saved);
            }
        }
    }

    Ok(())
}

async fn monitor(
    config: &Config,
    queries: Arc<TradingQueries>,
    cache: Arc<QueryCache>,
    notifications: Arc<NotificationCenter>,
    every: u64,
) -> AppResult<()> {
    let store = Arc::new(ClientStore::new());
    let bridge = RealtimeBridge::new(cache, store.clone());

    // Trade events are announced the way mutations are
    let events = notifications.clone();
    let _trade_feed = bridge.subscribe(move |event| {
        if let PushEvent::TradeUpdate(trade) = event {
            events.push(Notification::new(
                NotificationLevel::Info,
                "Trade update",
                &format!("{} {} {}", trade.symbol, trade.order_type, trade.id),
            ));
        }
    });

    log::info!("Connecting push channel {}", config.api.ws_url);
    let push = PushClient::new(
        &config.api.ws_url,
        bridge.clone(),
        Duration::from_secs(config.api.reconnect_delay_secs.max(1)),
    )
    .spawn();

    let polling = queries.spawn_polling();
    let view = Dashboard::new(queries, store, notifications);

    let render_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every.max(1)));
        loop {
            interval.tick().await;
            let snapshot = view.snapshot().await;
            dashboard::render(&snapshot);
        }
    });

    // Wait for shutdown signal
    log::info!("Dashboard is running. Press Ctrl+C to stop.");
    ctrl_c()
        .await
        .map_err(|e| AppError::Unknown(format!("Failed to listen for control-c event: {}", e)))?;

    // Shutdown
    log::info!("Shutting down...");
    render_loop.abort();
    push.abort();
    polling.stop();

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
