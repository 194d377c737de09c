// src/application/dashboard.rs
// Monitoring view: health, status, exposure, performance and alerts

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

use crate::application::notifications::{Notification, NotificationCenter};
use crate::application::queries::TradingQueries;
use crate::application::store::ClientStore;
use crate::domain::filter::{filter_trades, TradeFilters};
use crate::domain::models::{
    HealthState, Position, SystemHealth, Trade, TradingSettings, TradingStatus,
};
use crate::domain::statistics::{
    calculate_trade_statistics, format_currency, format_percent, format_profit_factor,
    PositionStatistics, TradeStatistics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
}

impl Alert {
    fn warning(message: String) -> Self {
        Self {
            severity: AlertSeverity::Warning,
            message,
        }
    }

    fn critical(message: String) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            message,
        }
    }
}

/// Inputs the alert rules look at
pub struct AlertInputs<'a> {
    pub health: Option<&'a SystemHealth>,
    pub settings: Option<&'a TradingSettings>,
    pub today: &'a TradeStatistics,
    pub positions: &'a PositionStatistics,
    pub push_connected: bool,
}

/// Derive alerts, most severe first
pub fn derive_alerts(inputs: &AlertInputs) -> Vec<Alert> {
    let mut alerts = Vec::new();

    match inputs.health {
        None => alerts.push(Alert::critical("Backend health is unavailable".to_string())),
        Some(health) => {
            match health.status {
                HealthState::Down => {
                    alerts.push(Alert::critical("Trading backend is down".to_string()))
                }
                HealthState::Degraded => {
                    alerts.push(Alert::warning("Trading backend is degraded".to_string()))
                }
                HealthState::Healthy => {}
            }
            if !health.broker_connected {
                alerts.push(Alert::critical("Broker connection lost".to_string()));
            }
            alerts.extend(health.messages.iter().map(|m| Alert::warning(m.clone())));
        }
    }

    if !inputs.push_connected {
        alerts.push(Alert::warning(
            "Realtime updates disconnected, data refreshes by polling only".to_string(),
        ));
    }

    if let Some(settings) = inputs.settings {
        if settings.max_daily_loss > 0.0 && -inputs.today.net_profit >= settings.max_daily_loss {
            alerts.push(Alert::critical(format!(
                "Daily loss {} reached the limit of {}",
                format_currency(inputs.today.net_profit),
                format_currency(-settings.max_daily_loss)
            )));
        }

        if inputs.positions.total_positions > settings.max_open_positions {
            alerts.push(Alert::warning(format!(
                "{} open positions exceed the limit of {}",
                inputs.positions.total_positions, settings.max_open_positions
            )));
        }
    }

    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    alerts
}

/// Trades entered since the start of the UTC day of `now`
pub fn todays_trades(trades: &[Trade], now: DateTime<Utc>) -> Vec<Trade> {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now - Duration::days(1));
    filter_trades(trades, &TradeFilters::new().date_range(Some(start), Some(now)))
}

#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub taken_at: DateTime<Utc>,
    pub health: Option<Arc<SystemHealth>>,
    pub status: Option<Arc<TradingStatus>>,
    pub settings: Option<Arc<TradingSettings>>,
    pub open_positions: Arc<Vec<Position>>,
    pub positions: PositionStatistics,
    pub performance: TradeStatistics,
    pub today: TradeStatistics,
    pub alerts: Vec<Alert>,
    pub notifications: Vec<Notification>,
}

pub struct Dashboard {
    queries: Arc<TradingQueries>,
    store: Arc<ClientStore>,
    notifications: Arc<NotificationCenter>,
}

impl Dashboard {
    pub fn new(
        queries: Arc<TradingQueries>,
        store: Arc<ClientStore>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            queries,
            store,
            notifications,
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let all_trades = TradeFilters::default();
        let health = self.queries.health().await.data;
        let status = self.queries.trading_status().await.data;
        let settings = self.queries.settings().await.data;
        let trades = self.queries.trades(&all_trades).await.data;
        let open_positions = self.queries.positions().await.data.unwrap_or_default();

        let now = Utc::now();
        let today = trades
            .as_deref()
            .map(|t| todays_trades(t, now))
            .unwrap_or_default();
        let today_stats = calculate_trade_statistics(Some(today.as_slice()));
        let position_stats = self.queries.position_statistics();

        let alerts = derive_alerts(&AlertInputs {
            health: health.as_deref(),
            settings: settings.as_deref(),
            today: &today_stats,
            positions: &position_stats,
            push_connected: self.store.is_push_connected(),
        });

        DashboardSnapshot {
            taken_at: now,
            health,
            status,
            settings,
            open_positions,
            positions: position_stats,
            performance: self.queries.trade_statistics(&all_trades),
            today: today_stats,
            alerts,
            notifications: self.notifications.recent(5),
        }
    }
}

/// Log the monitoring page
pub fn render(snapshot: &DashboardSnapshot) {
    match &snapshot.health {
        Some(health) => log::info!(
            "=== System: {} | broker {} | uptime {}s ===",
            health.status,
            if health.broker_connected { "connected" } else { "disconnected" },
            health.uptime_seconds
        ),
        None => log::info!("=== System: unknown ==="),
    }

    match &snapshot.status {
        Some(status) => log::info!("Trading: {}", status),
        None => log::info!("Trading: unknown"),
    }

    let p = &snapshot.positions;
    log::info!(
        "Positions: {} open ({} buy / {} sell), volume {}, P&L {} (avg {}), {} in profit",
        p.total_positions,
        p.buy_positions,
        p.sell_positions,
        p.total_volume,
        format_currency(p.total_profit),
        format_currency(p.avg_profit),
        p.profitable_positions
    );
    for position in snapshot.open_positions.iter() {
        log::info!(
            "  {}: {} {} @ {}, P&L: {}",
            position.symbol,
            position.position_type,
            position.volume,
            position.open_price,
            format_currency(position.profit)
        );
    }

    let s = &snapshot.performance;
    log::info!(
        "Performance: {} trades, win rate {}, net {}, profit factor {}, largest win {}, largest loss {}",
        s.total_trades,
        format_percent(s.win_rate),
        format_currency(s.net_profit),
        format_profit_factor(s.profit_factor),
        format_currency(s.largest_win),
        format_currency(s.largest_loss)
    );
    log::info!(
        "Today: {} trades, net {}",
        snapshot.today.total_trades,
        format_currency(snapshot.today.net_profit)
    );

    for alert in &snapshot.alerts {
        match alert.severity {
            AlertSeverity::Critical => log::error!("[{}] {}", alert.severity, alert.message),
            AlertSeverity::Warning => log::warn!("[{}] {}", alert.severity, alert.message),
        }
    }
}

/// Log the settings screen
pub fn render_settings(settings: &TradingSettings) {
    log::info!("=== Trading settings ===");
    log::info!("symbol:             {}", settings.symbol);
    log::info!("timeframe:          {}", settings.timeframe);
    log::info!("lot_size:           {}", settings.lot_size);
    log::info!("stop_loss_pips:     {}", settings.stop_loss_pips);
    log::info!("take_profit_pips:   {}", settings.take_profit_pips);
    log::info!("max_open_positions: {}", settings.max_open_positions);
    log::info!("max_daily_loss:     {}", format_currency(settings.max_daily_loss));
    log::info!("auto_trading:       {}", settings.auto_trading);
}
