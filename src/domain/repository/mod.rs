// src/domain/repository/mod.rs
// Repository interfaces for the trading backend

use async_trait::async_trait;
use crate::domain::errors::ApiResult;
use crate::domain::filter::TradeFilters;
use crate::domain::models::{Position, SystemHealth, Trade, TradingSettings, TradingStatus};

/// Backend operations consumed by the dashboard
#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn list_trades(&self, filters: &TradeFilters) -> ApiResult<Vec<Trade>>;
    async fn get_trade(&self, id: &str) -> ApiResult<Trade>;
    async fn list_positions(&self) -> ApiResult<Vec<Position>>;
    async fn get_trading_status(&self) -> ApiResult<TradingStatus>;
    async fn start_trading(&self, symbol: &str, timeframe: &str) -> ApiResult<TradingStatus>;
    async fn stop_trading(&self) -> ApiResult<TradingStatus>;
    async fn get_settings(&self) -> ApiResult<TradingSettings>;
    async fn update_settings(&self, settings: &TradingSettings) -> ApiResult<TradingSettings>;
    async fn get_health(&self) -> ApiResult<SystemHealth>;
}
