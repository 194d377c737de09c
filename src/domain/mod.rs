// src/domain/mod.rs
pub mod errors;
pub mod filter;
pub mod models;
pub mod repository;
pub mod statistics;

// Re-export common types for convenience
pub use errors::{
    ApiError, ApiResult, AppError, AppResult, ExportError, ExportResult, MutationError,
    MutationResult, PushError, PushResult,
};
pub use filter::{filter_trades, TradeFilters};
pub use models::{
    HealthState, OrderType, Position, SystemHealth, Trade, TradingSettings, TradingStatus,
};
pub use repository::TradingApi;
pub use statistics::{
    calculate_position_statistics, calculate_trade_statistics, PositionStatistics,
    TradeStatistics,
};
