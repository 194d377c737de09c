// src/application/queries.rs
// Cached, retried and polled reads of trading data

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::application::cache::{Cacheable, CachedValue, QueryCache, QueryKey, QueryKind};
use crate::application::notifications::{Notification, NotificationCenter};
use crate::config::QueryConfig;
use crate::domain::errors::{ApiError, ApiResult};
use crate::domain::filter::{filter_trades, TradeFilters};
use crate::domain::models::{Position, SystemHealth, Trade, TradingSettings, TradingStatus};
use crate::domain::repository::TradingApi;
use crate::domain::statistics::{
    calculate_position_statistics, calculate_trade_statistics, PositionStatistics,
    TradeStatistics,
};

/// Result of a read. On failure the last known data is kept.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ApiError>,
    pub is_stale: bool,
}

impl<T> QueryState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// Statistics are recomputed only when the cached collection changes identity
struct Memo<S, R> {
    inner: Mutex<Option<(Arc<S>, R)>>,
}

impl<S, R: Copy> Memo<S, R> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn get_or_compute<F: FnOnce(&S) -> R>(&self, source: &Arc<S>, compute: F) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_source, result)) = inner.as_ref() {
            if Arc::ptr_eq(cached_source, source) {
                return *result;
            }
        }

        let result = compute(source);
        *inner = Some((source.clone(), result));
        result
    }
}

pub struct TradingQueries {
    api: Arc<dyn TradingApi>,
    cache: Arc<QueryCache>,
    notifications: Arc<NotificationCenter>,
    config: QueryConfig,
    trade_stats: Memo<Vec<Trade>, TradeStatistics>,
    position_stats: Memo<Vec<Position>, PositionStatistics>,
}

impl TradingQueries {
    pub fn new(
        api: Arc<dyn TradingApi>,
        cache: Arc<QueryCache>,
        notifications: Arc<NotificationCenter>,
        config: QueryConfig,
    ) -> Self {
        Self {
            api,
            cache,
            notifications,
            config,
            trade_stats: Memo::new(),
            position_stats: Memo::new(),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub async fn trades(&self, filters: &TradeFilters) -> QueryState<Vec<Trade>> {
        self.query(QueryKey::Trades(filters.clone()), false).await
    }

    pub async fn trade(&self, id: &str) -> QueryState<Trade> {
        self.query(QueryKey::Trade(id.to_string()), false).await
    }

    pub async fn positions(&self) -> QueryState<Vec<Position>> {
        self.query(QueryKey::Positions, false).await
    }

    pub async fn trading_status(&self) -> QueryState<TradingStatus> {
        self.query(QueryKey::TradingStatus, false).await
    }

    pub async fn settings(&self) -> QueryState<TradingSettings> {
        self.query(QueryKey::Settings, false).await
    }

    pub async fn health(&self) -> QueryState<SystemHealth> {
        self.query(QueryKey::Health, false).await
    }

    /// Statistics over the cached trade list for these filters
    pub fn trade_statistics(&self, filters: &TradeFilters) -> TradeStatistics {
        match self.cache.get::<Vec<Trade>>(&QueryKey::Trades(filters.clone())) {
            Some(cached) => self
                .trade_stats
                .get_or_compute(&cached.value, |trades| {
                    calculate_trade_statistics(Some(trades.as_slice()))
                }),
            None => calculate_trade_statistics(None),
        }
    }

    pub fn position_statistics(&self) -> PositionStatistics {
        match self.cache.get::<Vec<Position>>(&QueryKey::Positions) {
            Some(cached) => self
                .position_stats
                .get_or_compute(&cached.value, |positions| {
                    calculate_position_statistics(positions)
                }),
            None => calculate_position_statistics(&[]),
        }
    }

    /// Refetch a key regardless of freshness
    pub async fn refresh(&self, key: QueryKey) -> ApiResult<()> {
        let label = describe(&key);
        self.cache
            .fetch(key.clone(), true, || self.load_with_retry(&key))
            .await
            .map(|_| ())
            .map_err(|e| {
                self.notifications
                    .push(Notification::from_api_error(&format!("Failed to load {}", label), &e));
                e
            })
    }

    /// Start one polling task per data kind. Dropping the handle stops them.
    pub fn spawn_polling(self: &Arc<Self>) -> PollingHandle {
        let plan = [
            (QueryKind::TradingStatus, self.config.status_interval()),
            (QueryKind::Positions, self.config.positions_interval()),
            (QueryKind::Trades, self.config.trades_interval()),
            (QueryKind::Health, self.config.health_interval()),
        ];

        let tasks = plan
            .into_iter()
            .map(|(kind, period)| {
                let queries = Arc::clone(self);
                log::info!("Polling {:?} every {:?}", kind, period);

                tokio::spawn(async move {
                    let mut timer = tokio::time::interval(period);
                    loop {
                        timer.tick().await;
                        for key in queries.poll_keys(kind) {
                            if let Err(e) = queries.refresh(key).await {
                                log::warn!("Polling {:?} failed: {}", kind, e);
                            }
                        }
                    }
                })
            })
            .collect();

        PollingHandle { tasks }
    }

    fn poll_keys(&self, kind: QueryKind) -> Vec<QueryKey> {
        match kind {
            QueryKind::Trades => {
                let keys = self.cache.keys_of_kind(QueryKind::Trades);
                if keys.is_empty() {
                    vec![QueryKey::Trades(TradeFilters::default())]
                } else {
                    keys
                }
            }
            QueryKind::Positions => vec![QueryKey::Positions],
            QueryKind::TradingStatus => vec![QueryKey::TradingStatus],
            QueryKind::Health => vec![QueryKey::Health],
            other => self.cache.keys_of_kind(other),
        }
    }

    async fn query<T: Cacheable>(&self, key: QueryKey, force: bool) -> QueryState<T> {
        let result = self
            .cache
            .fetch(key.clone(), force, || self.load_with_retry(&key))
            .await;

        match result {
            Ok(value) => QueryState {
                data: T::extract(&value),
                error: None,
                is_stale: false,
            },
            Err(error) => {
                self.notifications.push(Notification::from_api_error(
                    &format!("Failed to load {}", describe(&key)),
                    &error,
                ));

                // Stale-while-error: keep whatever we had
                let previous = self.cache.get::<T>(&key);
                QueryState {
                    data: previous.map(|c| c.value),
                    error: Some(error),
                    is_stale: true,
                }
            }
        }
    }

    async fn load_with_retry(&self, key: &QueryKey) -> ApiResult<CachedValue> {
        let mut delay = self.config.retry_delay();
        let mut attempt = 0;

        loop {
            match self.load(key).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.retries && is_retryable(&e) => {
                    attempt += 1;
                    log::debug!(
                        "Fetching {:?} failed ({}), retry {}/{}",
                        key,
                        e,
                        attempt,
                        self.config.retries
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load(&self, key: &QueryKey) -> ApiResult<CachedValue> {
        let value = match key {
            QueryKey::Trades(filters) => {
                let trades = self.api.list_trades(filters).await?;
                CachedValue::Trades(Arc::new(filter_trades(&trades, filters)))
            }
            QueryKey::Trade(id) => CachedValue::Trade(Arc::new(self.api.get_trade(id).await?)),
            QueryKey::Positions => {
                CachedValue::Positions(Arc::new(self.api.list_positions().await?))
            }
            QueryKey::TradingStatus => {
                CachedValue::TradingStatus(Arc::new(self.api.get_trading_status().await?))
            }
            QueryKey::Settings => CachedValue::Settings(Arc::new(self.api.get_settings().await?)),
            QueryKey::Health => CachedValue::Health(Arc::new(self.api.get_health().await?)),
        };

        Ok(value)
    }
}

/// Client errors will not change on retry
fn is_retryable(error: &ApiError) -> bool {
    match error {
        ApiError::Http { status, .. } => *status >= 500 || *status == 429,
        ApiError::InvalidRequest(_) | ApiError::Decode(_) => false,
        ApiError::Network(_) | ApiError::Timeout(_) => true,
    }
}

fn describe(key: &QueryKey) -> &'static str {
    match key.kind() {
        QueryKind::Trades => "trades",
        QueryKind::Trade => "trade",
        QueryKind::Positions => "positions",
        QueryKind::TradingStatus => "trading status",
        QueryKind::Settings => "settings",
        QueryKind::Health => "system health",
    }
}

/// Owns the polling tasks
pub struct PollingHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl PollingHandle {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::models::{HealthState, OrderType};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory backend with switchable failures
    pub(crate) struct FakeApi {
        pub trades: Mutex<Vec<Trade>>,
        pub positions: Mutex<Vec<Position>>,
        pub status: Mutex<TradingStatus>,
        pub settings: Mutex<TradingSettings>,
        pub fail_with: Mutex<Option<ApiError>>,
        pub calls: AtomicUsize,
        pub active: AtomicBool,
        pub status_delay: Mutex<std::time::Duration>,
    }

    impl FakeApi {
        pub(crate) fn new() -> Self {
            Self {
                trades: Mutex::new(sample_trades()),
                positions: Mutex::new(Vec::new()),
                status: Mutex::new(TradingStatus {
                    is_active: false,
                    symbol: None,
                    timeframe: None,
                    last_update: None,
                }),
                settings: Mutex::new(TradingSettings::default()),
                fail_with: Mutex::new(None),
                calls: AtomicUsize::new(0),
                active: AtomicBool::new(false),
                status_delay: Mutex::new(std::time::Duration::ZERO),
            }
        }

        pub(crate) fn fail(&self, error: Option<ApiError>) {
            *self.fail_with.lock().unwrap() = error;
        }

        fn check(&self) -> ApiResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    pub(crate) fn sample_trades() -> Vec<Trade> {
        let make = |id: &str, symbol: &str, pnl: Option<f64>| Trade {
            id: id.to_string(),
            symbol: symbol.to_string(),
            order_type: OrderType::Buy,
            entry_time: Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
            entry_price: 1.08,
            exit_time: None,
            exit_price: None,
            volume: 0.5,
            profit_loss: pnl,
            commission: Some(1.2),
            comment: None,
        };

        vec![
            make("t1", "EURUSD", Some(100.0)),
            make("t2", "EURUSD", Some(-50.0)),
            make("t3", "GBPUSD", Some(30.0)),
            make("t4", "EURUSD", None),
        ]
    }

    #[async_trait]
    impl TradingApi for FakeApi {
        async fn list_trades(&self, _filters: &TradeFilters) -> ApiResult<Vec<Trade>> {
            self.check()?;
            Ok(self.trades.lock().unwrap().clone())
        }

        async fn get_trade(&self, id: &str) -> ApiResult<Trade> {
            self.check()?;
            self.trades
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or(ApiError::Http {
                    status: 404,
                    message: Some("Trade not found".to_string()),
                })
        }

        async fn list_positions(&self) -> ApiResult<Vec<Position>> {
            self.check()?;
            Ok(self.positions.lock().unwrap().clone())
        }

        async fn get_trading_status(&self) -> ApiResult<TradingStatus> {
            self.check()?;
            // Read first, answer later: a slow response reflects the old state
            let status = self.status.lock().unwrap().clone();
            let delay = *self.status_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            Ok(status)
        }

        async fn start_trading(&self, symbol: &str, timeframe: &str) -> ApiResult<TradingStatus> {
            self.check()?;
            self.active.store(true, Ordering::SeqCst);
            let status = TradingStatus {
                is_active: true,
                symbol: Some(symbol.to_string()),
                timeframe: Some(timeframe.to_string()),
                last_update: None,
            };
            *self.status.lock().unwrap() = status.clone();
            Ok(status)
        }

        async fn stop_trading(&self) -> ApiResult<TradingStatus> {
            self.check()?;
            self.active.store(false, Ordering::SeqCst);
            let mut status = self.status.lock().unwrap();
            status.is_active = false;
            Ok(status.clone())
        }

        async fn get_settings(&self) -> ApiResult<TradingSettings> {
            self.check()?;
            Ok(self.settings.lock().unwrap().clone())
        }

        async fn update_settings(&self, settings: &TradingSettings) -> ApiResult<TradingSettings> {
            self.check()?;
            *self.settings.lock().unwrap() = settings.clone();
            Ok(settings.clone())
        }

        async fn get_health(&self) -> ApiResult<SystemHealth> {
            self.check()?;
            Ok(SystemHealth {
                status: HealthState::Healthy,
                uptime_seconds: 3600,
                broker_connected: true,
                last_heartbeat: None,
                messages: Vec::new(),
            })
        }
    }

    fn quick_config() -> QueryConfig {
        QueryConfig {
            retries: 2,
            retry_delay_ms: 1,
            ..QueryConfig::default()
        }
    }

    fn setup() -> (Arc<FakeApi>, TradingQueries, Arc<NotificationCenter>) {
        let api = Arc::new(FakeApi::new());
        let notifications = Arc::new(NotificationCenter::new());
        let queries = TradingQueries::new(
            api.clone(),
            Arc::new(QueryCache::new()),
            notifications.clone(),
            quick_config(),
        );
        (api, queries, notifications)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (api, queries, _) = setup();

        let first = queries.trades(&TradeFilters::new()).await;
        let second = queries.trades(&TradeFilters::new()).await;

        assert_eq!(first.data.unwrap().len(), 4);
        assert!(second.error.is_none());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filters_are_applied_to_backend_results() {
        let (_, queries, _) = setup();
        let state = queries.trades(&TradeFilters::new().symbol("GBPUSD")).await;
        let trades = state.data.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, "t3");
    }

    #[tokio::test]
    async fn network_failures_are_retried() {
        let (api, queries, notifications) = setup();
        api.fail(Some(ApiError::Network("down".to_string())));

        let state = queries.positions().await;
        assert!(state.is_error());
        assert!(state.data.is_none());
        // One attempt plus two retries
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);

        let recent = notifications.recent(1);
        assert_eq!(recent[0].title, "Failed to load positions");
        assert_eq!(recent[0].message, crate::domain::errors::GENERIC_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (api, queries, notifications) = setup();
        let state = queries.trade("missing").await;

        assert!(state.is_error());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(notifications.recent(1)[0].message, "Trade not found");
    }

    #[tokio::test]
    async fn failed_refetch_keeps_stale_data() {
        let (api, queries, _) = setup();
        assert!(queries.trading_status().await.data.is_some());

        queries.cache().invalidate(&QueryKey::TradingStatus);
        api.fail(Some(ApiError::Timeout(10)));

        let state = queries.trading_status().await;
        assert!(state.is_error());
        assert!(state.is_stale);
        assert!(state.data.is_some());
    }

    #[tokio::test]
    async fn statistics_follow_cached_trades() {
        let (api, queries, _) = setup();
        let filters = TradeFilters::new();
        assert_eq!(queries.trade_statistics(&filters).total_trades, 0);

        queries.trades(&filters).await;
        let stats = queries.trade_statistics(&filters);
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.net_profit, 80.0);

        api.trades.lock().unwrap().truncate(1);
        queries.refresh(QueryKey::Trades(filters.clone())).await.unwrap();
        assert_eq!(queries.trade_statistics(&filters).total_trades, 1);
    }

    #[test]
    fn memo_reuses_result_for_same_collection() {
        let memo: Memo<Vec<u32>, usize> = Memo::new();
        let source = Arc::new(vec![1, 2, 3]);
        let computed = AtomicUsize::new(0);

        for _ in 0..3 {
            memo.get_or_compute(&source, |v| {
                computed.fetch_add(1, Ordering::SeqCst);
                v.len()
            });
        }
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        let replaced = Arc::new(vec![1, 2, 3]);
        memo.get_or_compute(&replaced, |v| {
            computed.fetch_add(1, Ordering::SeqCst);
            v.len()
        });
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn polling_refreshes_status() {
        let api = Arc::new(FakeApi::new());
        let queries = Arc::new(TradingQueries::new(
            api.clone(),
            Arc::new(QueryCache::new()),
            Arc::new(NotificationCenter::new()),
            quick_config(),
        ));

        let handle = queries.spawn_polling();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.stop();

        assert!(queries
            .cache()
            .get::<TradingStatus>(&QueryKey::TradingStatus)
            .is_some());
        assert!(queries.cache().get::<SystemHealth>(&QueryKey::Health).is_some());
    }
}
