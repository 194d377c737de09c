// src/application/cache.rs
// Query cache keyed by structured (entity kind, parameters) keys

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use crate::domain::errors::ApiResult;
use crate::domain::filter::TradeFilters;
use crate::domain::models::{Position, SystemHealth, Trade, TradingSettings, TradingStatus};

/// Cache key. Equality and hashing are structural over the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Trades(TradeFilters),
    Trade(String),
    Positions,
    TradingStatus,
    Settings,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Trades,
    Trade,
    Positions,
    TradingStatus,
    Settings,
    Health,
}

impl QueryKey {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryKey::Trades(_) => QueryKind::Trades,
            QueryKey::Trade(_) => QueryKind::Trade,
            QueryKey::Positions => QueryKind::Positions,
            QueryKey::TradingStatus => QueryKind::TradingStatus,
            QueryKey::Settings => QueryKind::Settings,
            QueryKey::Health => QueryKind::Health,
        }
    }
}

/// Cached payloads, shared by reference count
#[derive(Debug, Clone)]
pub enum CachedValue {
    Trades(Arc<Vec<Trade>>),
    Trade(Arc<Trade>),
    Positions(Arc<Vec<Position>>),
    TradingStatus(Arc<TradingStatus>),
    Settings(Arc<TradingSettings>),
    Health(Arc<SystemHealth>),
}

/// Types that can live in the cache
pub trait Cacheable: Sized + Send + Sync + 'static {
    fn wrap(value: Arc<Self>) -> CachedValue;
    fn extract(value: &CachedValue) -> Option<Arc<Self>>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn wrap(value: Arc<Self>) -> CachedValue {
                CachedValue::$variant(value)
            }

            fn extract(value: &CachedValue) -> Option<Arc<Self>> {
                match value {
                    CachedValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Vec<Trade>, Trades);
cacheable!(Trade, Trade);
cacheable!(Vec<Position>, Positions);
cacheable!(TradingStatus, TradingStatus);
cacheable!(TradingSettings, Settings);
cacheable!(SystemHealth, Health);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    updated_at: DateTime<Utc>,
    stale: bool,
}

/// Typed view of a cache entry
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: Arc<T>,
    pub updated_at: DateTime<Utc>,
    pub stale: bool,
}

type FetchGate = Arc<tokio::sync::Mutex<()>>;

// Bumped on every invalidation, whether or not an entry exists yet
#[derive(Debug, Default)]
struct Generations {
    keys: HashMap<QueryKey, u64>,
    kinds: HashMap<QueryKind, u64>,
}

impl Generations {
    fn of(&self, key: &QueryKey) -> (u64, u64) {
        (
            self.keys.get(key).copied().unwrap_or(0),
            self.kinds.get(&key.kind()).copied().unwrap_or(0),
        )
    }
}

pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    // One gate per key so concurrent fetches of the same key run once
    in_flight: Mutex<HashMap<QueryKey, FetchGate>>,
    generations: Mutex<Generations>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            generations: Mutex::new(Generations::default()),
        }
    }

    pub fn get_value(&self, key: &QueryKey) -> Option<(CachedValue, bool)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| (e.value.clone(), e.stale))
    }

    pub fn get<T: Cacheable>(&self, key: &QueryKey) -> Option<Cached<T>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).and_then(|entry| {
            T::extract(&entry.value).map(|value| Cached {
                value,
                updated_at: entry.updated_at,
                stale: entry.stale,
            })
        })
    }

    /// Replace the entry wholesale and mark it fresh
    pub fn set_value(&self, key: QueryKey, value: CachedValue) {
        self.store(key, value, false);
    }

    fn store(&self, key: QueryKey, value: CachedValue, stale: bool) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                value,
                updated_at: Utc::now(),
                stale,
            },
        );
    }

    fn generation(&self, key: &QueryKey) -> (u64, u64) {
        self.generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .of(key)
    }

    pub fn set<T: Cacheable>(&self, key: QueryKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.set_value(key, T::wrap(value.clone()));
        value
    }

    pub fn invalidate(&self, key: &QueryKey) {
        *self
            .generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys
            .entry(key.clone())
            .or_insert(0) += 1;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(key) {
            log::debug!("Invalidating {:?}", key);
            entry.stale = true;
        }
    }

    pub fn invalidate_kind(&self, kind: QueryKind) {
        *self
            .generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .kinds
            .entry(kind)
            .or_insert(0) += 1;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (key, entry) in entries.iter_mut().filter(|(k, _)| k.kind() == kind) {
            log::debug!("Invalidating {:?}", key);
            entry.stale = true;
        }
    }

    pub fn keys_of_kind(&self, kind: QueryKind) -> Vec<QueryKey> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().filter(|k| k.kind() == kind).cloned().collect()
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.get_value(key).map_or(true, |(_, stale)| stale)
    }

    /// Serve fresh data from the cache, otherwise run `fetcher` and store its
    /// result. With `force` the cached value is ignored. Callers racing on
    /// the same key share one fetch. A failed fetch leaves the previous
    /// entry untouched. A result that raced with an invalidation is stored
    /// stale so the next read refetches it.
    pub async fn fetch<F, Fut>(
        &self,
        key: QueryKey,
        force: bool,
        fetcher: F,
    ) -> ApiResult<CachedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<CachedValue>>,
    {
        if !force {
            if let Some((value, false)) = self.get_value(&key) {
                return Ok(value);
            }
        }

        let gate = self.gate(&key);
        let started = Utc::now();
        let result = {
            let _guard = gate.lock().await;

            // Someone else may have fetched while we waited
            let fresh = self
                .entries
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&key)
                .filter(|e| !e.stale && (!force || e.updated_at >= started))
                .map(|e| e.value.clone());

            match fresh {
                Some(value) => Ok(value),
                None => {
                    let generation = self.generation(&key);
                    fetcher().await.map(|value| {
                        let invalidated = self.generation(&key) != generation;
                        if invalidated {
                            log::debug!("{:?} was invalidated while fetching", key);
                        }
                        self.store(key.clone(), value.clone(), invalidated);
                        value
                    })
                }
            }
        };

        self.release_gate(&key, gate);
        result
    }

    fn gate(&self, key: &QueryKey) -> FetchGate {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_gate(&self, key: &QueryKey, gate: FetchGate) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this caller hold it: nobody is waiting
        if Arc::strong_count(&gate) == 2 {
            in_flight.remove(key);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
