// src/application/realtime.rs
// Reconciles push events into the query cache and client store

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::application::cache::{QueryCache, QueryKey, QueryKind};
use crate::application::store::ClientStore;
use crate::domain::errors::{PushError, PushResult};
use crate::domain::models::{Position, Trade, TradingStatus};

/// Typed push event, tagged by `type` with the payload under `data`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEvent {
    PositionUpdate(Vec<Position>),
    TradeUpdate(Trade),
    StatusUpdate(TradingStatus),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl PushEvent {
    /// Only the tag must be known. Payload fields the frame leaves out take
    /// their defaults.
    pub fn parse(text: &str) -> PushResult<Self> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| PushError::InvalidEvent(e.to_string()))?;

        match envelope.kind.as_str() {
            "POSITION_UPDATE" => payload(envelope.data).map(PushEvent::PositionUpdate),
            "TRADE_UPDATE" => payload(envelope.data).map(PushEvent::TradeUpdate),
            "STATUS_UPDATE" => payload(envelope.data).map(PushEvent::StatusUpdate),
            other => Err(PushError::InvalidEvent(format!("Unknown event type {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::PositionUpdate(_) => "POSITION_UPDATE",
            PushEvent::TradeUpdate(_) => "TRADE_UPDATE",
            PushEvent::StatusUpdate(_) => "STATUS_UPDATE",
        }
    }
}

fn payload<T: DeserializeOwned + Default>(data: serde_json::Value) -> PushResult<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| PushError::InvalidEvent(e.to_string()))
}

type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Subscription registry owned by the dashboard session
pub struct RealtimeBridge {
    cache: Arc<QueryCache>,
    store: Arc<ClientStore>,
    handlers: Mutex<HashMap<u64, Handler>>,
    next_id: AtomicU64,
}

impl RealtimeBridge {
    pub fn new(cache: Arc<QueryCache>, store: Arc<ClientStore>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            store,
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn store(&self) -> &Arc<ClientStore> {
        &self.store
    }

    /// Register a listener. Dropping the returned subscription removes it.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(handler));

        Subscription {
            id,
            bridge: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn unsubscribe(&self, id: u64) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub fn set_connected(&self, connected: bool) {
        if connected != self.store.is_push_connected() {
            log::info!(
                "Push channel {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
        self.store.set_push_connected(connected);
    }

    /// Decode a raw frame and apply it
    pub fn apply_text(&self, text: &str) -> PushResult<PushEvent> {
        let event = PushEvent::parse(text)?;
        self.apply(event.clone());
        Ok(event)
    }

    /// Replace the matching cache entry and store field, then notify listeners
    pub fn apply(&self, event: PushEvent) {
        log::debug!("Applying {} event", event.name());

        match &event {
            PushEvent::PositionUpdate(positions) => {
                let positions = self.cache.set(QueryKey::Positions, positions.clone());
                self.store.set_positions(positions);
            }
            PushEvent::TradeUpdate(trade) => {
                let trade = self.cache.set(QueryKey::Trade(trade.id.clone()), trade.clone());
                self.store.set_last_trade(trade);
                // Lists may now include or exclude this trade
                self.cache.invalidate_kind(QueryKind::Trades);
            }
            PushEvent::StatusUpdate(status) => {
                let status = self.cache.set(QueryKey::TradingStatus, status.clone());
                self.store.set_trading_status(status);
            }
        }

        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        for handler in handlers {
            handler(&event);
        }
    }
}

/// Keeps a listener registered until dropped
pub struct Subscription {
    id: u64,
    bridge: Weak<RealtimeBridge>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.unsubscribe(self.id);
        }
    }
}
