// src/application/store.rs
// In-memory client state fed by the realtime bridge

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

use crate::domain::models::{Position, Trade, TradingStatus};

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub positions: Arc<Vec<Position>>,
    pub trading_status: Option<Arc<TradingStatus>>,
    pub last_trade: Option<Arc<Trade>>,
    pub push_connected: bool,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Each setter replaces its field wholesale
#[derive(Debug, Default)]
pub struct ClientStore {
    state: RwLock<StoreState>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_positions(&self, positions: Arc<Vec<Position>>) {
        self.update(|s| s.positions = positions);
    }

    pub fn set_trading_status(&self, status: Arc<TradingStatus>) {
        self.update(|s| s.trading_status = Some(status));
    }

    pub fn set_last_trade(&self, trade: Arc<Trade>) {
        self.update(|s| s.last_trade = Some(trade));
    }

    pub fn set_push_connected(&self, connected: bool) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push_connected = connected;
    }

    pub fn is_push_connected(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .push_connected
    }

    // Record the event time alongside the field change
    fn update<F: FnOnce(&mut StoreState)>(&self, f: F) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
        state.last_event_at = Some(Utc::now());
    }
}
