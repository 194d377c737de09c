// src/domain/filter.rs
// Multi-criteria narrowing of trade history

use crate::domain::models::{OrderType, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Optional filter dimensions. An unset field imposes no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFilters {
    pub symbol: Option<String>,
    pub order_type: Option<OrderType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub min_profit: Option<f64>,
    pub max_profit: Option<f64>,
    pub search: Option<String>,
}

impl TradeFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn profit_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_profit = min;
        self.max_profit = max;
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.order_type.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.min_profit.is_none()
            && self.max_profit.is_none()
            && self.search.is_none()
    }

    /// True when the trade satisfies every supplied dimension
    pub fn matches(&self, trade: &Trade) -> bool {
        if let Some(symbol) = &self.symbol {
            if &trade.symbol != symbol {
                return false;
            }
        }

        if let Some(order_type) = self.order_type {
            if trade.order_type != order_type {
                return false;
            }
        }

        if let Some(from) = self.date_from {
            if trade.entry_time < from {
                return false;
            }
        }

        if let Some(to) = self.date_to {
            if trade.entry_time > to {
                return false;
            }
        }

        // Trades without a profit/loss skip the range check
        if let Some(pnl) = trade.profit_loss {
            if self.min_profit.map_or(false, |min| pnl < min) {
                return false;
            }
            if self.max_profit.map_or(false, |max| pnl > max) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let haystack = format!(
                "{} {} {}",
                trade.symbol,
                trade.order_type,
                trade.comment.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if !haystack.contains(&search.to_lowercase()) {
                return false;
            }
        }

        true
    }
}

// Profit bounds are compared bitwise so filters can key the query cache.
impl PartialEq for TradeFilters {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.order_type == other.order_type
            && self.date_from == other.date_from
            && self.date_to == other.date_to
            && self.min_profit.map(f64::to_bits) == other.min_profit.map(f64::to_bits)
            && self.max_profit.map(f64::to_bits) == other.max_profit.map(f64::to_bits)
            && self.search == other.search
    }
}

impl Eq for TradeFilters {}

impl Hash for TradeFilters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.order_type.hash(state);
        self.date_from.hash(state);
        self.date_to.hash(state);
        self.min_profit.map(f64::to_bits).hash(state);
        self.max_profit.map(f64::to_bits).hash(state);
        self.search.hash(state);
    }
}

/// Return the trades that satisfy all filters, in input order
pub fn filter_trades(trades: &[Trade], filters: &TradeFilters) -> Vec<Trade> {
    trades
        .iter()
        .filter(|trade| filters.matches(trade))
        .cloned()
        .collect()
}
