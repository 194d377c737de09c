// src/domain/statistics.rs
// Derived views over trade and position collections

use crate::domain::models::{OrderType, Position, Trade};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

const CURRENCY_DECIMALS: u32 = 2;
const PROFIT_FACTOR_DECIMALS: u32 = 4;

/// Aggregates over closed trades
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub profit_factor: f64,
    pub average_profit: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStatistics {
    pub total_positions: usize,
    pub buy_positions: usize,
    pub sell_positions: usize,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub total_volume: f64,
    pub profitable_positions: usize,
}

/// Round half away from zero. Non-finite values pass through unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Compute win/loss aggregates. Trades without a profit/loss are ignored.
pub fn calculate_trade_statistics(trades: Option<&[Trade]>) -> TradeStatistics {
    let closed: Vec<f64> = trades
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.profit_loss)
        .collect();

    if closed.is_empty() {
        return TradeStatistics::default();
    }

    let total = closed.len();
    let mut winning = 0;
    let mut losing = 0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut largest_win: f64 = 0.0;
    let mut largest_loss: f64 = 0.0;

    for &pnl in &closed {
        if pnl > 0.0 {
            winning += 1;
            gross_profit += pnl;
            largest_win = largest_win.max(pnl);
        } else if pnl < 0.0 {
            losing += 1;
            gross_loss += pnl.abs();
            largest_loss = largest_loss.min(pnl);
        }
    }

    let net_profit = gross_profit - gross_loss;
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    TradeStatistics {
        total_trades: total,
        winning_trades: winning,
        losing_trades: losing,
        win_rate: round_to(winning as f64 / total as f64 * 100.0, CURRENCY_DECIMALS),
        gross_profit: round_to(gross_profit, CURRENCY_DECIMALS),
        gross_loss: round_to(gross_loss, CURRENCY_DECIMALS),
        net_profit: round_to(net_profit, CURRENCY_DECIMALS),
        profit_factor: round_to(profit_factor, PROFIT_FACTOR_DECIMALS),
        average_profit: round_to(net_profit / total as f64, CURRENCY_DECIMALS),
        largest_win: round_to(largest_win, CURRENCY_DECIMALS),
        largest_loss: round_to(largest_loss, CURRENCY_DECIMALS),
    }
}

pub fn calculate_position_statistics(positions: &[Position]) -> PositionStatistics {
    if positions.is_empty() {
        return PositionStatistics::default();
    }

    let total_profit: f64 = positions.iter().map(|p| p.profit).sum();
    let total_volume: f64 = positions.iter().map(|p| p.volume).sum();
    let buy_positions = positions
        .iter()
        .filter(|p| p.position_type == OrderType::Buy)
        .count();

    PositionStatistics {
        total_positions: positions.len(),
        buy_positions,
        sell_positions: positions.len() - buy_positions,
        total_profit: round_to(total_profit, CURRENCY_DECIMALS),
        avg_profit: round_to(total_profit / positions.len() as f64, CURRENCY_DECIMALS),
        total_volume: round_to(total_volume, CURRENCY_DECIMALS),
        profitable_positions: positions.iter().filter(|p| p.profit > 0.0).count(),
    }
}

/// Render an amount as `$1,234.56`, negatives as `-$1,234.56`
pub fn format_currency(value: f64) -> String {
    let rounded = round_to(value, CURRENCY_DECIMALS);
    let sign = if rounded < 0.0 { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", sign, grouped, fraction)
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", round_to(value, CURRENCY_DECIMALS))
}

pub fn format_profit_factor(value: f64) -> String {
    if value.is_infinite() {
        "∞".to_string()
    } else {
        format!("{:.2}", round_to(value, CURRENCY_DECIMALS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn trade(id: &str, pnl: Option<f64>) -> Trade {
        Trade {
            id: id.to_string(),
            symbol: "EURUSD".to_string(),
            order_type: OrderType::Buy,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            entry_price: 1.085,
            exit_time: None,
            exit_price: None,
            volume: 0.1,
            profit_loss: pnl,
            commission: None,
            comment: None,
        }
    }

    fn position(kind: OrderType, volume: f64, profit: f64) -> Position {
        Position {
            id: "p".to_string(),
            symbol: "GBPUSD".to_string(),
            position_type: kind,
            volume,
            open_price: 1.27,
            current_price: 1.27,
            profit,
            open_time: None,
        }
    }

    #[test]
    fn empty_or_missing_input_is_all_zero() {
        assert_eq!(calculate_trade_statistics(None), TradeStatistics::default());
        assert_eq!(calculate_trade_statistics(Some(&[])), TradeStatistics::default());
        assert_eq!(calculate_trade_statistics(None).profit_factor, 0.0);
    }

    #[test]
    fn mixed_results() {
        let trades: Vec<Trade> = [100.0, -50.0, 30.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, p)| trade(&i.to_string(), Some(*p)))
            .collect();

        let stats = calculate_trade_statistics(Some(&trades));
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.gross_profit, 130.0);
        assert_eq!(stats.gross_loss, 50.0);
        assert_eq!(stats.net_profit, 80.0);
        assert_eq!(stats.profit_factor, 2.6);
        assert_eq!(stats.average_profit, 20.0);
        assert_eq!(stats.largest_win, 100.0);
        assert_eq!(stats.largest_loss, -50.0);
    }

    #[test]
    fn open_trades_are_excluded() {
        let trades = vec![trade("a", Some(10.0)), trade("b", None), trade("c", Some(-5.0))];
        let stats = calculate_trade_statistics(Some(&trades));
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades + stats.losing_trades, 2);
    }

    #[test]
    fn only_open_trades_is_all_zero() {
        let trades = vec![trade("a", None), trade("b", None)];
        assert_eq!(calculate_trade_statistics(Some(&trades)), TradeStatistics::default());
    }

    #[test]
    fn profit_factor_without_losses() {
        let winners = vec![trade("a", Some(12.5)), trade("b", Some(7.5))];
        assert_eq!(
            calculate_trade_statistics(Some(&winners)).profit_factor,
            f64::INFINITY
        );

        let flat = vec![trade("a", Some(0.0)), trade("b", Some(0.0))];
        let stats = calculate_trade_statistics(Some(&flat));
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.win_rate, 0.0);
    }

    #[test]
    fn rates_are_rounded() {
        let trades = vec![trade("a", Some(10.0)), trade("b", Some(-3.0)), trade("c", Some(-3.0))];
        let stats = calculate_trade_statistics(Some(&trades));
        assert_eq!(stats.win_rate, 33.33);
        assert_eq!(stats.profit_factor, 1.6667);
        assert_eq!(stats.average_profit, 1.33);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(f64::INFINITY, 2), f64::INFINITY);
    }

    #[test]
    fn empty_positions_have_zero_average() {
        let stats = calculate_position_statistics(&[]);
        assert_eq!(stats.total_positions, 0);
        assert_eq!(stats.avg_profit, 0.0);
        assert!(stats.avg_profit.is_finite());
    }

    #[test]
    fn position_breakdown() {
        let positions = vec![
            position(OrderType::Buy, 0.5, 25.0),
            position(OrderType::Sell, 1.0, -10.0),
            position(OrderType::Buy, 0.25, 0.0),
        ];

        let stats = calculate_position_statistics(&positions);
        assert_eq!(stats.total_positions, 3);
        assert_eq!(stats.buy_positions, 2);
        assert_eq!(stats.sell_positions, 1);
        assert_eq!(stats.total_profit, 15.0);
        assert_eq!(stats.avg_profit, 5.0);
        assert_eq!(stats.total_volume, 1.75);
        assert_eq!(stats.profitable_positions, 1);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-50.0), "-$50.00");
        assert_eq!(format_currency(999.0), "$999.00");
        assert_eq!(format_percent(55.5), "55.50%");
        assert_eq!(format_profit_factor(f64::INFINITY), "∞");
        assert_eq!(format_profit_factor(2.6), "2.60");
    }
}
