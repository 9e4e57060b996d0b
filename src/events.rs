//! Wire-shaped exchange events and REST payloads.
//!
//! Field names follow the exchange schema (single-letter stream keys,
//! camelCase REST keys); this crate consumes the schema, it does not own it.
//! Decimal strings stay strings here; the owning engine parses them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Unknown,
}

// The exchange grows status values over time; map anything unexpected to
// Unknown instead of rejecting the whole event.
impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown,
        })
    }
}

/// REST order book depth snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

/// Incremental depth update from the diff stream
#[derive(Debug, Clone, Deserialize)]
pub struct DepthDiffEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "pu")]
    pub prev_final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}

/// Aggregated trade from the trade stream
#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// True when the buyer is the maker, i.e. the aggressor sold
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// Kline stream envelope
#[derive(Debug, Clone, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// Kline payload carried by [`KlineEvent`]
#[derive(Debug, Clone, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub end_time: i64,
    #[serde(rename = "i", default)]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n")]
    pub trade_count: i64,
    #[serde(rename = "x", default)]
    pub is_closed: bool,
    #[serde(rename = "V")]
    pub taker_buy_volume: String,
    #[serde(rename = "q", default)]
    pub quote_volume: String,
    #[serde(rename = "Q", default)]
    pub taker_buy_quote_volume: String,
}

/// Events on the user-data stream, tagged by the `e` field
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum UserDataEvent {
    #[serde(rename = "ACCOUNT_UPDATE")]
    AccountUpdate {
        #[serde(rename = "a")]
        update: AccountUpdateEvent,
    },
    #[serde(rename = "ORDER_TRADE_UPDATE")]
    OrderTradeUpdate {
        #[serde(rename = "o")]
        update: OrderUpdateEvent,
    },
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired,
}

/// Balance/position batch inside an account update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdateEvent {
    #[serde(rename = "B", default)]
    pub balances: Vec<BalanceUpdate>,
    #[serde(rename = "P", default)]
    pub positions: Vec<PositionUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceUpdate {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: String,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub amount: String,
    #[serde(rename = "ep")]
    pub entry_price: String,
    #[serde(rename = "up")]
    pub unrealized_pnl: String,
    #[serde(rename = "mt", default)]
    pub margin_type: String,
    #[serde(rename = "iw", default)]
    pub isolated_wallet: String,
    #[serde(rename = "ps", default)]
    pub position_side: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdateEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "c", default)]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o", default)]
    pub order_type: String,
    #[serde(rename = "f", default)]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap", default)]
    pub average_price: String,
    #[serde(rename = "sp", default)]
    pub stop_price: String,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "z", default)]
    pub filled_quantity: String,
    #[serde(rename = "R", default)]
    pub reduce_only: bool,
    #[serde(rename = "cp", default)]
    pub close_position: bool,
    #[serde(rename = "ps", default)]
    pub position_side: String,
}

/// Acknowledgement returned by order submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: String,
    pub side: Side,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(default)]
    pub time_in_force: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub price: Decimal,
    #[serde(rename = "origQty", default)]
    pub quantity: Decimal,
    #[serde(rename = "executedQty", default)]
    pub executed_quantity: Decimal,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub close_position: bool,
    #[serde(rename = "avgPrice", default)]
    pub average_price: Decimal,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_diff_parses_stream_keys() {
        let data = serde_json::json!({
            "e": "depthUpdate",
            "E": 1234567890,
            "s": "BTCUSDT",
            "U": 100,
            "u": 105,
            "pu": 99,
            "b": [["50000.00", "1.5"], ["49999.00", "2.0"]],
            "a": [["50001.00", "1.0"]]
        });

        let event: DepthDiffEvent = serde_json::from_value(data).unwrap();
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.first_update_id, 100);
        assert_eq!(event.final_update_id, 105);
        assert_eq!(event.prev_final_update_id, 99);
        assert_eq!(event.bids.len(), 2);
        assert_eq!(event.asks.len(), 1);
    }

    #[test]
    fn test_user_data_event_tag_dispatch() {
        let order: UserDataEvent = serde_json::from_value(serde_json::json!({
            "e": "ORDER_TRADE_UPDATE",
            "o": {
                "s": "BTCUSDT",
                "i": 42,
                "c": "abc",
                "S": "SELL",
                "o": "LIMIT",
                "f": "GTC",
                "q": "0.5",
                "p": "50000",
                "X": "NEW",
                "z": "0"
            }
        }))
        .unwrap();

        match order {
            UserDataEvent::OrderTradeUpdate { update } => {
                assert_eq!(update.order_id, 42);
                assert_eq!(update.side, Side::Sell);
                assert_eq!(update.status, OrderStatus::New);
            }
            other => panic!("expected order update, got {:?}", other),
        }

        let expired: UserDataEvent =
            serde_json::from_value(serde_json::json!({"e": "listenKeyExpired"})).unwrap();
        assert!(matches!(expired, UserDataEvent::ListenKeyExpired));
    }

    #[test]
    fn test_unknown_order_status_is_tolerated() {
        let status: OrderStatus = serde_json::from_value(serde_json::json!("EXPIRED_IN_MATCH")).unwrap();
        assert_eq!(status, OrderStatus::Unknown);
    }
}
