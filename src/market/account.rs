use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::events::{
    AccountUpdateEvent, BalanceUpdate, OrderAck, OrderStatus, OrderUpdateEvent, PositionUpdate,
    Side,
};

/// Tracked wallet balance for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub asset: String,
    pub balance: Decimal,
    #[serde(default)]
    pub cross_wallet_balance: Decimal,
}

/// Tracked position for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub amount: Decimal,
    #[serde(default)]
    pub entry_price: Decimal,
    #[serde(default)]
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit", default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub margin_type: String,
    #[serde(default)]
    pub position_side: String,
}

/// One tracked order, as mirrored from push events and REST
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
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
    #[serde(rename = "avgPrice", default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub stop_price: Decimal,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub close_position: bool,
}

/// Derived classification of the tracked position. Computed on demand,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Opening,
    Opened,
    Closing,
    Closed,
}

// Wire strings arrive pre-validated by the exchange; a malformed decimal
// falls back to zero, mirroring the tolerant parses elsewhere.
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

impl Balance {
    fn from_update(update: &BalanceUpdate) -> Self {
        Balance {
            asset: update.asset.clone(),
            balance: dec(&update.wallet_balance),
            cross_wallet_balance: dec(&update.cross_wallet_balance),
        }
    }
}

impl Position {
    fn from_update(update: &PositionUpdate) -> Self {
        Position {
            symbol: update.symbol.clone(),
            amount: dec(&update.amount),
            entry_price: dec(&update.entry_price),
            mark_price: Decimal::ZERO,
            unrealized_pnl: dec(&update.unrealized_pnl),
            margin_type: update.margin_type.clone(),
            position_side: update.position_side.clone(),
        }
    }
}

impl Order {
    fn from_update(update: &OrderUpdateEvent) -> Self {
        Order {
            symbol: update.symbol.clone(),
            order_id: update.order_id,
            client_order_id: update.client_order_id.clone(),
            side: update.side,
            order_type: update.order_type.clone(),
            time_in_force: update.time_in_force.clone(),
            status: update.status,
            price: dec(&update.price),
            quantity: dec(&update.quantity),
            executed_quantity: dec(&update.filled_quantity),
            average_price: dec(&update.average_price),
            stop_price: dec(&update.stop_price),
            reduce_only: update.reduce_only,
            close_position: update.close_position,
        }
    }

    fn from_ack(ack: &OrderAck) -> Self {
        Order {
            symbol: ack.symbol.clone(),
            order_id: ack.order_id,
            client_order_id: ack.client_order_id.clone(),
            side: ack.side,
            order_type: ack.order_type.clone(),
            time_in_force: ack.time_in_force.clone(),
            status: ack.status,
            price: ack.price,
            quantity: ack.quantity,
            executed_quantity: ack.executed_quantity,
            average_price: ack.average_price,
            stop_price: Decimal::ZERO,
            reduce_only: ack.reduce_only,
            close_position: ack.close_position,
        }
    }
}

/// In-memory mirror of one symbol's account slice: a single balance, a
/// single position, and the orders seen so far in insertion order.
///
/// Built once from REST at launch; afterwards mutated only by user-data
/// push events and submission acknowledgements.
#[derive(Debug, Clone)]
pub struct AccountState {
    symbol: String,
    asset: String,
    balance: Option<Balance>,
    position: Option<Position>,
    orders: Vec<Order>,
}

impl AccountState {
    pub fn new(
        symbol: impl Into<String>,
        asset: impl Into<String>,
        balances: Vec<Balance>,
        positions: Vec<Position>,
        orders: Vec<Order>,
    ) -> Self {
        let symbol = symbol.into();
        let asset = asset.into();
        let balance = balances.into_iter().find(|b| b.asset == asset);
        let position = positions.into_iter().find(|p| p.symbol == symbol);

        AccountState {
            symbol,
            asset,
            balance,
            position,
            orders,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn balance(&self) -> Option<&Balance> {
        self.balance.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Apply a balance/position batch: the tracked balance is replaced on
    /// the first asset match, the tracked position on symbol match.
    pub fn account_update(&mut self, event: &AccountUpdateEvent) {
        for balance in &event.balances {
            if balance.asset == self.asset {
                self.balance = Some(Balance::from_update(balance));
                break;
            }
        }
        for position in &event.positions {
            if position.symbol == self.symbol {
                self.position = Some(Position::from_update(position));
            }
        }
    }

    /// Upsert an order by id: replace in place if present, else append.
    /// Linear scan; the set is bounded by the open-order count.
    pub fn order_update(&mut self, event: &OrderUpdateEvent) {
        let order = Order::from_update(event);
        for slot in &mut self.orders {
            if slot.order_id == order.order_id {
                *slot = order;
                return;
            }
        }
        self.orders.push(order);
    }

    /// Record a submission acknowledgement; always appends
    pub fn create_order_update(&mut self, ack: &OrderAck) {
        self.orders.push(Order::from_ack(ack));
    }

    /// Classify the position from the current amount and orders.
    /// First qualifying order in insertion order decides.
    pub fn position_status(&self) -> PositionStatus {
        let amount = self
            .position
            .as_ref()
            .map(|p| p.amount)
            .unwrap_or(Decimal::ZERO);

        if !amount.is_zero() {
            for order in &self.orders {
                if !matches!(order.status, OrderStatus::New | OrderStatus::PartiallyFilled) {
                    continue;
                }
                if order.close_position {
                    return PositionStatus::Closing;
                }
                let opposes = (order.side == Side::Buy && amount < Decimal::ZERO)
                    || (order.side == Side::Sell && amount > Decimal::ZERO);
                if opposes {
                    return PositionStatus::Closing;
                }
            }
            PositionStatus::Opened
        } else {
            for order in &self.orders {
                if order.status == OrderStatus::New && !order.reduce_only && !order.close_position {
                    return PositionStatus::Opening;
                }
            }
            PositionStatus::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state_with(amount: Decimal, orders: Vec<Order>) -> AccountState {
        AccountState::new(
            "BTCUSDT",
            "USDT",
            vec![Balance {
                asset: "USDT".to_string(),
                balance: dec!(1000),
                cross_wallet_balance: dec!(1000),
            }],
            vec![Position {
                symbol: "BTCUSDT".to_string(),
                amount,
                entry_price: dec!(50000),
                mark_price: dec!(50000),
                unrealized_pnl: Decimal::ZERO,
                margin_type: "cross".to_string(),
                position_side: "BOTH".to_string(),
            }],
            orders,
        )
    }

    fn order(side: Side, status: OrderStatus, reduce_only: bool, close_position: bool) -> Order {
        Order {
            symbol: "BTCUSDT".to_string(),
            order_id: 1,
            client_order_id: String::new(),
            side,
            order_type: "LIMIT".to_string(),
            time_in_force: "GTC".to_string(),
            status,
            price: dec!(50000),
            quantity: dec!(1),
            executed_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            reduce_only,
            close_position,
        }
    }

    #[test]
    fn test_short_with_open_buy_is_closing() {
        let state = state_with(dec!(-5), vec![order(Side::Buy, OrderStatus::New, false, false)]);
        assert_eq!(state.position_status(), PositionStatus::Closing);
    }

    #[test]
    fn test_flat_without_orders_is_closed() {
        let state = state_with(Decimal::ZERO, vec![]);
        assert_eq!(state.position_status(), PositionStatus::Closed);
    }

    #[test]
    fn test_long_without_closing_orders_is_opened() {
        let state = state_with(dec!(3), vec![order(Side::Buy, OrderStatus::New, false, false)]);
        assert_eq!(state.position_status(), PositionStatus::Opened);
    }

    #[test]
    fn test_close_position_order_wins() {
        let state = state_with(
            dec!(3),
            vec![order(Side::Buy, OrderStatus::PartiallyFilled, false, true)],
        );
        assert_eq!(state.position_status(), PositionStatus::Closing);
    }

    #[test]
    fn test_flat_with_entry_order_is_opening() {
        let state = state_with(Decimal::ZERO, vec![order(Side::Buy, OrderStatus::New, false, false)]);
        assert_eq!(state.position_status(), PositionStatus::Opening);
    }

    #[test]
    fn test_flat_with_reduce_only_order_is_closed() {
        let state = state_with(Decimal::ZERO, vec![order(Side::Sell, OrderStatus::New, true, false)]);
        assert_eq!(state.position_status(), PositionStatus::Closed);
    }

    #[test]
    fn test_filled_orders_do_not_qualify() {
        let state = state_with(dec!(-5), vec![order(Side::Buy, OrderStatus::Filled, false, false)]);
        assert_eq!(state.position_status(), PositionStatus::Opened);
    }

    #[test]
    fn test_account_update_replaces_tracked_entries_only() {
        let mut state = state_with(dec!(1), vec![]);

        state.account_update(&AccountUpdateEvent {
            balances: vec![
                BalanceUpdate {
                    asset: "BNB".to_string(),
                    wallet_balance: "5".to_string(),
                    cross_wallet_balance: "5".to_string(),
                },
                BalanceUpdate {
                    asset: "USDT".to_string(),
                    wallet_balance: "900.5".to_string(),
                    cross_wallet_balance: "900.5".to_string(),
                },
            ],
            positions: vec![PositionUpdate {
                symbol: "ETHUSDT".to_string(),
                amount: "7".to_string(),
                entry_price: "3000".to_string(),
                unrealized_pnl: "0".to_string(),
                margin_type: "cross".to_string(),
                isolated_wallet: String::new(),
                position_side: "BOTH".to_string(),
            }],
        });

        assert_eq!(state.balance().unwrap().balance, dec!(900.5));
        // Foreign symbol must not clobber the tracked position
        assert_eq!(state.position().unwrap().amount, dec!(1));
    }

    #[test]
    fn test_order_update_upserts_by_id() {
        let mut state = state_with(dec!(1), vec![]);

        let event = OrderUpdateEvent {
            symbol: "BTCUSDT".to_string(),
            order_id: 9,
            client_order_id: "c1".to_string(),
            side: Side::Sell,
            order_type: "LIMIT".to_string(),
            time_in_force: "GTC".to_string(),
            quantity: "1".to_string(),
            price: "51000".to_string(),
            average_price: "0".to_string(),
            stop_price: "0".to_string(),
            status: OrderStatus::New,
            filled_quantity: "0".to_string(),
            reduce_only: false,
            close_position: false,
            position_side: "BOTH".to_string(),
        };
        state.order_update(&event);
        assert_eq!(state.orders().len(), 1);

        let filled = OrderUpdateEvent {
            status: OrderStatus::Filled,
            filled_quantity: "1".to_string(),
            ..event
        };
        state.order_update(&filled);
        assert_eq!(state.orders().len(), 1);
        assert_eq!(state.orders()[0].status, OrderStatus::Filled);
        assert_eq!(state.orders()[0].executed_quantity, dec!(1));
    }
}
