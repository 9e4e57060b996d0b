use chrono::Timelike;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::Clock;
use crate::events::AggTradeEvent;

/// Buy/sell volume accumulated at one price.
///
/// The key in the cluster map is the price's canonical wire string; the
/// parsed decimal is kept alongside for numeric queries.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
}

impl PriceLevel {
    fn new(price: Decimal) -> Self {
        PriceLevel {
            price,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
        }
    }

    fn accumulate(&mut self, quantity: Decimal, buyer_is_maker: bool) {
        // Maker on the buy side means the aggressor sold
        if buyer_is_maker {
            self.sell_volume += quantity;
        } else {
            self.buy_volume += quantity;
        }
    }

    pub fn quantity(&self) -> Decimal {
        self.buy_volume + self.sell_volume
    }
}

/// One volume-profile window over `[start_minute, end_minute)` of the hour
#[derive(Debug, Clone)]
pub struct Cluster {
    start_minute: u32,
    end_minute: u32,
    levels: HashMap<String, PriceLevel>,
}

impl Cluster {
    fn new(start_minute: u32, end_minute: u32) -> Self {
        Cluster {
            start_minute,
            end_minute,
            levels: HashMap::new(),
        }
    }

    /// Window bounds as minutes of the hour; fixed at creation
    pub fn window(&self) -> (u32, u32) {
        (self.start_minute, self.end_minute)
    }

    pub fn levels(&self) -> &HashMap<String, PriceLevel> {
        &self.levels
    }

    /// Accumulate one trade; `false` when its minute falls outside the window
    fn update(
        &mut self,
        minute: u32,
        key: &str,
        price: Decimal,
        quantity: Decimal,
        buyer_is_maker: bool,
    ) -> bool {
        if minute < self.start_minute || minute >= self.end_minute {
            return false;
        }

        self.levels
            .entry(key.to_string())
            .or_insert_with(|| PriceLevel::new(price))
            .accumulate(quantity, buyer_is_maker);
        true
    }

    /// Price range of the cluster as a percentage:
    /// ((max / min) - 1) * 100 over observed prices. `None` without levels.
    pub fn range_pct(&self) -> Option<Decimal> {
        let mut min: Option<Decimal> = None;
        let mut max: Option<Decimal> = None;

        for level in self.levels.values() {
            min = Some(min.map_or(level.price, |m| m.min(level.price)));
            max = Some(max.map_or(level.price, |m| m.max(level.price)));
        }

        let (min, max) = (min?, max?);
        if min.is_zero() {
            return None;
        }
        Some((max / min - Decimal::ONE) * Decimal::ONE_HUNDRED)
    }
}

/// Time-windowed volume profile built from the aggregated trade stream.
///
/// Clusters are append-only; only the newest one accepts trades. Window
/// bounds come from the injected clock's minute-of-hour, quantized down
/// to the timeframe, never from trade timestamps.
pub struct VolumeClusters {
    timeframe_minutes: u32,
    closed: Vec<Cluster>,
    active: Cluster,
    clock: Arc<dyn Clock>,
}

impl VolumeClusters {
    pub fn new(timeframe_minutes: u32, clock: Arc<dyn Clock>) -> Self {
        let timeframe_minutes = timeframe_minutes.max(1);
        let (start, end) = current_bounds(clock.as_ref(), timeframe_minutes);
        VolumeClusters {
            timeframe_minutes,
            closed: Vec::new(),
            active: Cluster::new(start, end),
            clock,
        }
    }

    /// Route one trade into the active cluster, rolling the window over
    /// when the trade's minute has moved past it.
    pub fn update(&mut self, trade: &AggTradeEvent) {
        let Some(minute) = trade_minute(trade) else {
            tracing::warn!("{} trade with invalid timestamp dropped", trade.symbol);
            return;
        };
        let (Ok(price), Ok(quantity)) = (
            Decimal::from_str(&trade.price),
            Decimal::from_str(&trade.quantity),
        ) else {
            tracing::warn!("{} trade with unparsable price/quantity dropped", trade.symbol);
            return;
        };

        if self
            .active
            .update(minute, &trade.price, price, quantity, trade.buyer_is_maker)
        {
            return;
        }

        self.roll_over();
        if !self
            .active
            .update(minute, &trade.price, price, quantity, trade.buyer_is_maker)
        {
            tracing::warn!(
                "{} trade at minute {} outside fresh window {:?}",
                trade.symbol,
                minute,
                self.active.window()
            );
        }
    }

    fn roll_over(&mut self) {
        let (start, end) = current_bounds(self.clock.as_ref(), self.timeframe_minutes);
        let finished = std::mem::replace(&mut self.active, Cluster::new(start, end));
        self.closed.push(finished);
    }

    /// The one mutable cluster
    pub fn active(&self) -> &Cluster {
        &self.active
    }

    /// All clusters, oldest first, ending with the active one
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.closed.iter().chain(std::iter::once(&self.active))
    }

    /// Cluster count; always at least one
    pub fn len(&self) -> usize {
        self.closed.len() + 1
    }

    pub fn timeframe_minutes(&self) -> u32 {
        self.timeframe_minutes
    }

    /// Price range percentage of the active cluster
    pub fn range_pct(&self) -> Option<Decimal> {
        self.active.range_pct()
    }
}

fn trade_minute(trade: &AggTradeEvent) -> Option<u32> {
    chrono::DateTime::from_timestamp_millis(trade.trade_time).map(|t| t.minute())
}

/// Quantize the clock's minute-of-hour down to the timeframe
fn current_bounds(clock: &dyn Clock, timeframe_minutes: u32) -> (u32, u32) {
    let minute = clock.now().minute();
    let start = minute - minute % timeframe_minutes;
    (start, start + timeframe_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Clock pinned to a settable instant
    struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

    impl FixedClock {
        fn at_minute(minute: u32) -> Arc<Self> {
            Arc::new(FixedClock(std::sync::Mutex::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            )))
        }

        fn set_minute(&self, minute: u32) {
            *self.0.lock().unwrap() = Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap();
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn trade_at_minute(minute: u32, price: &str, qty: &str, maker: bool) -> AggTradeEvent {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 30).unwrap();
        AggTradeEvent {
            symbol: "BTCUSDT".to_string(),
            price: price.to_string(),
            quantity: qty.to_string(),
            trade_time: time.timestamp_millis(),
            buyer_is_maker: maker,
        }
    }

    #[test]
    fn test_window_aligns_to_timeframe() {
        let clock = FixedClock::at_minute(7);
        let clusters = VolumeClusters::new(5, clock);
        assert_eq!(clusters.active().window(), (5, 10));
    }

    #[test]
    fn test_volume_conservation_within_one_window() {
        let clock = FixedClock::at_minute(5);
        let mut clusters = VolumeClusters::new(5, clock);

        clusters.update(&trade_at_minute(5, "100.0", "1.5", false));
        clusters.update(&trade_at_minute(6, "100.0", "0.5", true));
        clusters.update(&trade_at_minute(7, "101.0", "2.0", false));

        assert_eq!(clusters.len(), 1);

        let total: Decimal = clusters
            .active()
            .levels()
            .values()
            .map(|l| l.quantity())
            .sum();
        assert_eq!(total, dec!(4.0));

        let level = &clusters.active().levels()["100.0"];
        assert_eq!(level.buy_volume, dec!(1.5));
        assert_eq!(level.sell_volume, dec!(0.5));
    }

    #[test]
    fn test_spanning_k_boundaries_yields_k_plus_one_clusters() {
        let clock = FixedClock::at_minute(0);
        let mut clusters = VolumeClusters::new(5, clock.clone());

        clusters.update(&trade_at_minute(1, "100.0", "1.0", false));

        clock.set_minute(5);
        clusters.update(&trade_at_minute(5, "100.0", "1.0", false));

        clock.set_minute(11);
        clusters.update(&trade_at_minute(11, "100.0", "1.0", false));

        // Two boundary crossings -> three clusters
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters.active().window(), (10, 15));

        let windows: Vec<_> = clusters.iter().map(|c| c.window()).collect();
        assert_eq!(windows, vec![(0, 5), (5, 10), (10, 15)]);
    }

    #[test]
    fn test_rollover_bounds_come_from_clock_not_trade() {
        let clock = FixedClock::at_minute(0);
        let mut clusters = VolumeClusters::new(5, clock.clone());

        // Clock has moved to minute 17 but the trade claims minute 16
        clock.set_minute(17);
        clusters.update(&trade_at_minute(16, "100.0", "1.0", false));

        assert_eq!(clusters.active().window(), (15, 20));
        assert_eq!(clusters.active().levels().len(), 1);
    }

    #[test]
    fn test_range_pct() {
        let clock = FixedClock::at_minute(0);
        let mut clusters = VolumeClusters::new(5, clock);

        assert_eq!(clusters.range_pct(), None);

        clusters.update(&trade_at_minute(1, "100.0", "1.0", false));
        assert_eq!(clusters.range_pct(), Some(Decimal::ZERO));

        clusters.update(&trade_at_minute(2, "102.0", "1.0", false));
        assert_eq!(clusters.range_pct(), Some(dec!(2)));
    }

    #[test]
    fn test_distinct_price_strings_stay_distinct_levels() {
        let clock = FixedClock::at_minute(0);
        let mut clusters = VolumeClusters::new(5, clock);

        clusters.update(&trade_at_minute(1, "100.0", "1.0", false));
        clusters.update(&trade_at_minute(1, "100.5", "1.0", true));

        assert_eq!(clusters.active().levels().len(), 2);
    }
}
