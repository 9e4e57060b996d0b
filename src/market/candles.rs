use rust_decimal::Decimal;
use std::str::FromStr;

use crate::events::KlinePayload;

/// One OHLCV candle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: i64,
    pub taker_buy_volume: Decimal,
}

impl Candle {
    /// Convert a kline stream payload into a candle
    pub fn from_kline(kline: &KlinePayload) -> Result<Self, rust_decimal::Error> {
        Ok(Candle {
            open_time: kline.start_time,
            close_time: kline.end_time,
            open: Decimal::from_str(&kline.open)?,
            high: Decimal::from_str(&kline.high)?,
            low: Decimal::from_str(&kline.low)?,
            close: Decimal::from_str(&kline.close)?,
            volume: Decimal::from_str(&kline.volume)?,
            trade_count: kline.trade_count,
            taker_buy_volume: Decimal::from_str(&kline.taker_buy_volume)?,
        })
    }
}

/// Ordered candle series: the last element is the still-open candle and
/// is mutated in place; everything before it is frozen.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Seed from the most recent candles returned by REST
    pub fn seeded(candles: Vec<Candle>) -> Self {
        CandleSeries { candles }
    }

    /// Merge one incremental update.
    ///
    /// Same open time as the last candle replaces it in place; a newer
    /// open time appends. An update older than the last candle is
    /// dropped and `false` is returned.
    pub fn update(&mut self, candle: Candle) -> bool {
        match self.candles.last_mut() {
            None => {
                self.candles.push(candle);
                true
            }
            Some(last) if last.open_time == candle.open_time => {
                *last = candle;
                true
            }
            Some(last) if last.open_time < candle.open_time => {
                self.candles.push(candle);
                true
            }
            Some(_) => false,
        }
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open_time: i64, close: Decimal) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 60_000,
            open: dec!(100),
            high: dec!(110),
            low: dec!(90),
            close,
            volume: dec!(1),
            trade_count: 10,
            taker_buy_volume: dec!(0.5),
        }
    }

    #[test]
    fn test_same_open_time_replaces_in_place() {
        let mut series = CandleSeries::seeded(vec![candle(0, dec!(100)), candle(60_000, dec!(101))]);

        assert!(series.update(candle(60_000, dec!(105))));
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, dec!(105));
    }

    #[test]
    fn test_newer_open_time_appends() {
        let mut series = CandleSeries::seeded(vec![candle(0, dec!(100))]);

        assert!(series.update(candle(60_000, dec!(101))));
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().open_time, 60_000);
    }

    #[test]
    fn test_empty_series_appends() {
        let mut series = CandleSeries::default();
        assert!(series.update(candle(0, dec!(100))));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_older_open_time_is_dropped() {
        let mut series = CandleSeries::seeded(vec![candle(60_000, dec!(101))]);

        assert!(!series.update(candle(0, dec!(99))));
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().open_time, 60_000);
    }

    #[test]
    fn test_from_kline() {
        let payload = KlinePayload {
            start_time: 1000,
            end_time: 1999,
            interval: "5m".to_string(),
            open: "100.1".to_string(),
            high: "110.2".to_string(),
            low: "99.9".to_string(),
            close: "105.0".to_string(),
            volume: "12.5".to_string(),
            trade_count: 42,
            is_closed: false,
            taker_buy_volume: "6.25".to_string(),
            quote_volume: String::new(),
            taker_buy_quote_volume: String::new(),
        };

        let candle = Candle::from_kline(&payload).unwrap();
        assert_eq!(candle.open, dec!(100.1));
        assert_eq!(candle.taker_buy_volume, dec!(6.25));
        assert_eq!(candle.trade_count, 42);

        let bad = KlinePayload {
            open: "not-a-number".to_string(),
            ..payload
        };
        assert!(Candle::from_kline(&bad).is_err());
    }
}
