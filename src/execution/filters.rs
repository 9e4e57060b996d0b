//! Exchange-filter-aware price/quantity formatting.
//!
//! A tick/step size is a decimal string with a single `'1'` marking the
//! precision ("0.00100000" allows 3 fractional digits). Values are
//! truncated with exact decimal arithmetic, never rounded half-up, so
//! a formatted order can never breach the filter from above.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter string carries no `'1'` precision marker
    #[error("invalid exchange filter {0:?}: no precision marker")]
    InvalidFilter(String),
}

/// Per-instrument trading rules from exchange metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub quote_asset: String,
    /// PRICE_FILTER tick size, e.g. "0.10000000"
    pub tick_size: String,
    /// LOT_SIZE step size, e.g. "0.00100000"
    pub step_size: String,
}

/// Exchange metadata: the full instrument table, immutable after fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeMetadata {
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeMetadata {
    pub fn symbol(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.iter().find(|s| s.symbol == name)
    }
}

/// Number of fractional digits a filter string permits:
/// index of the `'1'` minus one, floored at zero.
fn filter_precision(filter: &str) -> Result<u32, FilterError> {
    match filter.find('1') {
        None => Err(FilterError::InvalidFilter(filter.to_string())),
        Some(0) => Ok(0),
        Some(index) => Ok(index as u32 - 1),
    }
}

/// Format a price against the symbol's tick size, fixed-point with
/// exactly the filter's fractional digit count.
pub fn format_price(price: Decimal, info: &SymbolInfo) -> Result<String, FilterError> {
    let precision = filter_precision(&info.tick_size)?;
    Ok(render_fixed(price.trunc_with_scale(precision), precision))
}

/// Format a quantity against the symbol's step size, trailing zeros
/// trimmed.
pub fn format_quantity(quantity: Decimal, info: &SymbolInfo) -> Result<String, FilterError> {
    let precision = filter_precision(&info.step_size)?;
    Ok(quantity.trunc_with_scale(precision).normalize().to_string())
}

/// Render with exactly `scale` fractional digits. `value` is already
/// truncated to at most that scale.
fn render_fixed(value: Decimal, scale: u32) -> String {
    let mut out = value.to_string();

    if scale == 0 {
        if let Some(dot) = out.find('.') {
            out.truncate(dot);
        }
        return out;
    }

    let fraction = match out.find('.') {
        Some(dot) => out.len() - dot - 1,
        None => {
            out.push('.');
            0
        }
    };
    for _ in fraction..scale as usize {
        out.push('0');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info(tick: &str, step: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: "BTCUSDT".to_string(),
            quote_asset: "USDT".to_string(),
            tick_size: tick.to_string(),
            step_size: step.to_string(),
        }
    }

    #[test]
    fn test_quantity_truncates_to_step_precision() {
        let info = info("0.10000000", "0.00100000");
        assert_eq!(format_quantity(dec!(1.23456), &info).unwrap(), "1.234");
    }

    #[test]
    fn test_price_truncates_to_tick_precision() {
        let info = info("0.10000000", "0.00100000");
        assert_eq!(format_price(dec!(12345.678), &info).unwrap(), "12345.6");
    }

    #[test]
    fn test_price_pads_to_tick_precision() {
        let info = info("0.01000000", "0.00100000");
        assert_eq!(format_price(dec!(42), &info).unwrap(), "42.00");
        assert_eq!(format_price(dec!(42.5), &info).unwrap(), "42.50");
    }

    #[test]
    fn test_whole_number_filters() {
        let info = info("1.00000000", "1.00000000");
        assert_eq!(format_price(dec!(12345.678), &info).unwrap(), "12345");
        assert_eq!(format_quantity(dec!(3.9), &info).unwrap(), "3");
    }

    #[test]
    fn test_quantity_trims_trailing_zeros() {
        let info = info("0.10000000", "0.00100000");
        assert_eq!(format_quantity(dec!(2.5), &info).unwrap(), "2.5");
        assert_eq!(format_quantity(dec!(5), &info).unwrap(), "5");
    }

    #[test]
    fn test_malformed_filter_is_rejected() {
        let info = info("0.00000000", "0.00100000");
        assert_eq!(
            format_price(dec!(1), &info),
            Err(FilterError::InvalidFilter("0.00000000".to_string()))
        );
        assert!(format_quantity(dec!(1), &info).is_ok());
    }

    #[test]
    fn test_metadata_lookup() {
        let metadata = ExchangeMetadata {
            symbols: vec![info("0.10000000", "0.00100000")],
        };
        assert!(metadata.symbol("BTCUSDT").is_some());
        assert!(metadata.symbol("ETHUSDT").is_none());
    }
}
