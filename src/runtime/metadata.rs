use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::execution::filters::{ExchangeMetadata, SymbolInfo};
use crate::ports::{ExchangeRest, RestError};

/// Process-wide exchange metadata, fetched once and read-only after.
///
/// A constructed-once dependency injected into the runtime rather than a
/// lazily-locked global; the `OnceCell` guarantees a single fetch even
/// under concurrent first use.
pub struct MetadataCache {
    rest: Arc<dyn ExchangeRest>,
    cell: OnceCell<ExchangeMetadata>,
}

impl MetadataCache {
    pub fn new(rest: Arc<dyn ExchangeRest>) -> Self {
        MetadataCache {
            rest,
            cell: OnceCell::new(),
        }
    }

    /// The full metadata table, fetching on first use
    pub async fn get(&self) -> Result<&ExchangeMetadata, RestError> {
        self.cell
            .get_or_try_init(|| async { self.rest.exchange_metadata().await })
            .await
    }

    /// Look up one symbol's trading rules
    pub async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, RestError> {
        Ok(self.get().await?.symbol(symbol).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::events::{DepthSnapshot, OrderAck};
    use crate::execution::orders::NewOrderRequest;
    use crate::market::account::{Balance, Order, Position};
    use crate::market::candles::Candle;

    /// REST stub that counts metadata fetches
    struct CountingRest {
        fetches: AtomicU32,
    }

    #[async_trait]
    impl ExchangeRest for CountingRest {
        async fn depth_snapshot(&self, _: &str, _: u32) -> Result<DepthSnapshot, RestError> {
            Err(RestError::Parse("unused".into()))
        }
        async fn klines(&self, _: &str, _: u32, _: u32) -> Result<Vec<Candle>, RestError> {
            Ok(vec![])
        }
        async fn balances(&self) -> Result<Vec<Balance>, RestError> {
            Ok(vec![])
        }
        async fn position_risk(&self, _: &str) -> Result<Vec<Position>, RestError> {
            Ok(vec![])
        }
        async fn open_orders(&self, _: &str) -> Result<Vec<Order>, RestError> {
            Ok(vec![])
        }
        async fn exchange_metadata(&self) -> Result<ExchangeMetadata, RestError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ExchangeMetadata {
                symbols: vec![SymbolInfo {
                    symbol: "BTCUSDT".to_string(),
                    quote_asset: "USDT".to_string(),
                    tick_size: "0.10000000".to_string(),
                    step_size: "0.00100000".to_string(),
                }],
            })
        }
        async fn start_listen_session(&self) -> Result<String, RestError> {
            Ok("token".into())
        }
        async fn keepalive_listen_session(&self, _: &str) -> Result<(), RestError> {
            Ok(())
        }
        async fn submit_order(&self, _: NewOrderRequest) -> Result<OrderAck, RestError> {
            Err(RestError::Parse("unused".into()))
        }
        async fn set_leverage(&self, _: &str, _: u32) -> Result<(), RestError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metadata_fetched_once() {
        let rest = Arc::new(CountingRest {
            fetches: AtomicU32::new(0),
        });
        let cache = MetadataCache::new(rest.clone());

        assert!(cache.symbol_info("BTCUSDT").await.unwrap().is_some());
        assert!(cache.symbol_info("ETHUSDT").await.unwrap().is_none());
        cache.get().await.unwrap();

        assert_eq!(rest.fetches.load(Ordering::SeqCst), 1);
    }
}
