use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::str::FromStr;

use crate::events::{DepthSnapshot, OrderAck};
use crate::execution::filters::{ExchangeMetadata, SymbolInfo};
use crate::execution::orders::NewOrderRequest;
use crate::market::account::{Balance, Order, Position};
use crate::market::candles::Candle;
use crate::ports::{ExchangeRest, RestError};

type HmacSha256 = Hmac<Sha256>;

/// REST client for a USDS-M futures endpoint.
///
/// Public market-data endpoints go out unsigned; account endpoints get a
/// timestamp plus an HMAC-SHA256 signature over the query string.
#[derive(Clone)]
pub struct BinanceRest {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceRest {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        BinanceRest {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Client against the production futures endpoint
    pub fn futures(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self::new("https://fapi.binance.com", api_key, api_secret)
    }

    fn sign(&self, query: &str) -> Result<String, RestError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| RestError::Parse("api secret unusable as HMAC key".to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, query: &str) -> Result<String, RestError> {
        let mut query = query.to_string();
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={}", Utc::now().timestamp_millis()));
        let signature = self.sign(&query)?;
        query.push_str(&format!("&signature={}", signature));
        Ok(query)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, RestError> {
        let url = self.url(path, query);
        let request = self.client.get(&url);
        self.send(request).await
    }

    async fn get_signed<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, RestError> {
        let url = self.url(path, &self.signed_query(query)?);
        let request = self.client.get(&url);
        self.send(request).await
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, RestError> {
        let url = self.url(path, &self.signed_query(query)?);
        let request = self.client.post(&url);
        self.send(request).await
    }

    async fn post_keyed<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, RestError> {
        let url = self.url(path, query);
        let request = self.client.post(&url);
        self.send(request).await
    }

    async fn put_keyed<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, RestError> {
        let url = self.url(path, query);
        let request = self.client.put(&url);
        self.send(request).await
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RestError> {
        let response = request
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&text) {
                return Err(RestError::Api {
                    code: err.code,
                    msg: err.msg,
                });
            }
            return Err(RestError::Parse(format!("HTTP {}: {}", status, text)));
        }

        serde_json::from_str(&text).map_err(|e| RestError::Parse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: i32,
    msg: String,
}

#[derive(Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

/// Kline row as the exchange returns it: a 12-element JSON array
type KlineRow = (
    i64,    // open time
    String, // open
    String, // high
    String, // low
    String, // close
    String, // volume
    i64,    // close time
    String, // quote volume
    i64,    // trade count
    String, // taker buy base volume
    String, // taker buy quote volume
    String, // ignore
);

fn candle_from_row(row: KlineRow) -> Result<Candle, RestError> {
    let parse =
        |s: &str| Decimal::from_str(s).map_err(|e| RestError::Parse(format!("kline field: {}", e)));
    Ok(Candle {
        open_time: row.0,
        close_time: row.6,
        open: parse(&row.1)?,
        high: parse(&row.2)?,
        low: parse(&row.3)?,
        close: parse(&row.4)?,
        volume: parse(&row.5)?,
        trade_count: row.8,
        taker_buy_volume: parse(&row.9)?,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(default)]
    quote_asset: String,
    #[serde(default)]
    filters: Vec<ExchangeInfoFilter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfoFilter {
    filter_type: String,
    #[serde(default)]
    tick_size: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
}

impl From<ExchangeInfoSymbol> for SymbolInfo {
    fn from(symbol: ExchangeInfoSymbol) -> Self {
        let mut tick_size = String::new();
        let mut step_size = String::new();
        for filter in symbol.filters {
            match filter.filter_type.as_str() {
                "PRICE_FILTER" => tick_size = filter.tick_size.unwrap_or_default(),
                "LOT_SIZE" => step_size = filter.step_size.unwrap_or_default(),
                _ => {}
            }
        }
        SymbolInfo {
            symbol: symbol.symbol,
            quote_asset: symbol.quote_asset,
            tick_size,
            step_size,
        }
    }
}

#[async_trait]
impl ExchangeRest for BinanceRest {
    async fn depth_snapshot(&self, symbol: &str, limit: u32) -> Result<DepthSnapshot, RestError> {
        self.get(
            "/fapi/v1/depth",
            &format!("symbol={}&limit={}", symbol, limit),
        )
        .await
    }

    async fn klines(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> Result<Vec<Candle>, RestError> {
        let rows: Vec<KlineRow> = self
            .get(
                "/fapi/v1/klines",
                &format!("symbol={}&interval={}m&limit={}", symbol, interval_minutes, limit),
            )
            .await?;
        rows.into_iter().map(candle_from_row).collect()
    }

    async fn balances(&self) -> Result<Vec<Balance>, RestError> {
        self.get_signed("/fapi/v2/balance", "").await
    }

    async fn position_risk(&self, symbol: &str) -> Result<Vec<Position>, RestError> {
        self.get_signed("/fapi/v2/positionRisk", &format!("symbol={}", symbol))
            .await
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>, RestError> {
        self.get_signed("/fapi/v1/openOrders", &format!("symbol={}", symbol))
            .await
    }

    async fn exchange_metadata(&self) -> Result<ExchangeMetadata, RestError> {
        let info: ExchangeInfoResponse = self.get("/fapi/v1/exchangeInfo", "").await?;
        Ok(ExchangeMetadata {
            symbols: info.symbols.into_iter().map(SymbolInfo::from).collect(),
        })
    }

    async fn start_listen_session(&self) -> Result<String, RestError> {
        let response: ListenKeyResponse = self.post_keyed("/fapi/v1/listenKey", "").await?;
        Ok(response.listen_key)
    }

    async fn keepalive_listen_session(&self, _token: &str) -> Result<(), RestError> {
        // The endpoint renews the key bound to the API key; no token param
        let _: serde_json::Value = self.put_keyed("/fapi/v1/listenKey", "").await?;
        Ok(())
    }

    async fn submit_order(&self, request: NewOrderRequest) -> Result<OrderAck, RestError> {
        let mut query = format!(
            "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}",
            request.symbol, request.side, request.order_type, request.quantity,
            request.client_order_id,
        );
        if let Some(price) = &request.price {
            query.push_str(&format!("&price={}", price));
        }
        if let Some(tif) = request.time_in_force {
            query.push_str(&format!("&timeInForce={}", tif));
        }
        self.post_signed("/fapi/v1/order", &query).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), RestError> {
        let _: serde_json::Value = self
            .post_signed(
                "/fapi/v1/leverage",
                &format!("symbol={}&leverage={}", symbol, leverage),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_stable_hex() {
        let rest = BinanceRest::new("http://localhost", "key", "secret");
        let sig = rest.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        // Same input, same signature
        assert_eq!(sig, rest.sign("symbol=BTCUSDT&timestamp=1").unwrap());
    }

    #[test]
    fn test_kline_row_conversion() {
        let row: KlineRow = (
            1000,
            "100.1".into(),
            "110.0".into(),
            "99.0".into(),
            "105.5".into(),
            "12.5".into(),
            1999,
            "1300.0".into(),
            42,
            "6.25".into(),
            "650.0".into(),
            "0".into(),
        );
        let candle = candle_from_row(row).unwrap();
        assert_eq!(candle.open_time, 1000);
        assert_eq!(candle.close_time, 1999);
        assert_eq!(candle.trade_count, 42);
        assert_eq!(candle.taker_buy_volume, Decimal::from_str("6.25").unwrap());
    }

    #[test]
    fn test_exchange_info_filter_extraction() {
        let dto = ExchangeInfoSymbol {
            symbol: "BTCUSDT".to_string(),
            quote_asset: "USDT".to_string(),
            filters: vec![
                ExchangeInfoFilter {
                    filter_type: "PRICE_FILTER".to_string(),
                    tick_size: Some("0.10".to_string()),
                    step_size: None,
                },
                ExchangeInfoFilter {
                    filter_type: "LOT_SIZE".to_string(),
                    tick_size: None,
                    step_size: Some("0.001".to_string()),
                },
                ExchangeInfoFilter {
                    filter_type: "MARKET_LOT_SIZE".to_string(),
                    tick_size: None,
                    step_size: Some("0.01".to_string()),
                },
            ],
        };

        let info = SymbolInfo::from(dto);
        assert_eq!(info.tick_size, "0.10");
        assert_eq!(info.step_size, "0.001");
    }
}
