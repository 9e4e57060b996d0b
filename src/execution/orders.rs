use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{OrderAck, Side};
use crate::ports::{ExchangeRest, RestError};
use crate::runtime::metadata::MetadataCache;

use super::filters::{FilterError, format_price, format_quantity};

#[derive(Error, Debug)]
pub enum OrderError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Gtx,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
            TimeInForce::Gtx => write!(f, "GTX"),
        }
    }
}

/// Fully formatted order request handed to the submission collaborator
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderKind,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(rename = "newClientOrderId")]
    pub client_order_id: String,
}

/// Builds exchange-legal orders for one symbol and forwards each
/// acknowledgement to the account reconciler.
///
/// Filters are resolved lazily through the shared metadata cache, so the
/// gateway can be handed to strategy hooks before the runtime launches.
pub struct OrderGateway {
    rest: Arc<dyn ExchangeRest>,
    metadata: Arc<MetadataCache>,
    symbol: String,
    acks: mpsc::Sender<OrderAck>,
}

impl OrderGateway {
    pub(crate) fn new(
        rest: Arc<dyn ExchangeRest>,
        metadata: Arc<MetadataCache>,
        symbol: String,
        acks: mpsc::Sender<OrderAck>,
    ) -> Self {
        OrderGateway {
            rest,
            metadata,
            symbol,
            acks,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Submit a market order for `quantity`, formatted to the step size
    pub async fn market_order(&self, side: Side, quantity: Decimal) -> Result<OrderAck, OrderError> {
        let info = self.symbol_info().await?;
        let request = NewOrderRequest {
            symbol: self.symbol.clone(),
            side,
            order_type: OrderKind::Market,
            time_in_force: None,
            quantity: format_quantity(quantity, &info)?,
            price: None,
            client_order_id: client_order_id(),
        };
        self.submit(request).await
    }

    /// Submit a GTC limit order, price and quantity formatted to the filters
    pub async fn limit_order(
        &self,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, OrderError> {
        let info = self.symbol_info().await?;
        let request = NewOrderRequest {
            symbol: self.symbol.clone(),
            side,
            order_type: OrderKind::Limit,
            time_in_force: Some(TimeInForce::Gtc),
            quantity: format_quantity(quantity, &info)?,
            price: Some(format_price(price, &info)?),
            client_order_id: client_order_id(),
        };
        self.submit(request).await
    }

    pub async fn set_leverage(&self, leverage: u32) -> Result<(), OrderError> {
        self.rest.set_leverage(&self.symbol, leverage).await?;
        Ok(())
    }

    async fn submit(&self, request: NewOrderRequest) -> Result<OrderAck, OrderError> {
        let ack = self.rest.submit_order(request).await?;
        tracing::info!(
            "{} order {} submitted: {} {}",
            self.symbol,
            ack.order_id,
            ack.side,
            ack.quantity
        );
        // No account capability installed means nobody is listening; fine.
        self.acks.send(ack.clone()).await.ok();
        Ok(ack)
    }

    async fn symbol_info(&self) -> Result<crate::execution::filters::SymbolInfo, OrderError> {
        self.metadata
            .symbol_info(&self.symbol)
            .await?
            .ok_or_else(|| OrderError::UnknownSymbol(self.symbol.clone()))
    }
}

fn client_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_exchange_field_names() {
        let request = NewOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderKind::Limit,
            time_in_force: Some(TimeInForce::Gtc),
            quantity: "1.234".to_string(),
            price: Some("12345.6".to_string()),
            client_order_id: "cid".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "LIMIT");
        assert_eq!(json["timeInForce"], "GTC");
        assert_eq!(json["newClientOrderId"], "cid");

        let market = NewOrderRequest {
            order_type: OrderKind::Market,
            time_in_force: None,
            price: None,
            ..request
        };
        let json = serde_json::to_value(&market).unwrap();
        assert!(json.get("price").is_none());
        assert!(json.get("timeInForce").is_none());
    }

    #[test]
    fn test_client_order_id_fits_exchange_limit() {
        let id = client_order_id();
        assert!(id.len() <= 36);
        assert!(!id.contains('-'));
    }
}
