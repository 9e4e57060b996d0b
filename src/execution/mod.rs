//! Order preparation: filter-aware precision formatting and the gateway
//! that turns strategy intents into exchange-legal requests.

pub mod filters;
pub mod orders;

pub use filters::{ExchangeMetadata, FilterError, SymbolInfo, format_price, format_quantity};
pub use orders::{NewOrderRequest, OrderError, OrderGateway, OrderKind, TimeInForce};
