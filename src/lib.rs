//! Hermes keeps a correct, continuously updated in-memory mirror of
//! exchange market and account state from incremental push events, and
//! supervises that consumption so transient faults self-heal without
//! corrupting the mirror.
//!
//! A strategy composes any subset of four capabilities (account,
//! order book, volume clusters, candles) on [`StrategyBuilder`]; each
//! runs on its own task, owns its engine, and recovers independently.

pub mod clock;
pub mod config;
pub mod events;
pub mod execution;
pub mod infra;
pub mod market;
pub mod ports;
pub mod runtime;

// Re-export the surface a strategy author touches
pub use clock::{Clock, SystemClock};
pub use config::{AgentConfig, ConfigError, load_config};
pub use events::{OrderAck, OrderStatus, Side};
pub use execution::{
    FilterError, NewOrderRequest, OrderError, OrderGateway, OrderKind, SymbolInfo, TimeInForce,
};
pub use market::{
    AccountState, AppliedDiff, BookError, Candle, CandleSeries, DiffOutcome, OrderBook,
    PositionStatus, VolumeClusters,
};
pub use ports::{ExchangeRest, FeedError, FeedMessage, MarketFeed, RestError, Subscription};
pub use runtime::{
    AccountCapability, CandleCapability, Capability, ClusterCapability, LaunchError, Lifecycle,
    OrderBookCapability, StrategyBuilder, Supervisor,
};
