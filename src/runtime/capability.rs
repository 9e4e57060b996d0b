//! Capability composition.
//!
//! A strategy is the subset of capabilities it installs on the builder:
//! each one pairs its tuning knobs with an update hook, and an absent
//! capability is simply never driven. This replaces structural mixin
//! dispatch with explicit optional fields.

use std::fmt;

use crate::market::account::AccountState;
use crate::market::book::{AppliedDiff, OrderBook};
use crate::market::candles::CandleSeries;
use crate::market::clusters::VolumeClusters;

/// The four independently installable behavior units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Account,
    OrderBook,
    Clusters,
    Candles,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Account => "account",
            Capability::OrderBook => "order-book",
            Capability::Clusters => "clusters",
            Capability::Candles => "candles",
        };
        write!(f, "{}", name)
    }
}

/// Hook fired after each applied user-data event
pub trait AccountHandler: Send + Sync {
    fn on_account_update(&mut self, account: &AccountState);
}

impl<F> AccountHandler for F
where
    F: FnMut(&AccountState) + Send + Sync,
{
    fn on_account_update(&mut self, account: &AccountState) {
        self(account)
    }
}

/// Hook fired after each applied depth diff batch, with the fully
/// updated book and the batch's last per-entry deltas
pub trait DepthHandler: Send + Sync {
    fn on_depth_update(&mut self, book: &OrderBook, diff: &AppliedDiff);
}

impl<F> DepthHandler for F
where
    F: FnMut(&OrderBook, &AppliedDiff) + Send + Sync,
{
    fn on_depth_update(&mut self, book: &OrderBook, diff: &AppliedDiff) {
        self(book, diff)
    }
}

/// Hook fired after each accumulated trade
pub trait ClusterHandler: Send + Sync {
    fn on_cluster_update(&mut self, clusters: &VolumeClusters);
}

impl<F> ClusterHandler for F
where
    F: FnMut(&VolumeClusters) + Send + Sync,
{
    fn on_cluster_update(&mut self, clusters: &VolumeClusters) {
        self(clusters)
    }
}

/// Hook fired after each merged candle update
pub trait CandleHandler: Send + Sync {
    fn on_candle_update(&mut self, candles: &CandleSeries);
}

impl<F> CandleHandler for F
where
    F: FnMut(&CandleSeries) + Send + Sync,
{
    fn on_candle_update(&mut self, candles: &CandleSeries) {
        self(candles)
    }
}

/// Account mirroring over the user-data stream
pub struct AccountCapability {
    /// Asset whose balance is tracked; defaults to the symbol's quote asset
    pub asset: Option<String>,
    pub handler: Box<dyn AccountHandler>,
}

impl AccountCapability {
    pub fn new(handler: impl AccountHandler + 'static) -> Self {
        AccountCapability {
            asset: None,
            handler: Box::new(handler),
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }
}

/// Order-book mirroring over the depth-diff stream
pub struct OrderBookCapability {
    /// Depth of the initial REST snapshot
    pub depth_limit: u32,
    /// Bound of the diff queue; a full queue backpressures the feed
    pub queue_size: usize,
    pub handler: Box<dyn DepthHandler>,
}

impl OrderBookCapability {
    pub fn new(handler: impl DepthHandler + 'static) -> Self {
        OrderBookCapability {
            depth_limit: 1000,
            queue_size: 10,
            handler: Box::new(handler),
        }
    }

    pub fn with_depth_limit(mut self, limit: u32) -> Self {
        self.depth_limit = limit;
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }
}

/// Volume-profile aggregation over the aggregated-trade stream
pub struct ClusterCapability {
    pub timeframe_minutes: u32,
    pub handler: Box<dyn ClusterHandler>,
}

impl ClusterCapability {
    pub fn new(timeframe_minutes: u32, handler: impl ClusterHandler + 'static) -> Self {
        ClusterCapability {
            timeframe_minutes,
            handler: Box::new(handler),
        }
    }
}

/// Candle-series maintenance over the kline stream
pub struct CandleCapability {
    pub interval_minutes: u32,
    /// How many closed candles seed the series at init
    pub seed_limit: u32,
    pub handler: Box<dyn CandleHandler>,
}

impl CandleCapability {
    pub fn new(interval_minutes: u32, handler: impl CandleHandler + 'static) -> Self {
        CandleCapability {
            interval_minutes,
            seed_limit: 100,
            handler: Box::new(handler),
        }
    }

    pub fn with_seed_limit(mut self, limit: u32) -> Self {
        self.seed_limit = limit;
        self
    }
}
