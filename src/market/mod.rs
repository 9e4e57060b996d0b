//! State-synchronization engines.
//!
//! Each engine owns one slice of the mirrored exchange state and is
//! mutated only by its capability's task: the order book by depth diffs,
//! volume clusters by aggregated trades, the candle series by kline
//! updates, and the account state by user-data events.

pub mod account;
pub mod book;
pub mod candles;
pub mod clusters;

pub use account::{AccountState, Balance, Order, Position, PositionStatus};
pub use book::{AppliedDiff, BookError, DiffOutcome, LevelDelta, OrderBook};
pub use candles::{Candle, CandleSeries};
pub use clusters::{Cluster, PriceLevel, VolumeClusters};
