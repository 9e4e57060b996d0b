//! Strategy runtime: capability composition, lifecycle supervision and
//! the two process-wide resources (metadata cache, listen session).

pub mod capability;
pub mod lifecycle;
pub mod metadata;
pub mod session;
pub mod supervisor;

pub use capability::{
    AccountCapability, AccountHandler, CandleCapability, CandleHandler, Capability,
    ClusterCapability, ClusterHandler, DepthHandler, OrderBookCapability,
};
pub use lifecycle::Lifecycle;
pub use metadata::MetadataCache;
pub use session::{ListenSession, RENEWAL_PERIOD};
pub use supervisor::{LaunchError, StrategyBuilder, Supervisor};
