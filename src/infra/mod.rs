//! Concrete collaborators for a real exchange endpoint.

pub mod rest;
pub mod ws;

pub use rest::BinanceRest;
pub use ws::BinanceFeed;
