use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use crate::events::{DepthDiffEvent, DepthSnapshot};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookError {
    #[error("order book side is empty")]
    EmptyBook,
}

/// Net change of a single price level, exact decimal new minus old
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDelta {
    pub price: Decimal,
    pub change: Decimal,
}

/// Per-entry changes produced by one applied diff.
///
/// Returned by value so observers never read through shared mutable
/// component state.
#[derive(Debug, Clone, Default)]
pub struct AppliedDiff {
    pub bids: Vec<LevelDelta>,
    pub asks: Vec<LevelDelta>,
}

/// Result of applying one diff event
#[derive(Debug, Clone)]
pub enum DiffOutcome {
    /// Event applied; carries the per-entry deltas
    Applied(AppliedDiff),
    /// Event predates the snapshot; book unchanged
    Stale,
    /// First event after init starts past the snapshot; resync required
    GapOnInit,
    /// Event does not chain onto the last applied one; resync required
    OutOfSequence,
}

impl DiffOutcome {
    /// True for the outcomes only a full re-initialization can repair
    pub fn needs_resync(&self) -> bool {
        matches!(self, DiffOutcome::GapOnInit | DiffOutcome::OutOfSequence)
    }
}

/// Local mirror of one symbol's order book, kept consistent by chaining
/// diff events onto a REST snapshot.
///
/// Sides are ordered maps keyed by price, so prices stay unique and
/// sorted without an explicit re-sort pass. `last_update_id` only ever
/// increases; an event that cannot extend the chain leaves the book
/// untouched and the caller discards the whole book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    last_update_id: u64,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    first_diff_applied: bool,
}

impl OrderBook {
    /// Build a book from a REST depth snapshot
    pub fn from_snapshot(symbol: impl Into<String>, snapshot: &DepthSnapshot) -> Self {
        let mut book = OrderBook {
            symbol: symbol.into(),
            last_update_id: snapshot.last_update_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            first_diff_applied: false,
        };

        for [price, qty] in &snapshot.bids {
            if let (Ok(p), Ok(q)) = (Decimal::from_str(price), Decimal::from_str(qty))
                && !q.is_zero()
            {
                book.bids.insert(p, q);
            }
        }
        for [price, qty] in &snapshot.asks {
            if let (Ok(p), Ok(q)) = (Decimal::from_str(price), Decimal::from_str(qty))
                && !q.is_zero()
            {
                book.asks.insert(p, q);
            }
        }

        book
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Apply one diff event, enforcing the sequence-id chain
    pub fn apply_diff(&mut self, event: &DepthDiffEvent) -> DiffOutcome {
        if event.final_update_id < self.last_update_id {
            return DiffOutcome::Stale;
        }
        if !self.first_diff_applied && event.first_update_id > self.last_update_id + 1 {
            return DiffOutcome::GapOnInit;
        }
        if self.first_diff_applied && event.prev_final_update_id != self.last_update_id {
            return DiffOutcome::OutOfSequence;
        }

        let diff = AppliedDiff {
            bids: apply_side(&mut self.bids, &event.bids),
            asks: apply_side(&mut self.asks, &event.asks),
        };

        self.last_update_id = event.final_update_id;
        self.first_diff_applied = true;

        DiffOutcome::Applied(diff)
    }

    /// Lowest ask as (price, quantity)
    pub fn best_ask(&self) -> Result<(Decimal, Decimal), BookError> {
        self.asks
            .iter()
            .next()
            .map(|(p, q)| (*p, *q))
            .ok_or(BookError::EmptyBook)
    }

    /// Highest bid as (price, quantity)
    pub fn best_bid(&self) -> Result<(Decimal, Decimal), BookError> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| (*p, *q))
            .ok_or(BookError::EmptyBook)
    }

    /// Top `n` asks, ascending by price
    pub fn top_asks(&self, n: usize) -> Vec<(Decimal, Decimal)> {
        self.asks.iter().take(n).map(|(p, q)| (*p, *q)).collect()
    }

    /// Top `n` bids, descending by price
    pub fn top_bids(&self, n: usize) -> Vec<(Decimal, Decimal)> {
        self.bids
            .iter()
            .rev()
            .take(n)
            .map(|(p, q)| (*p, *q))
            .collect()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }
}

/// Upsert one side's entries; quantity zero removes the level.
/// Returns the per-entry deltas in event order.
fn apply_side(side: &mut BTreeMap<Decimal, Decimal>, entries: &[[String; 2]]) -> Vec<LevelDelta> {
    let mut deltas = Vec::with_capacity(entries.len());

    for [price, qty] in entries {
        let (Ok(price), Ok(qty)) = (Decimal::from_str(price), Decimal::from_str(qty)) else {
            continue;
        };

        let old = if qty.is_zero() {
            side.remove(&price).unwrap_or(Decimal::ZERO)
        } else {
            side.insert(price, qty).unwrap_or(Decimal::ZERO)
        };

        deltas.push(LevelDelta {
            price,
            change: qty - old,
        });
    }

    deltas
}
