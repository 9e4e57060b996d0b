//! Ports for the external collaborators.
//!
//! The mirror core owns no transport: push feeds, REST queries and order
//! submission all arrive through these traits. Infrastructure implements
//! them for a real exchange ([`crate::infra`]); tests implement them
//! in-memory.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::events::{
    AggTradeEvent, DepthDiffEvent, DepthSnapshot, KlineEvent, OrderAck, UserDataEvent,
};
use crate::execution::filters::ExchangeMetadata;
use crate::execution::orders::NewOrderRequest;
use crate::market::account::{Balance, Order, Position};
use crate::market::candles::Candle;

#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("feed closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum RestError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {code}: {msg}")]
    Api { code: i32, msg: String },
    #[error("parse: {0}")]
    Parse(String),
}

/// One message on a subscription's event queue
#[derive(Debug)]
pub enum FeedMessage<E> {
    Event(E),
    /// Transport failure reported in-band; the stream is dead after this
    Failed(FeedError),
}

/// Consumer half of a push subscription.
///
/// Events arrive on a bounded queue; a full queue blocks the producer
/// (backpressure). [`Subscription::shutdown`] performs the teardown the
/// runtime relies on: signal stop, await the completion signal, then
/// drain whatever was still buffered.
pub struct Subscription<E> {
    events: mpsc::Receiver<FeedMessage<E>>,
    stop: watch::Sender<bool>,
    done: Option<oneshot::Receiver<()>>,
}

/// Producer half handed to a feed implementation
pub struct SubscriptionSender<E> {
    pub events: mpsc::Sender<FeedMessage<E>>,
    pub stop: watch::Receiver<bool>,
    pub done: oneshot::Sender<()>,
}

impl<E> Subscription<E> {
    /// Create a linked producer/consumer pair with a bounded event queue
    pub fn channel(capacity: usize) -> (SubscriptionSender<E>, Subscription<E>) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();

        (
            SubscriptionSender {
                events: event_tx,
                stop: stop_rx,
                done: done_tx,
            },
            Subscription {
                events: event_rx,
                stop: stop_tx,
                done: Some(done_rx),
            },
        )
    }

    /// Receive the next message; `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<FeedMessage<E>> {
        self.events.recv().await
    }

    /// Take one buffered message without waiting
    pub fn try_next(&mut self) -> Option<FeedMessage<E>> {
        self.events.try_recv().ok()
    }

    /// Tear down: signal stop, await completion, drain the queue
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(done) = self.done.take() {
            let _ = done.await;
        }
        while self.events.try_recv().is_ok() {}
    }
}

/// Push-feed provider: one cancellable subscription per capability
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Depth diff stream with a caller-chosen queue bound
    async fn depth_diffs(
        &self,
        symbol: &str,
        queue: usize,
    ) -> Result<Subscription<DepthDiffEvent>, FeedError>;

    async fn agg_trades(&self, symbol: &str) -> Result<Subscription<AggTradeEvent>, FeedError>;

    async fn klines(
        &self,
        symbol: &str,
        interval_minutes: u32,
    ) -> Result<Subscription<KlineEvent>, FeedError>;

    /// User-data stream bound to a listen-session token
    async fn user_data(&self, listen_token: &str) -> Result<Subscription<UserDataEvent>, FeedError>;
}

/// REST collaborator: snapshots, account queries, sessions, submission
#[async_trait]
pub trait ExchangeRest: Send + Sync {
    async fn depth_snapshot(&self, symbol: &str, limit: u32) -> Result<DepthSnapshot, RestError>;

    async fn klines(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> Result<Vec<Candle>, RestError>;

    async fn balances(&self) -> Result<Vec<Balance>, RestError>;

    async fn position_risk(&self, symbol: &str) -> Result<Vec<Position>, RestError>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>, RestError>;

    async fn exchange_metadata(&self) -> Result<ExchangeMetadata, RestError>;

    async fn start_listen_session(&self) -> Result<String, RestError>;

    async fn keepalive_listen_session(&self, token: &str) -> Result<(), RestError>;

    async fn submit_order(&self, request: NewOrderRequest) -> Result<OrderAck, RestError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), RestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_shutdown_signals_and_drains() {
        let (sender, sub) = Subscription::<u32>::channel(4);

        sender.events.send(FeedMessage::Event(1)).await.unwrap();
        sender.events.send(FeedMessage::Event(2)).await.unwrap();

        let mut stop = sender.stop.clone();
        let done = sender.done;
        let producer = tokio::spawn(async move {
            stop.changed().await.unwrap();
            let _ = done.send(());
        });

        sub.shutdown().await;
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_recv_order() {
        let (sender, mut sub) = Subscription::<u32>::channel(4);
        sender.events.send(FeedMessage::Event(7)).await.unwrap();
        drop(sender);

        match sub.recv().await {
            Some(FeedMessage::Event(7)) => {}
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(sub.recv().await.is_none());
    }
}
