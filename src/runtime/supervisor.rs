//! Strategy runtime: one task per installed capability, each owning its
//! engine and recovering it independently.
//!
//! Startup initialization errors propagate to the caller and the strategy
//! never activates. After launch, faults are handled inside the runners:
//! tear down the subscription (stop, await completion, drain), drop the
//! engine state, re-run initialization. Exhausting the retry budget while
//! recovering parks the capability in `Fatal`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::events::{
    AggTradeEvent, DepthDiffEvent, KlineEvent, OrderAck, UserDataEvent,
};
use crate::execution::orders::OrderGateway;
use crate::market::account::AccountState;
use crate::market::book::{DiffOutcome, OrderBook};
use crate::market::candles::{Candle, CandleSeries};
use crate::market::clusters::VolumeClusters;
use crate::ports::{ExchangeRest, FeedError, FeedMessage, MarketFeed, RestError, Subscription};

use super::capability::{
    AccountCapability, AccountHandler, CandleCapability, CandleHandler, Capability,
    ClusterCapability, ClusterHandler, DepthHandler, OrderBookCapability,
};
use super::lifecycle::Lifecycle;
use super::metadata::MetadataCache;
use super::session::{ListenSession, RENEWAL_PERIOD};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Composes capabilities into a launchable strategy runtime
pub struct StrategyBuilder {
    rest: Arc<dyn ExchangeRest>,
    feed: Arc<dyn MarketFeed>,
    clock: Arc<dyn Clock>,
    metadata: Arc<MetadataCache>,
    symbol: String,
    retry_budget: u32,
    account: Option<AccountCapability>,
    order_book: Option<OrderBookCapability>,
    clusters: Option<ClusterCapability>,
    candles: Option<CandleCapability>,
    gateway: Arc<OrderGateway>,
    ack_rx: mpsc::Receiver<OrderAck>,
    activated: Arc<AtomicBool>,
}

impl StrategyBuilder {
    pub fn new(
        rest: Arc<dyn ExchangeRest>,
        feed: Arc<dyn MarketFeed>,
        symbol: impl Into<String>,
    ) -> Self {
        let symbol = symbol.into().to_uppercase();
        let metadata = Arc::new(MetadataCache::new(rest.clone()));
        let (ack_tx, ack_rx) = mpsc::channel(32);
        let gateway = Arc::new(OrderGateway::new(
            rest.clone(),
            metadata.clone(),
            symbol.clone(),
            ack_tx,
        ));

        StrategyBuilder {
            rest,
            feed,
            clock: Arc::new(SystemClock),
            metadata,
            symbol,
            retry_budget: 1,
            account: None,
            order_book: None,
            clusters: None,
            candles: None,
            gateway,
            ack_rx,
            activated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the wall clock (volume-profile windowing)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Re-initialization attempts allowed per recovery before `Fatal`
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget.max(1);
        self
    }

    pub fn with_account(mut self, capability: AccountCapability) -> Self {
        self.account = Some(capability);
        self
    }

    pub fn with_order_book(mut self, capability: OrderBookCapability) -> Self {
        self.order_book = Some(capability);
        self
    }

    pub fn with_clusters(mut self, capability: ClusterCapability) -> Self {
        self.clusters = Some(capability);
        self
    }

    pub fn with_candles(mut self, capability: CandleCapability) -> Self {
        self.candles = Some(capability);
        self
    }

    /// Order gateway for this symbol; clone into hooks before launch
    pub fn gateway(&self) -> Arc<OrderGateway> {
        self.gateway.clone()
    }

    /// Initialize every installed capability and start its task.
    ///
    /// Runs each capability's first initialization inline: any failure
    /// tears down whatever already started and is returned to the caller.
    pub async fn launch(mut self) -> Result<Supervisor, LaunchError> {
        let info = self
            .metadata
            .symbol_info(&self.symbol)
            .await?
            .ok_or_else(|| LaunchError::UnknownSymbol(self.symbol.clone()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut supervisor = Supervisor {
            activated: self.activated.clone(),
            shutdown: shutdown_tx,
            gateway: self.gateway.clone(),
            runners: Vec::new(),
            renewal: None,
            _shutdown_rx: shutdown_rx.clone(),
        };

        if let Some(capability) = self.account.take() {
            let session = match ListenSession::acquire(self.rest.clone()).await {
                Ok(session) => session,
                Err(err) => {
                    supervisor.abort().await;
                    return Err(err.into());
                }
            };
            supervisor.renewal =
                Some(session.clone().spawn_renewal(RENEWAL_PERIOD, shutdown_rx.clone()));

            let asset = capability
                .asset
                .unwrap_or_else(|| info.quote_asset.clone());
            let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Uninitialized);
            let runner = AccountRunner {
                symbol: self.symbol.clone(),
                asset,
                rest: self.rest.clone(),
                feed: self.feed.clone(),
                session,
                handler: capability.handler,
                activated: self.activated.clone(),
                lifecycle: lifecycle_tx,
                retry_budget: self.retry_budget,
                acks: self.ack_rx,
            };

            match runner.init().await {
                Ok((state, sub)) => {
                    runner.lifecycle.send_replace(Lifecycle::Live);
                    let stop = shutdown_rx.clone();
                    let task = tokio::spawn(async move { runner.run(state, sub, stop).await });
                    supervisor.runners.push(RunnerHandle {
                        capability: Capability::Account,
                        lifecycle: lifecycle_rx,
                        task,
                    });
                }
                Err(err) => {
                    supervisor.abort().await;
                    return Err(err);
                }
            }
        }

        if let Some(capability) = self.order_book.take() {
            let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Uninitialized);
            let runner = BookRunner {
                symbol: self.symbol.clone(),
                depth_limit: capability.depth_limit,
                queue_size: capability.queue_size,
                rest: self.rest.clone(),
                feed: self.feed.clone(),
                handler: capability.handler,
                activated: self.activated.clone(),
                lifecycle: lifecycle_tx,
                retry_budget: self.retry_budget,
            };

            match runner.init().await {
                Ok((book, sub)) => {
                    runner.lifecycle.send_replace(Lifecycle::Live);
                    let stop = shutdown_rx.clone();
                    let task = tokio::spawn(async move { runner.run(book, sub, stop).await });
                    supervisor.runners.push(RunnerHandle {
                        capability: Capability::OrderBook,
                        lifecycle: lifecycle_rx,
                        task,
                    });
                }
                Err(err) => {
                    supervisor.abort().await;
                    return Err(err);
                }
            }
        }

        if let Some(capability) = self.clusters.take() {
            let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Uninitialized);
            let runner = ClusterRunner {
                symbol: self.symbol.clone(),
                timeframe_minutes: capability.timeframe_minutes,
                feed: self.feed.clone(),
                clock: self.clock.clone(),
                handler: capability.handler,
                activated: self.activated.clone(),
                lifecycle: lifecycle_tx,
                retry_budget: self.retry_budget,
            };

            match runner.init().await {
                Ok((clusters, sub)) => {
                    runner.lifecycle.send_replace(Lifecycle::Live);
                    let stop = shutdown_rx.clone();
                    let task = tokio::spawn(async move { runner.run(clusters, sub, stop).await });
                    supervisor.runners.push(RunnerHandle {
                        capability: Capability::Clusters,
                        lifecycle: lifecycle_rx,
                        task,
                    });
                }
                Err(err) => {
                    supervisor.abort().await;
                    return Err(err);
                }
            }
        }

        if let Some(capability) = self.candles.take() {
            let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Uninitialized);
            let runner = CandleRunner {
                symbol: self.symbol.clone(),
                interval_minutes: capability.interval_minutes,
                seed_limit: capability.seed_limit,
                rest: self.rest.clone(),
                feed: self.feed.clone(),
                handler: capability.handler,
                activated: self.activated.clone(),
                lifecycle: lifecycle_tx,
                retry_budget: self.retry_budget,
            };

            match runner.init().await {
                Ok((series, sub)) => {
                    runner.lifecycle.send_replace(Lifecycle::Live);
                    let stop = shutdown_rx.clone();
                    let task = tokio::spawn(async move { runner.run(series, sub, stop).await });
                    supervisor.runners.push(RunnerHandle {
                        capability: Capability::Candles,
                        lifecycle: lifecycle_rx,
                        task,
                    });
                }
                Err(err) => {
                    supervisor.abort().await;
                    return Err(err);
                }
            }
        }

        tracing::info!("{} strategy launched", self.symbol);
        Ok(supervisor)
    }
}

struct RunnerHandle {
    capability: Capability,
    lifecycle: watch::Receiver<Lifecycle>,
    task: JoinHandle<()>,
}

/// Handle over the running strategy
pub struct Supervisor {
    activated: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    gateway: Arc<OrderGateway>,
    runners: Vec<RunnerHandle>,
    renewal: Option<JoinHandle<()>>,
    // Keeps the shutdown channel open even with no capabilities installed
    _shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    /// Start invoking strategy hooks. Until this is called, engines sync
    /// silently.
    pub fn activate(&self) {
        self.activated.store(true, Ordering::SeqCst);
        tracing::info!("strategy activated");
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Current lifecycle of one capability; `None` if not installed
    pub fn lifecycle(&self, capability: Capability) -> Option<Lifecycle> {
        self.runners
            .iter()
            .find(|r| r.capability == capability)
            .map(|r| *r.lifecycle.borrow())
    }

    /// Watch a capability's lifecycle transitions
    pub fn watch_lifecycle(&self, capability: Capability) -> Option<watch::Receiver<Lifecycle>> {
        self.runners
            .iter()
            .find(|r| r.capability == capability)
            .map(|r| r.lifecycle.clone())
    }

    pub fn gateway(&self) -> Arc<OrderGateway> {
        self.gateway.clone()
    }

    /// Stop every installed capability and await each completion
    pub async fn shutdown(mut self) {
        self.abort().await;
    }

    async fn abort(&mut self) {
        let _ = self.shutdown.send(true);
        for handle in self.runners.drain(..) {
            if handle.task.await.is_err() {
                tracing::error!("{} task panicked during shutdown", handle.capability);
            }
        }
        if let Some(renewal) = self.renewal.take() {
            let _ = renewal.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Order book capability
// ---------------------------------------------------------------------------

struct BookRunner {
    symbol: String,
    depth_limit: u32,
    queue_size: usize,
    rest: Arc<dyn ExchangeRest>,
    feed: Arc<dyn MarketFeed>,
    handler: Box<dyn DepthHandler>,
    activated: Arc<AtomicBool>,
    lifecycle: watch::Sender<Lifecycle>,
    retry_budget: u32,
}

impl BookRunner {
    /// Subscribe first so diffs buffer while the snapshot is in flight
    async fn init(&self) -> Result<(OrderBook, Subscription<DepthDiffEvent>), LaunchError> {
        self.lifecycle.send_replace(Lifecycle::Initializing);

        let sub = self.feed.depth_diffs(&self.symbol, self.queue_size).await?;
        let snapshot = match self.rest.depth_snapshot(&self.symbol, self.depth_limit).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                sub.shutdown().await;
                return Err(err.into());
            }
        };

        tracing::info!(
            "{} order book initialized at update id {}",
            self.symbol,
            snapshot.last_update_id
        );
        Ok((OrderBook::from_snapshot(self.symbol.as_str(), &snapshot), sub))
    }

    async fn run(
        mut self,
        mut book: OrderBook,
        mut sub: Subscription<DepthDiffEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    sub.shutdown().await;
                    return;
                }
                msg = sub.recv() => {
                    let fault = match msg {
                        Some(FeedMessage::Event(event)) => self.apply_batch(&mut book, event, &mut sub),
                        Some(FeedMessage::Failed(err)) => {
                            tracing::error!("{} depth stream error: {}", self.symbol, err);
                            true
                        }
                        None => {
                            tracing::error!("{} depth stream closed", self.symbol);
                            true
                        }
                    };

                    if fault {
                        match self.recover(sub).await {
                            Some((new_book, new_sub)) => {
                                book = new_book;
                                sub = new_sub;
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    }

    /// Drain the whole queue before judging the outcome; the reported
    /// status reflects only the last diff applied in the batch.
    fn apply_batch(
        &mut self,
        book: &mut OrderBook,
        first: DepthDiffEvent,
        sub: &mut Subscription<DepthDiffEvent>,
    ) -> bool {
        let mut outcome = book.apply_diff(&first);
        while let Some(msg) = sub.try_next() {
            match msg {
                FeedMessage::Event(event) => outcome = book.apply_diff(&event),
                FeedMessage::Failed(err) => {
                    tracing::error!("{} depth stream error: {}", self.symbol, err);
                    return true;
                }
            }
        }

        match outcome {
            DiffOutcome::Applied(diff) => {
                if self.activated.load(Ordering::SeqCst) {
                    self.handler.on_depth_update(book, &diff);
                }
                false
            }
            DiffOutcome::Stale => false,
            DiffOutcome::GapOnInit | DiffOutcome::OutOfSequence => {
                tracing::error!(
                    "{} order book inconsistent at update id {}, resyncing",
                    self.symbol,
                    book.last_update_id()
                );
                true
            }
        }
    }

    async fn recover(
        &mut self,
        sub: Subscription<DepthDiffEvent>,
    ) -> Option<(OrderBook, Subscription<DepthDiffEvent>)> {
        self.lifecycle.send_replace(Lifecycle::Error);
        sub.shutdown().await;
        self.lifecycle.send_replace(Lifecycle::Recovering);

        for attempt in 1..=self.retry_budget {
            match self.init().await {
                Ok(pair) => {
                    self.lifecycle.send_replace(Lifecycle::Live);
                    tracing::info!("{} order book recovered", self.symbol);
                    return Some(pair);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} order book reinit attempt {}/{} failed: {}",
                        self.symbol,
                        attempt,
                        self.retry_budget,
                        err
                    );
                }
            }
        }

        tracing::error!("{} order book recovery exhausted, going fatal", self.symbol);
        self.lifecycle.send_replace(Lifecycle::Fatal);
        None
    }
}

// ---------------------------------------------------------------------------
// Account capability
// ---------------------------------------------------------------------------

struct AccountRunner {
    symbol: String,
    asset: String,
    rest: Arc<dyn ExchangeRest>,
    feed: Arc<dyn MarketFeed>,
    session: Arc<ListenSession>,
    handler: Box<dyn AccountHandler>,
    activated: Arc<AtomicBool>,
    lifecycle: watch::Sender<Lifecycle>,
    retry_budget: u32,
    acks: mpsc::Receiver<OrderAck>,
}

impl AccountRunner {
    async fn init(&self) -> Result<(AccountState, Subscription<UserDataEvent>), LaunchError> {
        self.lifecycle.send_replace(Lifecycle::Initializing);

        let token = self.session.token();
        let sub = self.feed.user_data(&token).await?;

        let state = match self.fetch_state().await {
            Ok(state) => state,
            Err(err) => {
                sub.shutdown().await;
                return Err(err);
            }
        };

        tracing::info!("{} account initialized", self.symbol);
        Ok((state, sub))
    }

    async fn fetch_state(&self) -> Result<AccountState, LaunchError> {
        let balances = self.rest.balances().await?;
        let positions = self.rest.position_risk(&self.symbol).await?;
        let orders = self.rest.open_orders(&self.symbol).await?;
        Ok(AccountState::new(
            self.symbol.as_str(),
            self.asset.as_str(),
            balances,
            positions,
            orders,
        ))
    }

    async fn run(
        mut self,
        mut state: AccountState,
        mut sub: Subscription<UserDataEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut acks_open = true;

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    sub.shutdown().await;
                    return;
                }
                ack = self.acks.recv(), if acks_open => {
                    match ack {
                        Some(ack) => state.create_order_update(&ack),
                        None => acks_open = false,
                    }
                }
                msg = sub.recv() => {
                    let fault = match msg {
                        Some(FeedMessage::Event(event)) => self.apply_event(&mut state, event),
                        Some(FeedMessage::Failed(err)) => {
                            tracing::error!("{} user data stream error: {}", self.symbol, err);
                            Some(false)
                        }
                        None => {
                            tracing::error!("{} user data stream closed", self.symbol);
                            Some(false)
                        }
                    };

                    if let Some(expired) = fault {
                        match self.recover(sub, expired).await {
                            Some((new_state, new_sub)) => {
                                state = new_state;
                                sub = new_sub;
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    }

    /// Apply one user-data event. `Some(expired)` demands a reinit.
    fn apply_event(&mut self, state: &mut AccountState, event: UserDataEvent) -> Option<bool> {
        match event {
            UserDataEvent::AccountUpdate { update } => {
                state.account_update(&update);
            }
            UserDataEvent::OrderTradeUpdate { update } => {
                state.order_update(&update);
            }
            UserDataEvent::ListenKeyExpired => {
                tracing::warn!("{} listen session expired", self.symbol);
                return Some(true);
            }
        }

        if self.activated.load(Ordering::SeqCst) {
            self.handler.on_account_update(state);
        }
        None
    }

    async fn recover(
        &mut self,
        sub: Subscription<UserDataEvent>,
        expired: bool,
    ) -> Option<(AccountState, Subscription<UserDataEvent>)> {
        self.lifecycle.send_replace(Lifecycle::Error);
        sub.shutdown().await;
        self.lifecycle.send_replace(Lifecycle::Recovering);

        for attempt in 1..=self.retry_budget {
            // An expired token is gone for good; issue a new one first
            if expired && let Err(err) = self.session.refresh().await {
                tracing::warn!(
                    "{} listen session refresh attempt {}/{} failed: {}",
                    self.symbol,
                    attempt,
                    self.retry_budget,
                    err
                );
                continue;
            }

            match self.init().await {
                Ok(pair) => {
                    self.lifecycle.send_replace(Lifecycle::Live);
                    tracing::info!("{} account recovered", self.symbol);
                    return Some(pair);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} account reinit attempt {}/{} failed: {}",
                        self.symbol,
                        attempt,
                        self.retry_budget,
                        err
                    );
                }
            }
        }

        tracing::error!("{} account recovery exhausted, going fatal", self.symbol);
        self.lifecycle.send_replace(Lifecycle::Fatal);
        None
    }
}

// ---------------------------------------------------------------------------
// Cluster capability
// ---------------------------------------------------------------------------

struct ClusterRunner {
    symbol: String,
    timeframe_minutes: u32,
    feed: Arc<dyn MarketFeed>,
    clock: Arc<dyn Clock>,
    handler: Box<dyn ClusterHandler>,
    activated: Arc<AtomicBool>,
    lifecycle: watch::Sender<Lifecycle>,
    retry_budget: u32,
}

impl ClusterRunner {
    async fn init(&self) -> Result<(VolumeClusters, Subscription<AggTradeEvent>), LaunchError> {
        self.lifecycle.send_replace(Lifecycle::Initializing);

        let sub = self.feed.agg_trades(&self.symbol).await?;
        let clusters = VolumeClusters::new(self.timeframe_minutes, self.clock.clone());

        tracing::info!("{} clusters initialized", self.symbol);
        Ok((clusters, sub))
    }

    async fn run(
        mut self,
        mut clusters: VolumeClusters,
        mut sub: Subscription<AggTradeEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    sub.shutdown().await;
                    return;
                }
                msg = sub.recv() => {
                    let fault = match msg {
                        Some(FeedMessage::Event(trade)) => {
                            clusters.update(&trade);
                            if self.activated.load(Ordering::SeqCst) {
                                self.handler.on_cluster_update(&clusters);
                            }
                            false
                        }
                        Some(FeedMessage::Failed(err)) => {
                            tracing::error!("{} trade stream error: {}", self.symbol, err);
                            true
                        }
                        None => {
                            tracing::error!("{} trade stream closed", self.symbol);
                            true
                        }
                    };

                    if fault {
                        match self.recover(sub).await {
                            Some((new_clusters, new_sub)) => {
                                clusters = new_clusters;
                                sub = new_sub;
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    }

    async fn recover(
        &mut self,
        sub: Subscription<AggTradeEvent>,
    ) -> Option<(VolumeClusters, Subscription<AggTradeEvent>)> {
        self.lifecycle.send_replace(Lifecycle::Error);
        sub.shutdown().await;
        self.lifecycle.send_replace(Lifecycle::Recovering);

        for attempt in 1..=self.retry_budget {
            match self.init().await {
                Ok(pair) => {
                    self.lifecycle.send_replace(Lifecycle::Live);
                    tracing::info!("{} clusters recovered", self.symbol);
                    return Some(pair);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} clusters reinit attempt {}/{} failed: {}",
                        self.symbol,
                        attempt,
                        self.retry_budget,
                        err
                    );
                }
            }
        }

        tracing::error!("{} clusters recovery exhausted, going fatal", self.symbol);
        self.lifecycle.send_replace(Lifecycle::Fatal);
        None
    }
}

// ---------------------------------------------------------------------------
// Candle capability
// ---------------------------------------------------------------------------

struct CandleRunner {
    symbol: String,
    interval_minutes: u32,
    seed_limit: u32,
    rest: Arc<dyn ExchangeRest>,
    feed: Arc<dyn MarketFeed>,
    handler: Box<dyn CandleHandler>,
    activated: Arc<AtomicBool>,
    lifecycle: watch::Sender<Lifecycle>,
    retry_budget: u32,
}

impl CandleRunner {
    async fn init(&self) -> Result<(CandleSeries, Subscription<KlineEvent>), LaunchError> {
        self.lifecycle.send_replace(Lifecycle::Initializing);

        let sub = self.feed.klines(&self.symbol, self.interval_minutes).await?;
        let seed = match self
            .rest
            .klines(&self.symbol, self.interval_minutes, self.seed_limit)
            .await
        {
            Ok(seed) => seed,
            Err(err) => {
                sub.shutdown().await;
                return Err(err.into());
            }
        };

        tracing::info!("{} candles initialized with {} seeds", self.symbol, seed.len());
        Ok((CandleSeries::seeded(seed), sub))
    }

    async fn run(
        mut self,
        mut series: CandleSeries,
        mut sub: Subscription<KlineEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    sub.shutdown().await;
                    return;
                }
                msg = sub.recv() => {
                    let fault = match msg {
                        Some(FeedMessage::Event(event)) => {
                            match Candle::from_kline(&event.kline) {
                                Ok(candle) => {
                                    if series.update(candle)
                                        && self.activated.load(Ordering::SeqCst)
                                    {
                                        self.handler.on_candle_update(&series);
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!("{} unparsable kline: {}", self.symbol, err);
                                }
                            }
                            false
                        }
                        Some(FeedMessage::Failed(err)) => {
                            tracing::error!("{} kline stream error: {}", self.symbol, err);
                            true
                        }
                        None => {
                            tracing::error!("{} kline stream closed", self.symbol);
                            true
                        }
                    };

                    if fault {
                        match self.recover(sub).await {
                            Some((new_series, new_sub)) => {
                                series = new_series;
                                sub = new_sub;
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    }

    async fn recover(
        &mut self,
        sub: Subscription<KlineEvent>,
    ) -> Option<(CandleSeries, Subscription<KlineEvent>)> {
        self.lifecycle.send_replace(Lifecycle::Error);
        sub.shutdown().await;
        self.lifecycle.send_replace(Lifecycle::Recovering);

        for attempt in 1..=self.retry_budget {
            match self.init().await {
                Ok(pair) => {
                    self.lifecycle.send_replace(Lifecycle::Live);
                    tracing::info!("{} candles recovered", self.symbol);
                    return Some(pair);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} candles reinit attempt {}/{} failed: {}",
                        self.symbol,
                        attempt,
                        self.retry_budget,
                        err
                    );
                }
            }
        }

        tracing::error!("{} candles recovery exhausted, going fatal", self.symbol);
        self.lifecycle.send_replace(Lifecycle::Fatal);
        None
    }
}
