use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hermes::runtime::{AccountCapability, CandleCapability, ClusterCapability, OrderBookCapability};
use hermes::{AccountState, AppliedDiff, CandleSeries, OrderBook, StrategyBuilder, VolumeClusters};
use hermes::infra::{BinanceFeed, BinanceRest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("hermes=info".parse()?))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "hermes.json".to_string());
    let config = hermes::load_config(&path)?;
    tracing::info!("starting {} mirror from {}", config.symbol, path);

    let rest = Arc::new(BinanceRest::new(
        config.rest_url.clone(),
        config.api_key.clone(),
        config.api_secret.clone(),
    ));
    let feed = Arc::new(BinanceFeed::new(config.ws_url.clone()));

    let mut builder = StrategyBuilder::new(rest, feed, config.symbol.clone())
        .with_retry_budget(config.retry_budget)
        .with_order_book(
            OrderBookCapability::new(|book: &OrderBook, _diff: &AppliedDiff| {
                if let (Ok(bid), Ok(ask)) = (book.best_bid(), book.best_ask()) {
                    tracing::info!("{} top of book {:?} / {:?}", book.symbol(), bid, ask);
                }
            })
            .with_depth_limit(config.depth_limit)
            .with_queue_size(config.depth_queue),
        )
        .with_clusters(ClusterCapability::new(
            config.cluster_timeframe_minutes,
            |clusters: &VolumeClusters| {
                if let Some(range) = clusters.range_pct() {
                    tracing::info!("active cluster range {}%", range);
                }
            },
        ))
        .with_candles(
            CandleCapability::new(config.candle_interval_minutes, |candles: &CandleSeries| {
                if let Some(last) = candles.last() {
                    tracing::info!("candle close {}", last.close);
                }
            })
            .with_seed_limit(config.candle_seed_limit),
        );

    // Account mirroring needs credentials
    if !config.api_key.is_empty() {
        let mut account = AccountCapability::new(|account: &AccountState| {
            tracing::info!("position status {:?}", account.position_status());
        });
        if let Some(asset) = config.asset.clone() {
            account = account.with_asset(asset);
        }
        builder = builder.with_account(account);
    }

    let supervisor = builder.launch().await?;
    supervisor.activate();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    supervisor.shutdown().await;

    Ok(())
}
