use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::events::{AggTradeEvent, DepthDiffEvent, KlineEvent, UserDataEvent};
use crate::ports::{FeedError, FeedMessage, MarketFeed, Subscription, SubscriptionSender};

/// Queue bound for streams that do not need caller-tuned backpressure
const DEFAULT_QUEUE: usize = 256;

/// Push-feed provider over raw WebSocket streams.
///
/// Each subscription opens its own connection, mirroring the exchange's
/// one-stream-per-socket raw endpoints. The reader task parses frames
/// into typed events, answers pings, and reports transport failures
/// in-band before signalling completion.
pub struct BinanceFeed {
    base_url: String,
}

impl BinanceFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        BinanceFeed {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Feed against the production futures endpoint
    pub fn futures() -> Self {
        Self::new("wss://fstream.binance.com")
    }

    async fn serve<E>(&self, stream: &str, queue: usize) -> Result<Subscription<E>, FeedError>
    where
        E: DeserializeOwned + Send + 'static,
    {
        let url = Url::parse(&format!("{}/ws/{}", self.base_url, stream))
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let (sender, subscription) = Subscription::channel(queue);
        let SubscriptionSender {
            events,
            mut stop,
            done,
        } = sender;

        let stream_name = stream.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event = match serde_json::from_str::<E>(&text) {
                                Ok(event) => event,
                                Err(err) => {
                                    tracing::debug!("{}: unparsed frame: {}", stream_name, err);
                                    continue;
                                }
                            };
                            // Bounded queue: a full consumer blocks us here
                            tokio::select! {
                                _ = stop.changed() => break,
                                sent = events.send(FeedMessage::Event(event)) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!("{}: stream closed by peer", stream_name);
                            let _ = events.send(FeedMessage::Failed(FeedError::Closed)).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::warn!("{}: transport error: {}", stream_name, err);
                            let _ = events
                                .send(FeedMessage::Failed(FeedError::Transport(err.to_string())))
                                .await;
                            break;
                        }
                    }
                }
            }
            let _ = done.send(());
        });

        Ok(subscription)
    }
}

#[async_trait]
impl MarketFeed for BinanceFeed {
    async fn depth_diffs(
        &self,
        symbol: &str,
        queue: usize,
    ) -> Result<Subscription<DepthDiffEvent>, FeedError> {
        let stream = format!("{}@depth@100ms", symbol.to_lowercase());
        self.serve(&stream, queue).await
    }

    async fn agg_trades(&self, symbol: &str) -> Result<Subscription<AggTradeEvent>, FeedError> {
        let stream = format!("{}@aggTrade", symbol.to_lowercase());
        self.serve(&stream, DEFAULT_QUEUE).await
    }

    async fn klines(
        &self,
        symbol: &str,
        interval_minutes: u32,
    ) -> Result<Subscription<KlineEvent>, FeedError> {
        let stream = format!("{}@kline_{}m", symbol.to_lowercase(), interval_minutes);
        self.serve(&stream, DEFAULT_QUEUE).await
    }

    async fn user_data(&self, listen_token: &str) -> Result<Subscription<UserDataEvent>, FeedError> {
        self.serve(listen_token, DEFAULT_QUEUE).await
    }
}
