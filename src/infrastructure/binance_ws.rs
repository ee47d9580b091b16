//! Low-level websocket client for a single symbol's kline_1m stream.
//!
//! Connects to `{base_url}/ws/{symbol}@kline_{interval}`, dispatches a
//! [`Candle`] only for closed klines (`k.x == true`), and reconnects with
//! jittered exponential backoff on any error or unexpected close.

use crate::domain::candle::Candle;
use crate::domain::errors::IngestionError;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub struct BinanceKlineStream {
    base_url: String,
    symbol: String,
    interval: String,
    initial_backoff: Duration,
    max_backoff: Duration,
    ping_interval: Duration,
    open_timeout: Duration,
}

impl BinanceKlineStream {
    pub fn new(
        base_url: String,
        symbol: String,
        interval: String,
        initial_backoff: Duration,
        max_backoff: Duration,
        ping_interval: Duration,
        open_timeout: Duration,
    ) -> Self {
        Self {
            base_url,
            symbol: symbol.to_lowercase(),
            interval,
            initial_backoff,
            max_backoff,
            ping_interval,
            open_timeout,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/ws/{}@kline_{}",
            self.base_url.trim_end_matches('/'),
            self.symbol,
            self.interval
        )
    }

    /// Runs the reconnect loop until `stop` is signalled. Closed candles are
    /// pushed onto `tx`; the receiver side owns persistence and dispatch.
    pub async fn run(&self, tx: mpsc::Sender<Candle>, mut stop: watch::Receiver<bool>) {
        let mut backoff = self.initial_backoff;

        while !*stop.borrow() {
            let mut stop_clone = stop.clone();
            tokio::select! {
                result = self.connect_and_stream(&tx, &mut stop_clone) => {
                    match result {
                        Ok(()) => {
                            info!("kline stream closed; reconnecting");
                            backoff = self.initial_backoff;
                        }
                        Err(e) => {
                            warn!(error = %e, backoff_secs = backoff.as_secs(), "kline stream error; reconnecting");
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *stop.borrow() {
                break;
            }

            let jitter = Duration::from_millis(rand::rng().random_range(0..500));
            tokio::time::sleep(backoff + jitter).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }

        info!("kline stream stopped");
    }

    async fn connect_and_stream(
        &self,
        tx: &mpsc::Sender<Candle>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), IngestionError> {
        let url = self.url();
        info!(%url, "connecting kline stream");

        let (ws_stream, _) = tokio::time::timeout(self.open_timeout, connect_async(&url))
            .await
            .map_err(|_| IngestionError::Connect("handshake timed out".to_string()))?
            .map_err(|e| IngestionError::Connect(e.to_string()))?;

        info!("kline stream connected");

        let (mut write, mut read) = ws_stream.split();
        let mut ping_interval = tokio::time::interval(self.ping_interval);
        ping_interval.tick().await; // first tick fires immediately
        let mut last_pong = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if last_pong.elapsed() > self.ping_interval {
                        warn!("no pong within ping interval; treating connection as dead");
                        return Err(IngestionError::StreamClosed);
                    }
                    if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return Err(IngestionError::StreamClosed);
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match parse_kline_message(&text, &self.symbol, &self.interval) {
                                Ok(Some(candle)) => {
                                    if tx.send(candle).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => debug!(error = %e, "ignoring unparseable kline message"),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = tokio::time::Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(IngestionError::StreamClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(IngestionError::Connect(e.to_string()));
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "n")]
    trades: i64,
    #[serde(rename = "x")]
    is_closed: bool,
}

fn parse_kline_message(text: &str, symbol: &str, interval: &str) -> Result<Option<Candle>, IngestionError> {
    let event: KlineEvent = serde_json::from_str(text).map_err(|e| IngestionError::Parse(e.to_string()))?;
    if !event.k.is_closed {
        return Ok(None);
    }

    let k = event.k;
    Ok(Some(Candle {
        symbol: symbol.to_uppercase(),
        interval: interval.to_string(),
        open_time: k.open_time,
        close_time: k.close_time,
        open: Decimal::from_str(&k.open).map_err(|e| IngestionError::Parse(e.to_string()))?,
        high: Decimal::from_str(&k.high).map_err(|e| IngestionError::Parse(e.to_string()))?,
        low: Decimal::from_str(&k.low).map_err(|e| IngestionError::Parse(e.to_string()))?,
        close: Decimal::from_str(&k.close).map_err(|e| IngestionError::Parse(e.to_string()))?,
        volume: Decimal::from_str(&k.volume).map_err(|e| IngestionError::Parse(e.to_string()))?,
        trades: k.trades,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_unclosed_kline() {
        let msg = r#"{"k":{"t":1,"T":2,"o":"1.0","h":"1.1","l":"0.9","c":"1.05","v":"10","n":5,"x":false}}"#;
        assert!(parse_kline_message(msg, "ethusdt", "1m").unwrap().is_none());
    }

    #[test]
    fn parses_closed_kline() {
        let msg = r#"{"k":{"t":1,"T":2,"o":"1.0","h":"1.1","l":"0.9","c":"1.05","v":"10","n":5,"x":true}}"#;
        let candle = parse_kline_message(msg, "ethusdt", "1m").unwrap().unwrap();
        assert_eq!(candle.symbol, "ETHUSDT");
        assert_eq!(candle.trades, 5);
    }
}
