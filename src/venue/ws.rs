//! Reconnecting WebSocket transport for live venue adapters
//!
//! Concrete adapters feed this their subscription payloads; the transport
//! replays them after every reconnect so the market set survives drops.
//! Backoff is exponential from `initial_backoff` and capped at `max_backoff`.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Reconnect attempts before giving up (0 = infinite)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub ping_interval: Duration,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_attempts: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_backoff(mut self, d: Duration) -> Self {
        self.initial_backoff = d;
        self
    }

    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.max_backoff = d;
        self
    }
}

/// Events surfaced to the adapter's normalisation task
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connection established and subscriptions replayed
    Connected,
    /// Connection lost; transport is backing off
    Reconnecting { attempt: u32 },
    /// Transport gave up or was closed
    Disconnected,
    /// Raw venue message
    Text(String),
}

/// Reconnecting message stream over one venue WebSocket endpoint
pub struct VenueStream {
    config: WsConfig,
}

impl VenueStream {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and stream. `subscriptions` are sent verbatim after every
    /// successful (re)connect. Returns the event receiver and a sender for
    /// ad-hoc outbound messages (new subscriptions, unsubscribes).
    pub fn connect(
        &self,
        subscriptions: Vec<String>,
    ) -> (mpsc::Receiver<StreamEvent>, mpsc::Sender<String>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (send_tx, send_rx) = mpsc::channel(256);
        let config = self.config.clone();

        tokio::spawn(async move {
            run_loop(config, subscriptions, event_tx, send_rx).await;
        });

        (event_rx, send_tx)
    }
}

async fn run_loop(
    config: WsConfig,
    subscriptions: Vec<String>,
    event_tx: mpsc::Sender<StreamEvent>,
    mut send_rx: mpsc::Receiver<String>,
) {
    let mut attempt = 0u32;
    let mut backoff = config.initial_backoff;

    loop {
        match stream_once(&config, &subscriptions, &event_tx, &mut send_rx).await {
            Ok(()) => {
                tracing::info!(url = %config.url, "WebSocket closed cleanly");
                let _ = event_tx.send(StreamEvent::Disconnected).await;
                return;
            }
            Err(e) => {
                attempt += 1;
                tracing::warn!(url = %config.url, error = %e, attempt, "WebSocket dropped");

                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    tracing::error!(url = %config.url, "Reconnect attempts exhausted");
                    let _ = event_tx.send(StreamEvent::Disconnected).await;
                    return;
                }
                if event_tx.is_closed() {
                    return;
                }
                let _ = event_tx.send(StreamEvent::Reconnecting { attempt }).await;

                sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
        }
    }
}

async fn stream_once(
    config: &WsConfig,
    subscriptions: &[String],
    event_tx: &mpsc::Sender<StreamEvent>,
    send_rx: &mut mpsc::Receiver<String>,
) -> anyhow::Result<()> {
    tracing::info!(url = %config.url, "Connecting to venue WebSocket");
    let (ws, _response) = connect_async(&config.url).await?;
    let (mut write, mut read) = ws.split();

    for payload in subscriptions {
        write.send(Message::Text(payload.clone())).await?;
    }
    if event_tx.send(StreamEvent::Connected).await.is_err() {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(StreamEvent::Text(text)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        anyhow::bail!("read failed: {e}");
                    }
                    None => {
                        anyhow::bail!("stream ended unexpectedly");
                    }
                }
            }
            outbound = send_rx.recv() => {
                match outbound {
                    Some(text) => write.send(Message::Text(text)).await?,
                    None => return Ok(()),
                }
            }
            _ = ping_interval.tick() => {
                write.send(Message::Ping(vec![])).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = WsConfig::new("wss://example.com")
            .max_attempts(3)
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(8));

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.max_backoff, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let stream = VenueStream::new(
            WsConfig::new("ws://127.0.0.1:1")
                .max_attempts(2)
                .initial_backoff(Duration::from_millis(10)),
        );

        let (mut rx, _tx) = stream.connect(vec![]);

        let mut reconnects = 0;
        let mut disconnected = false;
        let deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::Reconnecting { .. } => reconnects += 1,
                    StreamEvent::Disconnected => {
                        disconnected = true;
                        break;
                    }
                    _ => {}
                }
            }
        });

        deadline.await.expect("test timed out");
        assert!(disconnected);
        assert_eq!(reconnects, 1);
    }
}
