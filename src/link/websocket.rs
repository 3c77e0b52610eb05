//! # WebSocket Source
//!
//! Receives telemetry from the backend's broadcast endpoint
//! (`/api/telemetry/ws`) using `tokio-tungstenite`.
//!
//! Connection attempts are spaced by the reconnect interval. The next attempt
//! time is kept as a deadline, so dropping a pending `next_event` future (for
//! example inside `tokio::select!`) never shortens the back-off.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{LinkEvent, TelemetrySource};
use crate::config::LinkConfig;
use crate::error::{DashboardError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Telemetry WebSocket client
pub struct WsSource {
    url: String,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    stream: Option<WsStream>,
    next_attempt: Instant,
}

impl std::fmt::Debug for WsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSource")
            .field("url", &self.url)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl WsSource {
    /// Create a source from the `[link]` configuration section.
    ///
    /// No connection is made until the first call to `next_event`.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            stream: None,
            next_attempt: Instant::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Wait for the next attempt slot and try to connect once.
    async fn reconnect(&mut self) -> Option<LinkEvent> {
        sleep_until(self.next_attempt).await;
        self.next_attempt = Instant::now() + self.reconnect_interval;

        debug!("Connecting to {}", self.url);
        match connect(&self.url, self.connect_timeout).await {
            Ok(stream) => {
                info!("Connected to telemetry link at {}", self.url);
                self.stream = Some(stream);
                Some(LinkEvent::Connected)
            }
            Err(e) => {
                warn!("{} (retrying in {} ms)", e, self.reconnect_interval.as_millis());
                None
            }
        }
    }

    fn drop_stream(&mut self) -> LinkEvent {
        self.stream = None;
        self.next_attempt = Instant::now() + self.reconnect_interval;
        LinkEvent::Disconnected
    }
}

/// Open one WebSocket connection, bounded by `limit`.
async fn connect(url: &str, limit: Duration) -> Result<WsStream> {
    match timeout(limit, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(DashboardError::Link(format!("Failed to connect to {}: {}", url, e))),
        Err(_) => Err(DashboardError::Link(format!(
            "Timed out connecting to {} after {} ms",
            url,
            limit.as_millis()
        ))),
    }
}

#[async_trait]
impl TelemetrySource for WsSource {
    async fn next_event(&mut self) -> Option<LinkEvent> {
        loop {
            if self.stream.is_none() {
                match self.reconnect().await {
                    Some(event) => return Some(event),
                    None => continue,
                }
            }

            let frame = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => continue,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    return Some(LinkEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(LinkEvent::Text(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("Telemetry link closed by peer: {:?}", frame);
                    return Some(self.drop_stream());
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Telemetry link read error: {}", e);
                    return Some(self.drop_stream());
                }
                None => {
                    info!("Telemetry link ended");
                    return Some(self.drop_stream());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    fn config_for(url: String) -> LinkConfig {
        LinkConfig {
            url,
            reconnect_interval_ms: 10,
            connect_timeout_ms: 1000,
            ..LinkConfig::default()
        }
    }

    #[test]
    fn test_new_source_is_disconnected() {
        let source = WsSource::new(&LinkConfig::default());
        assert!(!source.is_connected());
        assert_eq!(source.url(), "ws://localhost:8000/api/telemetry/ws");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&format!("ws://{}/ws", addr), Duration::from_millis(500)).await;
        match result {
            Err(DashboardError::Link(msg)) => assert!(msg.contains(&addr.to_string())),
            other => panic!("Expected Link error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_receives_frames_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(WsMessage::text(r#"{"drones": []}"#.to_string())).await.unwrap();
            ws.send(WsMessage::binary(br#"{"battery": 50.0}"#.to_vec())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut source = WsSource::new(&config_for(format!("ws://{}/api/telemetry/ws", addr)));

        assert_eq!(source.next_event().await, Some(LinkEvent::Connected));
        assert!(source.is_connected());
        assert_eq!(
            source.next_event().await,
            Some(LinkEvent::Text(r#"{"drones": []}"#.to_string()))
        );
        assert_eq!(
            source.next_event().await,
            Some(LinkEvent::Text(r#"{"battery": 50.0}"#.to_string()))
        );
        assert_eq!(source.next_event().await, Some(LinkEvent::Disconnected));
        assert!(!source.is_connected());

        server.await.unwrap();
    }
}
