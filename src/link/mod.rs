//! # Link Module
//!
//! Transport side of the dashboard: delivers telemetry text frames and
//! connection changes, one at a time, in arrival order.
//!
//! This module handles:
//! - Connecting to the telemetry WebSocket
//! - Reconnecting after the backend goes away
//! - Reporting connected/disconnected transitions

pub mod websocket;

use async_trait::async_trait;

pub use websocket::WsSource;

/// One thing that happened on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Link is up
    Connected,

    /// Link went down; the source keeps trying to reconnect
    Disconnected,

    /// One raw telemetry message
    Text(String),
}

/// Trait for telemetry transports
#[async_trait]
pub trait TelemetrySource: Send {
    /// Wait for the next event. `None` means the source is finished for good.
    async fn next_event(&mut self) -> Option<LinkEvent>;
}
