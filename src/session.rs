//! # Session
//!
//! Pumps link events into the reconciler, one at a time, in arrival order.
//!
//! Rejected messages are logged and counted but never stop the session. The
//! connection flag is a plain passthrough of the link's connected and
//! disconnected events.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fleet::{HistoryEntry, IngestSummary, Message, SharedReconciler};
use crate::link::{LinkEvent, TelemetrySource};
use crate::recorder::TelemetryRecorder;

/// Drives one telemetry source into a reconciler
#[derive(Debug)]
pub struct Session<S: TelemetrySource> {
    source: S,
    reconciler: SharedReconciler,
    recorder: Option<TelemetryRecorder>,
    legacy_id: String,
    connected: bool,
    accepted: u64,
    rejected: u64,
}

impl<S: TelemetrySource> Session<S> {
    /// Create a session
    ///
    /// # Arguments
    ///
    /// * `source` - Transport delivering link events
    /// * `reconciler` - Fleet state to update
    /// * `legacy_id` - Id assigned to legacy single-drone messages
    pub fn new(source: S, reconciler: SharedReconciler, legacy_id: impl Into<String>) -> Self {
        Self {
            source,
            reconciler,
            recorder: None,
            legacy_id: legacy_id.into(),
            connected: false,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Also write every accepted reading to `recorder`
    pub fn with_recorder(mut self, recorder: TelemetryRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Handle to the fleet state this session updates
    pub fn reconciler(&self) -> SharedReconciler {
        self.reconciler.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Messages applied to the fleet state
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Messages dropped as malformed
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Wait for and handle one link event.
    ///
    /// Returns `false` once the source is finished.
    pub async fn step(&mut self) -> bool {
        match self.source.next_event().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle events until the source is finished.
    pub async fn run(&mut self) {
        while self.step().await {}
        info!(
            "Telemetry source finished ({} accepted, {} rejected)",
            self.accepted, self.rejected
        );
    }

    fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                self.connected = true;
                info!("Telemetry link connected");
            }
            LinkEvent::Disconnected => {
                if self.connected {
                    warn!("Telemetry link disconnected");
                }
                self.connected = false;
            }
            LinkEvent::Text(text) => match self.apply(&text) {
                Ok(summary) => {
                    self.accepted += 1;
                    debug!(
                        "Applied {} snapshot(s), {} departed, selection changed: {}",
                        summary.received,
                        summary.departed.len(),
                        summary.selected_changed
                    );
                }
                Err(e) => {
                    self.rejected += 1;
                    warn!("Dropped telemetry message: {}", e);
                }
            },
        }
    }

    fn apply(&mut self, text: &str) -> Result<IngestSummary> {
        let message = Message::from_json_str(text, &self.legacy_id)?;
        let to_record = self.recorder.is_some().then(|| message.clone());
        let summary = self.reconciler.ingest(message)?;

        if let (Some(recorder), Some(message)) = (self.recorder.as_mut(), to_record) {
            let written = message.into_snapshots().into_iter().try_for_each(|snapshot| {
                recorder.record(&HistoryEntry {
                    captured_at: summary.captured_at,
                    snapshot,
                })
            });

            // Recording is best-effort; the reading is already applied
            if let Err(e) = written.and_then(|_| recorder.flush()) {
                warn!("Failed to record telemetry: {}", e);
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::fleet::Reconciler;
    use crate::link::mocks::ScriptedSource;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    fn session(source: ScriptedSource) -> Session<ScriptedSource> {
        Session::new(source, SharedReconciler::new(Reconciler::new()), "default")
    }

    #[tokio::test]
    async fn test_fleet_messages_update_state() {
        let source = ScriptedSource::connected_with(&[
            r#"{"drones": [{"id": "a", "name": "Alpha", "battery": 90.0}, {"id": "b", "name": "Bravo"}]}"#,
            r#"{"drones": [{"id": "b", "name": "Bravo", "battery": 70.0}]}"#,
        ]);
        let mut session = session(source);
        session.run().await;

        let reconciler = session.reconciler();
        let ids: Vec<_> = reconciler.current_entities().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(reconciler.selected().as_deref(), Some("b"));
        assert_eq!(reconciler.history_of("b").len(), 2);
        assert_eq!(session.accepted(), 2);
        assert_eq!(session.rejected(), 0);
    }

    #[tokio::test]
    async fn test_malformed_messages_counted_and_skipped() {
        let source = ScriptedSource::connected_with(&[
            r#"{"drones": [{"id": "a", "name": "Alpha"}]}"#,
            "not json at all",
            r#"{"drones": [{"name": "NoId"}]}"#,
            r#"[1, 2, 3]"#,
            r#"{"drones": [{"id": "a", "name": "Alpha", "battery": 12.5}]}"#,
        ]);
        let mut session = session(source);
        session.run().await;

        assert_eq!(session.accepted(), 2);
        assert_eq!(session.rejected(), 3);
        let history = session.reconciler().history_of("a");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].snapshot.battery, Some(12.5));
    }

    #[tokio::test]
    async fn test_legacy_messages_use_configured_id() {
        let source = ScriptedSource::connected_with(&[r#"{"battery": 99.0, "altitude": 1.5}"#]);
        let mut session =
            Session::new(source, SharedReconciler::new(Reconciler::new()), "sim-1");
        session.run().await;

        let reconciler = session.reconciler();
        assert_eq!(reconciler.selected().as_deref(), Some("sim-1"));
        assert_eq!(reconciler.history_of("sim-1")[0].snapshot.altitude, Some(1.5));
    }

    #[tokio::test]
    async fn test_connection_flag_follows_link() {
        let source = ScriptedSource::new([
            LinkEvent::Connected,
            LinkEvent::Disconnected,
            LinkEvent::Connected,
        ]);
        let mut session = session(source);
        assert!(!session.is_connected());

        assert!(session.step().await);
        assert!(session.is_connected());
        assert!(session.step().await);
        assert!(!session.is_connected());
        assert!(session.step().await);
        assert!(session.is_connected());
        assert!(!session.step().await);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_fleet_state() {
        let source = ScriptedSource::new([
            LinkEvent::Connected,
            LinkEvent::Text(r#"{"drones": [{"id": "a", "name": "Alpha"}]}"#.to_string()),
            LinkEvent::Disconnected,
        ]);
        let mut session = session(source);
        session.run().await;

        assert!(!session.is_connected());
        assert_eq!(session.reconciler().current_entities().len(), 1);
    }

    #[tokio::test]
    async fn test_recorder_receives_accepted_readings() {
        let root = tempdir().unwrap();
        let recorder = TelemetryRecorder::create(&RecorderConfig {
            enabled: true,
            log_dir: root.path().to_string_lossy().into_owned(),
            ..RecorderConfig::default()
        })
        .unwrap();

        let source = ScriptedSource::connected_with(&[
            r#"{"drones": [{"id": "a", "name": "Alpha"}, {"id": "b", "name": "Bravo"}]}"#,
            r#"{"drones": [{"name": "NoId"}]}"#,
        ]);
        let mut session = session(source).with_recorder(recorder);
        session.run().await;

        let files: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        let lines = std::fs::read_to_string(path).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[test]
    fn test_select_through_shared_handle() {
        let source = ScriptedSource::default();
        let session = session(source);
        let reconciler = session.reconciler();

        assert_err!(reconciler.select("a"));
        assert_ok!(reconciler.ingest(Message::from_value(
            serde_json::json!({"drones": [{"id": "a"}, {"id": "b"}]}),
            "default"
        )
        .unwrap()));
        assert_ok!(reconciler.select("b"));
        assert_eq!(session.reconciler().selected().as_deref(), Some("b"));
    }
}
