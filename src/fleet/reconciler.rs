//! # Telemetry Reconciler
//!
//! Owns the live fleet state: latest snapshot per drone, rolling history per
//! drone, and the currently selected drone.
//!
//! ## Membership
//!
//! A fleet message lists every drone that currently exists. Drones missing
//! from it are dropped from the live set. Their history is kept (unless
//! configured otherwise) so a drone that drops out briefly resumes with its
//! past readings intact. Legacy messages describe a single permanent drone and
//! never remove anything.
//!
//! ## Selection
//!
//! After every batch the selection is checked. If nothing is selected, or the
//! selected drone is no longer live, the first drone of the batch is selected
//! (or nothing, when the batch was empty). Otherwise the selection stays put.
//!
//! ## Usage
//!
//! ```
//! use drone_dashboard::fleet::{Message, Reconciler};
//!
//! let mut reconciler = Reconciler::new();
//! let message = Message::from_json_str(
//!     r#"{"drones": [{"id": "a", "name": "Alpha", "battery": 55.5}]}"#,
//!     "default",
//! )?;
//! reconciler.ingest(message)?;
//!
//! assert_eq!(reconciler.selected().as_deref(), Some("a"));
//! assert_eq!(reconciler.history_of("a").len(), 1);
//! # Ok::<(), drone_dashboard::error::DashboardError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::history::{EntityHistory, HISTORY_CAPACITY};
use super::message::Message;
use super::snapshot::{HistoryEntry, Snapshot};
use crate::config::FleetConfig;
use crate::error::{DashboardError, Result};

/// Everything the reconciler owns. Read-only outside this module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FleetState {
    latest: HashMap<String, Snapshot>,
    order: Vec<String>,
    histories: HashMap<String, EntityHistory>,
    selected: Option<String>,
}

impl FleetState {
    /// Latest snapshot of a live drone
    pub fn latest(&self, id: &str) -> Option<&Snapshot> {
        self.latest.get(id)
    }

    /// Ids of live drones, in the order they were last reported
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn history(&self, id: &str) -> Option<&EntityHistory> {
        self.histories.get(id)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.latest.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// What a single `ingest` call changed.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    /// Snapshots applied
    pub received: usize,

    /// Drones that left the live set
    pub departed: Vec<String>,

    /// Whether the selection moved
    pub selected_changed: bool,

    /// Capture instant stamped on every entry of this batch
    pub captured_at: DateTime<Utc>,
}

/// Live fleet state reconciler.
///
/// Generic over the clock so tests can control capture timestamps.
#[derive(Debug)]
pub struct Reconciler<C: Clock = SystemClock> {
    state: FleetState,
    clock: C,
    history_len: usize,
    retain_departed_history: bool,
    last_capture: Option<DateTime<Utc>>,
}

impl Default for Reconciler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler<SystemClock> {
    /// Creates an empty reconciler with default settings and the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock, HISTORY_CAPACITY, true)
    }

    /// Creates an empty reconciler from the `[fleet]` configuration section.
    pub fn from_config(config: &FleetConfig) -> Self {
        Self::with_clock(SystemClock, config.history_len, config.retain_departed_history)
    }
}

impl<C: Clock> Reconciler<C> {
    /// Creates an empty reconciler with an explicit clock.
    ///
    /// # Arguments
    ///
    /// * `clock` - Source of capture timestamps
    /// * `history_len` - Readings kept per drone
    /// * `retain_departed_history` - Keep history of drones that leave the fleet
    pub fn with_clock(clock: C, history_len: usize, retain_departed_history: bool) -> Self {
        Self {
            state: FleetState::default(),
            clock,
            history_len,
            retain_departed_history,
            last_capture: None,
        }
    }

    /// Apply one decoded message.
    ///
    /// Every snapshot replaces the latest reading for its drone and is
    /// appended to that drone's history. Fleet messages also drop drones they
    /// do not list. The selection is reconciled once the whole batch is
    /// applied.
    ///
    /// Decoding already rejected malformed payloads, so this never leaves
    /// state partially applied.
    pub fn ingest(&mut self, message: Message) -> Result<IngestSummary> {
        let authoritative = message.is_authoritative();
        let snapshots = message.into_snapshots();
        let received = snapshots.len();
        let first_id = snapshots.first().map(|s| s.id.clone());
        let captured_at = self.capture_time();

        let departed = if authoritative {
            self.replace_membership(&snapshots)
        } else {
            Vec::new()
        };

        for snapshot in snapshots {
            if !authoritative && !self.state.latest.contains_key(&snapshot.id) {
                self.state.order.push(snapshot.id.clone());
            }

            let capacity = self.history_len;
            self.state
                .histories
                .entry(snapshot.id.clone())
                .or_insert_with(|| EntityHistory::with_capacity(capacity))
                .push(HistoryEntry {
                    captured_at,
                    snapshot: snapshot.clone(),
                });
            self.state.latest.insert(snapshot.id.clone(), snapshot);
        }

        let selected_changed = self.reconcile_selection(first_id);

        if !departed.is_empty() {
            debug!("Drones left the fleet: {}", departed.join(", "));
        }

        Ok(IngestSummary {
            received,
            departed,
            selected_changed,
            captured_at,
        })
    }

    /// Select a live drone.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` if the drone is not live; state is unchanged.
    pub fn select(&mut self, id: &str) -> Result<()> {
        if !self.state.latest.contains_key(id) {
            return Err(DashboardError::UnknownEntity(id.to_string()));
        }
        self.state.selected = Some(id.to_string());
        Ok(())
    }

    /// Latest snapshot of every live drone, in reported order.
    pub fn current_entities(&self) -> Vec<Snapshot> {
        self.state
            .order
            .iter()
            .filter_map(|id| self.state.latest.get(id))
            .cloned()
            .collect()
    }

    /// History of a drone, oldest first. Empty for drones never seen.
    pub fn history_of(&self, id: &str) -> Vec<HistoryEntry> {
        self.state
            .histories
            .get(id)
            .map(EntityHistory::to_vec)
            .unwrap_or_default()
    }

    pub fn selected(&self) -> Option<String> {
        self.state.selected.clone()
    }

    /// Latest snapshot of the selected drone
    pub fn selected_snapshot(&self) -> Option<Snapshot> {
        self.state
            .selected
            .as_ref()
            .and_then(|id| self.state.latest.get(id))
            .cloned()
    }

    pub fn state(&self) -> &FleetState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Current time, never earlier than the previous capture.
    fn capture_time(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        let now = match self.last_capture {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_capture = Some(now);
        now
    }

    /// Make the live set exactly the drones in `snapshots`. Returns the ids removed.
    fn replace_membership(&mut self, snapshots: &[Snapshot]) -> Vec<String> {
        let reported: HashSet<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();

        let departed: Vec<String> = self
            .state
            .order
            .iter()
            .filter(|id| !reported.contains(id.as_str()))
            .cloned()
            .collect();

        for id in &departed {
            self.state.latest.remove(id);
            if !self.retain_departed_history {
                self.state.histories.remove(id);
            }
        }

        let mut seen = HashSet::with_capacity(snapshots.len());
        self.state.order = snapshots
            .iter()
            .filter(|s| seen.insert(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();

        departed
    }

    /// Returns true if the selection moved.
    fn reconcile_selection(&mut self, first_id: Option<String>) -> bool {
        let still_live = self
            .state
            .selected
            .as_ref()
            .is_some_and(|id| self.state.latest.contains_key(id));

        if still_live {
            return false;
        }

        let changed = self.state.selected != first_id;
        self.state.selected = first_id;
        changed
    }
}

/// Reconciler behind a single mutex, for hosts that deliver messages from
/// more than one task.
///
/// Each call holds the lock for the whole operation, so batches and
/// selection changes are applied atomically with respect to each other.
#[derive(Debug)]
pub struct SharedReconciler<C: Clock = SystemClock> {
    inner: Arc<Mutex<Reconciler<C>>>,
}

impl<C: Clock> Clone for SharedReconciler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> From<Reconciler<C>> for SharedReconciler<C> {
    fn from(reconciler: Reconciler<C>) -> Self {
        Self::new(reconciler)
    }
}

impl<C: Clock> SharedReconciler<C> {
    pub fn new(reconciler: Reconciler<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reconciler)),
        }
    }

    pub fn ingest(&self, message: Message) -> Result<IngestSummary> {
        self.lock().ingest(message)
    }

    pub fn select(&self, id: &str) -> Result<()> {
        self.lock().select(id)
    }

    pub fn current_entities(&self) -> Vec<Snapshot> {
        self.lock().current_entities()
    }

    pub fn history_of(&self, id: &str) -> Vec<HistoryEntry> {
        self.lock().history_of(id)
    }

    pub fn selected(&self) -> Option<String> {
        self.lock().selected()
    }

    /// Run a read-only closure against the reconciler under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Reconciler<C>) -> R) -> R {
        let guard = self.lock();
        f(&*guard)
    }

    // State is validated before any mutation, so a poisoned lock still
    // guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Reconciler<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
