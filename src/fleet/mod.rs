//! # Fleet Module
//!
//! Live telemetry state for a dynamic set of drones.
//!
//! This module handles:
//! - Decoding legacy single-drone and fleet messages
//! - Tracking which drones are currently live
//! - Keeping the last readings of every drone in a bounded history
//! - Keeping the selected drone valid across updates

pub mod clock;
pub mod history;
pub mod message;
pub mod reconciler;
pub mod snapshot;

pub use clock::{Clock, SystemClock};
pub use history::{EntityHistory, HISTORY_CAPACITY};
pub use message::Message;
pub use reconciler::{FleetState, IngestSummary, Reconciler, SharedReconciler};
pub use snapshot::{HistoryEntry, Snapshot};
