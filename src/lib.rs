//! # Drone Dashboard Library
//!
//! Live drone fleet telemetry over WebSocket.
//!
//! This library provides the core functionality for tracking a changing fleet
//! of drones from a stream of telemetry snapshots: current readings, a short
//! rolling history per drone, and a selection that stays valid as drones come
//! and go.

pub mod config;
pub mod error;
pub mod fleet;
pub mod link;
pub mod recorder;
pub mod session;
