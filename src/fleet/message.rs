//! # Wire Messages
//!
//! Decodes the two telemetry dialects the backend has emitted over time:
//!
//! - **Legacy**: one bare snapshot object with no id, e.g.
//!   `{"battery": 97.2, "altitude": 4.1, "speed": 2.0, "lat": 34.07, "lng": -118.44}`
//! - **Fleet**: `{"drones": [{"id": "a", "name": "Alpha", ...}, ...]}`, where
//!   the list is the complete set of drones currently alive.
//!
//! Both decode into [`Message`] and normalize to an ordered list of
//! [`Snapshot`]s, so the reconciler never looks at raw JSON.

use serde_json::{Map, Value};

use super::snapshot::Snapshot;
use crate::error::{DashboardError, Result};

/// Key that marks the fleet dialect
const FLEET_KEY: &str = "drones";

/// A decoded telemetry message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Single implicit drone, stamped with a synthetic id at decode time
    Legacy(Snapshot),

    /// Full fleet membership, in the order the producer reported it
    Fleet(Vec<Snapshot>),
}

impl Message {
    /// Decode a message from transport text.
    ///
    /// # Arguments
    ///
    /// * `text` - Raw JSON text as received
    /// * `legacy_id` - Id given to legacy messages that carry none
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the text is not JSON or matches neither dialect.
    pub fn from_json_str(text: &str, legacy_id: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DashboardError::MalformedMessage(format!("invalid JSON: {}", e)))?;
        Self::from_value(value, legacy_id)
    }

    /// Decode a message from an already-parsed JSON value.
    ///
    /// A fleet message is rejected as a whole if any single drone in it is
    /// invalid.
    pub fn from_value(value: Value, legacy_id: &str) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(DashboardError::MalformedMessage(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        match object.remove(FLEET_KEY) {
            Some(drones) => decode_fleet(drones).map(Message::Fleet),
            None => decode_legacy(object, legacy_id).map(Message::Legacy),
        }
    }

    /// Whether this message declares the complete set of live drones.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Message::Fleet(_))
    }

    /// Number of snapshots the message carries.
    pub fn len(&self) -> usize {
        match self {
            Message::Legacy(_) => 1,
            Message::Fleet(drones) => drones.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize into an ordered list of snapshots.
    pub fn into_snapshots(self) -> Vec<Snapshot> {
        match self {
            Message::Legacy(snapshot) => vec![snapshot],
            Message::Fleet(drones) => drones,
        }
    }
}

/// Keys that identify an object as a legacy snapshot
const LEGACY_KEYS: [&str; 8] = [
    "id", "battery", "altitude", "speed", "lat", "lng", "is_flying", "isFlying",
];

fn decode_fleet(drones: Value) -> Result<Vec<Snapshot>> {
    let items = match drones {
        Value::Array(items) => items,
        other => {
            return Err(DashboardError::MalformedMessage(format!(
                "'{}' must be an array, got {}",
                FLEET_KEY,
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut object = match item {
                Value::Object(object) => object,
                other => {
                    return Err(DashboardError::MalformedMessage(format!(
                        "drone #{} must be an object, got {}",
                        index,
                        json_kind(&other)
                    )))
                }
            };

            match object.get("id") {
                Some(Value::String(id)) if id.is_empty() => {
                    return Err(DashboardError::MalformedMessage(format!(
                        "drone #{} has an empty id",
                        index
                    )))
                }
                Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(DashboardError::MalformedMessage(format!(
                        "drone #{} has a non-string id ({})",
                        index,
                        json_kind(other)
                    )))
                }
                None => {
                    return Err(DashboardError::MalformedMessage(format!(
                        "drone #{} is missing its id",
                        index
                    )))
                }
            }

            merge_flying_alias(&mut object)
                .map_err(|e| DashboardError::MalformedMessage(format!("drone #{}: {}", index, e)))?;

            serde_json::from_value::<Snapshot>(Value::Object(object)).map_err(|e| {
                DashboardError::MalformedMessage(format!("drone #{}: {}", index, e))
            })
        })
        .collect()
}

fn decode_legacy(mut object: Map<String, Value>, legacy_id: &str) -> Result<Snapshot> {
    if !LEGACY_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Err(DashboardError::MalformedMessage(
            "unrecognized message".to_string(),
        ));
    }

    match object.get("id") {
        None => {
            object.insert("id".to_string(), Value::String(legacy_id.to_string()));
        }
        Some(Value::String(id)) if id.is_empty() => {
            return Err(DashboardError::MalformedMessage(
                "legacy message has an empty id".to_string(),
            ))
        }
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(DashboardError::MalformedMessage(format!(
                "legacy message has a non-string id ({})",
                json_kind(other)
            )))
        }
    }

    merge_flying_alias(&mut object)
        .map_err(|e| DashboardError::MalformedMessage(format!("legacy message: {}", e)))?;

    let mut snapshot: Snapshot = serde_json::from_value(Value::Object(object))
        .map_err(|e| DashboardError::MalformedMessage(format!("legacy message: {}", e)))?;

    if snapshot.name.is_empty() {
        snapshot.name = snapshot.id.clone();
    }

    Ok(snapshot)
}

/// Fold `isFlying` into `is_flying` when a producer sends both spellings.
///
/// Serde treats the alias as the same field, so both keys present would
/// otherwise be a duplicate-field error. Equal values collapse to one key;
/// differing values are an error.
fn merge_flying_alias(object: &mut Map<String, Value>) -> std::result::Result<(), String> {
    if !object.contains_key("is_flying") {
        return Ok(());
    }
    match object.remove("isFlying") {
        None => Ok(()),
        Some(camel) if object.get("is_flying") == Some(&camel) => Ok(()),
        Some(camel) => Err(format!(
            "conflicting is_flying ({}) and isFlying ({})",
            object.get("is_flying").unwrap_or(&Value::Null),
            camel
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
