//! Control requests, actions and per-action results.
//!
//! Callers have accumulated several request body shapes over time. They are
//! all normalized here into a [`ControlRequest`], which carries a uniform
//! list of [`ControlAction`]s. Parsing is pure: nothing here touches hardware.
//!
//! | Shape | Keys | Example |
//! |-------|------|---------|
//! | bulk | `action` = `all_on` / `all_off` | `{"action": "all_on"}` |
//! | batch | `devices: [{device, action}]` | `{"devices": [{"device": "fan1", "action": "on"}]}` |
//! | single (legacy) | `device`, `action` | `{"device": "fan1", "action": "toggle"}` |
//! | single (current) | `deviceId`, `component`, `state` | `{"deviceId": "RASPI-01", "component": "pump", "state": "on"}` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::signal::SwitchState;

/// What the caller wants a device to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlIntent {
    On,
    Off,
    Toggle,
}

impl FromStr for ControlIntent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "toggle" => Ok(Self::Toggle),
            _ => Err(ValidationError::InvalidAction(s.to_string())),
        }
    }
}

impl fmt::Display for ControlIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Toggle => f.write_str("toggle"),
        }
    }
}

/// One unit of work: a (possibly aliased) device reference and an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlAction {
    pub device_ref: String,
    pub intent: ControlIntent,
}

impl ControlAction {
    #[must_use]
    pub fn new(device_ref: impl Into<String>, intent: ControlIntent) -> Self {
        Self {
            device_ref: device_ref.into(),
            intent,
        }
    }
}

/// A batch entry that could not be turned into a [`ControlAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    pub device_ref: Option<String>,
    pub reason: ValidationError,
}

/// Bulk target state for every registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    AllOn,
    AllOff,
}

impl BulkAction {
    #[must_use]
    pub fn desired_on(self) -> bool {
        matches!(self, Self::AllOn)
    }
}

/// A structurally valid control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Bulk(BulkAction),
    Batch(Vec<Result<ControlAction, RejectedEntry>>),
    Single(ControlAction),
    /// `label` is the caller's own controller id, echoed back untouched.
    Component {
        label: Option<String>,
        action: ControlAction,
    },
}

impl ControlRequest {
    /// Match `body` against the accepted shapes in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnrecognizedRequest`] when no shape matches,
    /// and [`ValidationError::MissingField`] / [`ValidationError::InvalidAction`]
    /// when a single-device request lacks or misspells its action.
    pub fn parse(body: &Value) -> Result<Self, ValidationError> {
        let Some(obj) = body.as_object() else {
            return Err(ValidationError::UnrecognizedRequest);
        };

        if let Some(bulk) = obj.get("action").and_then(Value::as_str).and_then(parse_bulk) {
            return Ok(Self::Bulk(bulk));
        }

        if let Some(entries) = obj.get("devices").and_then(Value::as_array) {
            return Ok(Self::Batch(entries.iter().map(parse_entry).collect()));
        }

        if obj.contains_key("device") {
            let device_ref = device_ref(obj, "device").ok_or(ValidationError::MissingField("device"))?;
            let intent = intent_field(obj, "action")?;
            return Ok(Self::Single(ControlAction::new(device_ref, intent)));
        }

        if obj.contains_key("component") {
            let device_ref =
                device_ref(obj, "component").ok_or(ValidationError::MissingField("component"))?;
            let intent = intent_field(obj, "state")?;
            let label = obj
                .get("deviceId")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            return Ok(Self::Component {
                label,
                action: ControlAction::new(device_ref, intent),
            });
        }

        Err(ValidationError::UnrecognizedRequest)
    }

    /// The caller-supplied controller label, if the request carried one.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Component { label, .. } => label.as_deref(),
            _ => None,
        }
    }
}

fn parse_bulk(action: &str) -> Option<BulkAction> {
    match action.trim().to_lowercase().as_str() {
        "all_on" => Some(BulkAction::AllOn),
        "all_off" => Some(BulkAction::AllOff),
        _ => None,
    }
}

/// Device references may be strings or bare numbers (`1` for `"1"`).
///
/// Blank strings are kept: they fail resolution like any other unknown name.
fn device_ref(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn intent_field(obj: &Map<String, Value>, key: &'static str) -> Result<ControlIntent, ValidationError> {
    match obj.get(key).and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => raw.parse(),
        _ => Err(ValidationError::MissingField(key)),
    }
}

fn parse_entry(entry: &Value) -> Result<ControlAction, RejectedEntry> {
    let Some(obj) = entry.as_object() else {
        return Err(RejectedEntry {
            device_ref: None,
            reason: ValidationError::MissingField("device"),
        });
    };
    let device = device_ref(obj, "device");
    let Some(device_ref) = device.clone() else {
        return Err(RejectedEntry {
            device_ref: None,
            reason: ValidationError::MissingField("device"),
        });
    };
    intent_field(obj, "action")
        .map(|intent| ControlAction::new(device_ref, intent))
        .map_err(|reason| RejectedEntry {
            device_ref: device,
            reason,
        })
}

/// Per-action outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Result of one [`ControlAction`].
///
/// `device_id` is the canonical id when resolution succeeded, otherwise the
/// reference as the caller sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResult {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<ControlIntent>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Logical state after a successful action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SwitchState>,
}

impl ControlResult {
    #[must_use]
    pub fn ok(device_id: impl Into<String>, intent: ControlIntent, state: SwitchState) -> Self {
        Self {
            device_id: device_id.into(),
            intent: Some(intent),
            outcome: Outcome::Ok,
            reason: None,
            state: Some(state),
        }
    }

    #[must_use]
    pub fn failed(
        device_id: impl Into<String>,
        intent: Option<ControlIntent>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            intent,
            outcome: Outcome::Failed,
            reason: Some(reason.to_string()),
            state: None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}
