//! Core data model.
//!
//! A delta is one raw change notification from the model's AllWatcher. The
//! broker turns unit deltas into domain events that the governor charm reads
//! back from the event store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Cluster view
// ---------------------------------------------------------------------------

/// An application deployed in the model, with its units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub units: Vec<Unit>,
}

/// One unit as reported by the model status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Unit name, e.g. `"mysql/0"`.
    pub name: String,
    pub workload_status: WorkloadStatus,
    /// Whether this unit is its application's elected leader.
    pub leader: bool,
}

// ---------------------------------------------------------------------------
// Workload status
// ---------------------------------------------------------------------------

/// Workload status reported by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadStatus {
    Active,
    Blocked,
    Error,
    /// Any status the broker does not act on (maintenance, waiting, ...).
    Other(String),
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkloadStatus::Active => "active",
            WorkloadStatus::Blocked => "blocked",
            WorkloadStatus::Error => "error",
            WorkloadStatus::Other(s) => s,
        }
    }
}

impl From<&str> for WorkloadStatus {
    fn from(s: &str) -> Self {
        match s {
            "active" => WorkloadStatus::Active,
            "blocked" => WorkloadStatus::Blocked,
            "error" => WorkloadStatus::Error,
            other => WorkloadStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// Kind of change a delta describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Change,
    Remove,
}

/// One typed change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Entity kind, e.g. `"unit"`, `"application"`, `"machine"`.
    pub entity_kind: String,
    pub change: ChangeKind,
    /// Entity id. Empty for entity kinds that carry no name.
    pub entity_id: String,
    /// Present on unit `change` deltas.
    pub workload_status: Option<WorkloadStatus>,
    pub status_message: Option<String>,
}

impl Delta {
    /// A unit `change` delta.
    pub fn unit_change(
        name: impl Into<String>,
        status: WorkloadStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_kind: "unit".to_string(),
            change: ChangeKind::Change,
            entity_id: name.into(),
            workload_status: Some(status),
            status_message: Some(message.into()),
        }
    }

    /// A unit `remove` delta.
    pub fn unit_remove(name: impl Into<String>) -> Self {
        Self {
            entity_kind: "unit".to_string(),
            change: ChangeKind::Remove,
            entity_id: name.into(),
            workload_status: None,
            status_message: None,
        }
    }

    pub fn is_unit(&self) -> bool {
        self.entity_kind == "unit"
    }

    /// Parse an AllWatcher delta triple `[entity, change, data]`.
    pub fn parse(raw: &Value) -> Result<Self> {
        let triple = raw
            .as_array()
            .filter(|a| a.len() == 3)
            .ok_or_else(|| Error::MalformedDelta(format!("expected a 3-element array: {raw}")))?;

        let entity_kind = triple[0]
            .as_str()
            .ok_or_else(|| Error::MalformedDelta("entity kind is not a string".to_string()))?;
        let change = match triple[1].as_str() {
            Some("change") => ChangeKind::Change,
            Some("remove") => ChangeKind::Remove,
            other => {
                return Err(Error::MalformedDelta(format!(
                    "unknown change kind: {other:?}"
                )));
            }
        };
        let data = &triple[2];
        let name = data.get("name").and_then(Value::as_str);

        if entity_kind != "unit" {
            return Ok(Self {
                entity_kind: entity_kind.to_string(),
                change,
                entity_id: name.unwrap_or_default().to_string(),
                workload_status: None,
                status_message: None,
            });
        }

        let name =
            name.ok_or_else(|| Error::MalformedDelta("unit delta without a name".to_string()))?;

        let (workload_status, status_message) = match change {
            ChangeKind::Remove => (None, None),
            ChangeKind::Change => {
                let status = data.get("workload-status");
                let current = status
                    .and_then(|s| s.get("current"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::MalformedDelta(format!("unit {name} has no workload status"))
                    })?;
                let message = status
                    .and_then(|s| s.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                (Some(WorkloadStatus::from(current)), Some(message.to_string()))
            }
        };

        Ok(Self {
            entity_kind: entity_kind.to_string(),
            change,
            entity_id: name.to_string(),
            workload_status,
            status_message,
        })
    }
}

// ---------------------------------------------------------------------------
// Domain events
// ---------------------------------------------------------------------------

/// A persisted, governor-visible event.
///
/// Serializes as `{"event_name": "...", "event_data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_name", content = "event_data", rename_all = "snake_case")]
pub enum DomainEvent {
    UnitAdded {
        unit_name: String,
    },
    UnitRemoved {
        unit_name: String,
    },
    UnitBlocked {
        unit_name: String,
        was_active: bool,
        message: String,
    },
    UnitError {
        unit_name: String,
        was_active: bool,
        message: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::UnitAdded { .. } => "unit_added",
            DomainEvent::UnitRemoved { .. } => "unit_removed",
            DomainEvent::UnitBlocked { .. } => "unit_blocked",
            DomainEvent::UnitError { .. } => "unit_error",
        }
    }

    pub fn unit_name(&self) -> &str {
        match self {
            DomainEvent::UnitAdded { unit_name }
            | DomainEvent::UnitRemoved { unit_name }
            | DomainEvent::UnitBlocked { unit_name, .. }
            | DomainEvent::UnitError { unit_name, .. } => unit_name,
        }
    }

    /// The `event_data` payload alone.
    pub fn payload(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        value
            .get_mut("event_data")
            .map(Value::take)
            .ok_or_else(|| Error::Other(format!("event {} has no payload", self.name())))
    }
}
