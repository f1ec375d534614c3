//! Delta classifier: maps one unit delta to the domain events it implies.
//!
//! The active-unit snapshot is updated as a side effect. Membership checks
//! run against `seen`, the set of unit names known when the current batch
//! started; a unit is added to `seen` when its `unit_added` event is emitted
//! so a second delta for the same new unit in one batch does not repeat it.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::model::{ChangeKind, Delta, DomainEvent, WorkloadStatus};
use crate::snapshot::ActiveUnits;

/// Classify `delta`, returning the events it produces in emission order.
///
/// Deltas for entities other than units, and deltas for the governor's own
/// units (any unit whose name contains `governor`), produce nothing.
pub fn classify(
    delta: &Delta,
    governor: &str,
    seen: &mut BTreeSet<String>,
    active: &mut ActiveUnits,
) -> Vec<DomainEvent> {
    if !delta.is_unit() || delta.entity_id.contains(governor) {
        return Vec::new();
    }
    let unit = delta.entity_id.as_str();

    match delta.change {
        ChangeKind::Remove => {
            // Removal leaves the snapshot alone; a stale active entry survives
            // until the next status delta for a unit with the same name.
            info!(unit, "unit removed");
            vec![DomainEvent::UnitRemoved {
                unit_name: unit.to_string(),
            }]
        }
        ChangeKind::Change => {
            let mut events = Vec::new();

            if seen.insert(unit.to_string()) {
                info!(unit, "unit added");
                events.push(DomainEvent::UnitAdded {
                    unit_name: unit.to_string(),
                });
            }

            let Some(status) = &delta.workload_status else {
                warn!(unit, "change delta without workload status");
                return events;
            };
            let message = delta.status_message.clone().unwrap_or_default();

            match status {
                WorkloadStatus::Active => {
                    if active.mark_active(unit) {
                        info!(unit, "unit became active");
                    }
                }
                WorkloadStatus::Blocked => {
                    let was_active = active.mark_inactive(unit);
                    warn!(unit, was_active, %message, "unit blocked");
                    events.push(DomainEvent::UnitBlocked {
                        unit_name: unit.to_string(),
                        was_active,
                        message,
                    });
                }
                WorkloadStatus::Error => {
                    let was_active = active.mark_inactive(unit);
                    warn!(unit, was_active, %message, "unit in error");
                    events.push(DomainEvent::UnitError {
                        unit_name: unit.to_string(),
                        was_active,
                        message,
                    });
                }
                WorkloadStatus::Other(other) => {
                    debug!(unit, status = %other, "ignoring workload status");
                }
            }

            events
        }
    }
}
