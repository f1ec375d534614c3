//! The set of units currently considered healthy.
//!
//! Seeded once from the model status, then maintained incrementally by the
//! classifier as workload-status deltas arrive.

use std::collections::BTreeSet;

use crate::model::{Application, WorkloadStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveUnits {
    units: BTreeSet<String>,
}

impl ActiveUnits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `active` unit of every application except `governor`.
    pub fn initialize(applications: &[Application], governor: &str) -> Self {
        let units = applications
            .iter()
            .filter(|app| app.name != governor)
            .flat_map(|app| app.units.iter())
            .filter(|unit| unit.workload_status == WorkloadStatus::Active)
            .map(|unit| unit.name.clone())
            .collect();
        Self { units }
    }

    /// Insert `unit`. Returns true if it was not active before.
    pub fn mark_active(&mut self, unit: &str) -> bool {
        self.units.insert(unit.to_string())
    }

    /// Remove `unit`. Returns whether it was active before the call.
    pub fn mark_inactive(&mut self, unit: &str) -> bool {
        self.units.remove(unit)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.units.contains(unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ActiveUnits {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().map(Into::into).collect(),
        }
    }
}
