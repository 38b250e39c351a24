use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plan::types::{ScheduleEntry, SideDish};
use super::codec::{encode, MasterIndexLists};

/// A user edit for one day of the plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub main_dish: String,
    pub category: String,
    pub side_dish: SideDish,
}

/// Sparse day index -> edit. Only modified days are present.
pub type OverrideMap = BTreeMap<usize, Override>;

/// Layers `overrides` over `baseline`. Days whose override has no main dish
/// are left alone; dates and day names are never touched.
pub fn apply(baseline: &[ScheduleEntry], overrides: &OverrideMap) -> Vec<ScheduleEntry> {
    let mut schedule = baseline.to_vec();
    for (&day, edit) in overrides {
        if edit.main_dish.is_empty() {
            continue;
        }
        if let Some(entry) = schedule.get_mut(day) {
            entry.category = edit.category.clone();
            entry.main_dish = edit.main_dish.clone();
            entry.side_dish = edit.side_dish.clone();
        }
    }
    schedule
}

/// Mutable override map for the active plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    overrides: OverrideMap,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(overrides: OverrideMap) -> Self {
        Self { overrides }
    }

    pub fn map(&self) -> &OverrideMap {
        &self.overrides
    }

    pub fn set(&mut self, day: usize, edit: Override) {
        self.overrides.insert(day, edit);
    }

    pub fn clear_day(&mut self, day: usize) -> Option<Override> {
        self.overrides.remove(&day)
    }

    /// Whole-map overwrite used for remote updates
    pub fn replace_all(&mut self, overrides: OverrideMap) {
        self.overrides = overrides;
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn apply(&self, baseline: &[ScheduleEntry]) -> Vec<ScheduleEntry> {
        apply(baseline, &self.overrides)
    }

    /// Encoded form used in share links and on the sync channel
    pub fn serialize(&self, lists: &MasterIndexLists) -> String {
        encode(&self.overrides, lists)
    }
}
