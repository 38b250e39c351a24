use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const PREP_OPEN: &str = " (+ ";
const PREP_PREFIX: &str = "Prep: ";

/// A side dish with its optional prep-task annotation.
///
/// On the wire (API bodies, share codec, CLI output) this is the composite
/// string `"<base> (+ Prep: <task>)"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct SideDish {
    pub base: String,
    pub prep_task: Option<String>,
}

impl SideDish {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            prep_task: None,
        }
    }

    pub fn with_prep(base: impl Into<String>, prep_task: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            prep_task: Some(prep_task.into()),
        }
    }

    /// Parses the composite form. Text after `" (+ "` that is not a
    /// `Prep: X)` annotation is dropped along with the marker.
    pub fn parse(composite: &str) -> Self {
        match composite.split_once(PREP_OPEN) {
            None => Self::new(composite),
            Some((base, rest)) => {
                let prep_task = rest
                    .strip_prefix(PREP_PREFIX)
                    .map(|task| task.strip_suffix(')').unwrap_or(task))
                    .filter(|task| !task.is_empty())
                    .map(str::to_string);
                Self {
                    base: base.to_string(),
                    prep_task,
                }
            }
        }
    }

    /// Individual dishes in the base side, split on commas and `"and"`.
    pub fn components(&self) -> Vec<String> {
        split_dishes(&self.base)
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.prep_task.is_none()
    }
}

impl fmt::Display for SideDish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prep_task {
            Some(task) => write!(f, "{}{}{}{})", self.base, PREP_OPEN, PREP_PREFIX, task),
            None => f.write_str(&self.base),
        }
    }
}

impl From<SideDish> for String {
    fn from(side: SideDish) -> Self {
        side.to_string()
    }
}

impl From<String> for SideDish {
    fn from(composite: String) -> Self {
        SideDish::parse(&composite)
    }
}

/// Splits a side description like `"Dal Fry and Raita, Papad"` into dish names.
pub fn split_dishes(text: &str) -> Vec<String> {
    text.split(',')
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// One planned day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub day_name: String,
    pub category: String,
    pub main_dish: String,
    pub side_dish: SideDish,
}

/// How far the planning window extends from its start date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Six non-Sunday days
    #[default]
    Week,
    /// Every non-Sunday day through 31 December
    Year,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prep_annotation() {
        let side = SideDish::parse("Dal Fry (+ Prep: Molaga Podi)");
        assert_eq!(side, SideDish::with_prep("Dal Fry", "Molaga Podi"));
        assert_eq!(side.to_string(), "Dal Fry (+ Prep: Molaga Podi)");
    }

    #[test]
    fn plain_side_has_no_prep() {
        let side = SideDish::parse("Raita");
        assert_eq!(side.base, "Raita");
        assert!(side.prep_task.is_none());
    }

    #[test]
    fn splits_components_on_and_and_commas() {
        let side = SideDish::new("Sambar and Potato Fry, Papad");
        assert_eq!(side.components(), vec!["Sambar", "Potato Fry", "Papad"]);
    }

    #[test]
    fn serializes_as_composite_string() {
        let side = SideDish::with_prep("Rasam", "Idli Batter");
        let json = serde_json::to_string(&side).unwrap();
        assert_eq!(json, "\"Rasam (+ Prep: Idli Batter)\"");
        let back: SideDish = serde_json::from_str(&json).unwrap();
        assert_eq!(back, side);
    }
}
