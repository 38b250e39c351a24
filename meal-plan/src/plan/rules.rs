use std::collections::HashSet;
use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Rules at or above this priority claim days before the template fill.
pub const CLAIM_PRIORITY: i32 = 90;

/// Which day a forced dish lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DaySelector {
    Any,
    On(Weekday),
}

impl TryFrom<String> for DaySelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("any") {
            return Ok(DaySelector::Any);
        }
        value
            .parse::<Weekday>()
            .map(DaySelector::On)
            .map_err(|_| format!("unknown day '{}'", value))
    }
}

impl From<DaySelector> for String {
    fn from(day: DaySelector) -> Self {
        day.to_string()
    }
}

impl fmt::Display for DaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaySelector::Any => f.write_str("any"),
            DaySelector::On(weekday) => write!(f, "{}", weekday),
        }
    }
}

/// How often a forced dish recurs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Weekly,
    /// Even-numbered weeks of the planning window
    Fortnightly,
    /// Once per calendar month
    Monthly,
}

/// A planning rule. Higher `priority` resolves first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    ForceDishOnDay {
        main: String,
        day: DaySelector,
        #[serde(default)]
        frequency: Frequency,
        priority: i32,
    },
    ForceCategoryOnDay {
        category: String,
        day: Weekday,
        priority: i32,
    },
    ForceSide {
        main: String,
        side: String,
        priority: i32,
    },
    AvoidSidePairing {
        main: String,
        invalid_sides: Vec<String>,
        priority: i32,
    },
    ForcePrepTask {
        side_substring: String,
        task_type: String,
        priority: i32,
    },
    NoPrepOnCategory {
        category: String,
        priority: i32,
    },
}

impl Rule {
    pub fn priority(&self) -> i32 {
        match self {
            Rule::ForceDishOnDay { priority, .. }
            | Rule::ForceCategoryOnDay { priority, .. }
            | Rule::ForceSide { priority, .. }
            | Rule::AvoidSidePairing { priority, .. }
            | Rule::ForcePrepTask { priority, .. }
            | Rule::NoPrepOnCategory { priority, .. } => *priority,
        }
    }
}

/// Rules sorted once, highest priority first. Ties keep configuration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: &[Rule]) -> Self {
        let mut rules = rules.to_vec();
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Day-claiming rules that run before the template fill
    pub fn claim_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| {
            rule.priority() >= CLAIM_PRIORITY
                && matches!(
                    rule,
                    Rule::ForceDishOnDay { .. } | Rule::ForceCategoryOnDay { .. }
                )
        })
    }

    pub fn forced_side(&self, main_dish: &str) -> Option<&str> {
        self.rules.iter().find_map(|rule| match rule {
            Rule::ForceSide { main, side, .. } if main == main_dish => Some(side.as_str()),
            _ => None,
        })
    }

    pub fn invalid_sides(&self, main_dish: &str) -> HashSet<&str> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                Rule::AvoidSidePairing {
                    main,
                    invalid_sides,
                    ..
                } if main == main_dish => Some(invalid_sides),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Task type demanded by the first `ForcePrepTask` whose substring occurs in `side`
    pub fn forced_prep_type(&self, side: &str) -> Option<&str> {
        self.rules.iter().find_map(|rule| match rule {
            Rule::ForcePrepTask {
                side_substring,
                task_type,
                ..
            } if side.contains(side_substring.as_str()) => Some(task_type.as_str()),
            _ => None,
        })
    }

    pub fn blocks_prep(&self, day_category: &str) -> bool {
        self.rules.iter().any(|rule| {
            matches!(rule, Rule::NoPrepOnCategory { category, .. } if category == day_category)
        })
    }
}
