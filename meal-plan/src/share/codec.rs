//! Compact override encoding for share links and sync channels.
//!
//! ```text
//! Entries := Entry ('|' Entry)*
//! Entry   := day ',' main ',' category ',' side [',' prep]
//! ```
//!
//! Every field is an integer index into [`MasterIndexLists`]; `-1` means
//! "not found" (or "no prep task" for the last field). Four-field records
//! are the legacy form written before prep tasks were encoded.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MenuConfig;
use crate::plan::rules::Rule;
use crate::plan::types::SideDish;
use super::overrides::{Override, OverrideMap};

const ENTRY_SEPARATOR: &str = "|";
const FIELD_SEPARATOR: &str = ",";
const NOT_FOUND: i64 = -1;

/// Stable name lists the codec indexes into.
///
/// Categories, mains and sides are sorted and deduplicated; prep tasks keep
/// their configured order. Indices must stay stable for as long as encoded
/// strings are expected to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterIndexLists {
    pub categories: Vec<String>,
    pub main_dishes: Vec<String>,
    pub side_dishes: Vec<String>,
    pub prep_tasks: Vec<String>,
}

impl MasterIndexLists {
    pub fn new<I, J, K, L>(categories: I, main_dishes: J, side_dishes: K, prep_tasks: L) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
        K: IntoIterator<Item = String>,
        L: IntoIterator<Item = String>,
    {
        let mut prep: Vec<String> = Vec::new();
        for task in prep_tasks {
            if !prep.contains(&task) {
                prep.push(task);
            }
        }
        Self {
            categories: sorted_unique(categories),
            main_dishes: sorted_unique(main_dishes),
            side_dishes: sorted_unique(side_dishes),
            prep_tasks: prep,
        }
    }

    pub fn from_menu(menu: &MenuConfig) -> Self {
        let forced_sides = menu.rules.iter().filter_map(|rule| match rule {
            Rule::ForceSide { side, .. } => Some(side.clone()),
            _ => None,
        });
        Self::new(
            menu.categories.keys().cloned(),
            menu.categories
                .values()
                .flat_map(|category| category.mains.iter().cloned()),
            menu.categories
                .values()
                .flat_map(|category| category.sides.all_sides())
                .map(str::to_string)
                .chain(forced_sides),
            menu.prep_tasks.iter().map(|task| task.name.clone()),
        )
    }
}

fn sorted_unique<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut items: Vec<String> = items.into_iter().collect();
    items.sort();
    items.dedup();
    items
}

fn index_of(list: &[String], name: &str) -> i64 {
    list.iter()
        .position(|item| item == name)
        .map_or(NOT_FOUND, |index| index as i64)
}

fn lookup(list: &[String], index: i64) -> String {
    usize::try_from(index)
        .ok()
        .and_then(|index| list.get(index))
        .cloned()
        .unwrap_or_default()
}

pub fn encode(overrides: &OverrideMap, lists: &MasterIndexLists) -> String {
    overrides
        .iter()
        .map(|(day, edit)| {
            let prep = edit
                .side_dish
                .prep_task
                .as_deref()
                .map_or(NOT_FOUND, |task| index_of(&lists.prep_tasks, task));
            format!(
                "{day},{},{},{},{prep}",
                index_of(&lists.main_dishes, &edit.main_dish),
                index_of(&lists.categories, &edit.category),
                index_of(&lists.side_dishes, &edit.side_dish.base),
            )
        })
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// Decodes an override string. Malformed entries are skipped; unknown
/// indices decode to empty names. Never fails.
pub fn decode(encoded: &str, lists: &MasterIndexLists) -> OverrideMap {
    let mut overrides = OverrideMap::new();
    for segment in encoded.split(ENTRY_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match decode_entry(segment, lists) {
            Some((day, edit)) => {
                overrides.insert(day, edit);
            }
            None => warn!("Skipping malformed override entry '{}'", segment),
        }
    }
    overrides
}

fn decode_entry(segment: &str, lists: &MasterIndexLists) -> Option<(usize, Override)> {
    let fields: Vec<i64> = segment
        .split(FIELD_SEPARATOR)
        .map(|field| field.trim().parse::<i64>().ok())
        .collect::<Option<_>>()?;

    let (day, main, category, side, prep) = match fields.as_slice() {
        [day, main, category, side] => (*day, *main, *category, *side, NOT_FOUND),
        [day, main, category, side, prep] => (*day, *main, *category, *side, *prep),
        _ => return None,
    };
    let day = usize::try_from(day).ok()?;

    let prep_task = Some(lookup(&lists.prep_tasks, prep)).filter(|task| !task.is_empty());
    Some((
        day,
        Override {
            main_dish: lookup(&lists.main_dishes, main),
            category: lookup(&lists.categories, category),
            side_dish: SideDish {
                base: lookup(&lists.side_dishes, side),
                prep_task,
            },
        },
    ))
}
