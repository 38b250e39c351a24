use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::ScheduleEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub qty: f64,
    pub unit: String,
    pub category: String,
}

/// Ingredient database keyed by dish name
pub trait IngredientSource {
    /// Unknown dishes resolve to an empty list
    fn ingredients(&self, dish: &str) -> &[Ingredient];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub qty: f64,
    pub unit: String,
    pub category: String,
}

pub type ShoppingList = BTreeMap<String, ShoppingItem>;

/// Dishes cooked for one day: the main, each base side, and the prep task.
pub fn dishes_for(entry: &ScheduleEntry) -> BTreeSet<String> {
    let mut dishes = BTreeSet::new();
    if !entry.main_dish.is_empty() {
        dishes.insert(entry.main_dish.clone());
    }
    dishes.extend(entry.side_dish.components());
    if let Some(task) = &entry.side_dish.prep_task {
        dishes.insert(task.clone());
    }
    dishes
}

/// Sums ingredient quantities across every dish in `week`.
pub fn aggregate<S: IngredientSource + ?Sized>(week: &[ScheduleEntry], source: &S) -> ShoppingList {
    let mut list = ShoppingList::new();
    for entry in week {
        for dish in dishes_for(entry) {
            let ingredients = source.ingredients(&dish);
            if ingredients.is_empty() {
                debug!("No ingredients recorded for {}", dish);
            }
            for ingredient in ingredients {
                list.entry(ingredient.name.clone())
                    .and_modify(|item| item.qty += ingredient.qty)
                    .or_insert_with(|| ShoppingItem {
                        qty: ingredient.qty,
                        unit: ingredient.unit.clone(),
                        category: ingredient.category.clone(),
                    });
            }
        }
    }
    list
}

/// Groups an aggregated list by ingredient category for display
pub fn by_category(list: &ShoppingList) -> BTreeMap<&str, Vec<(&str, &ShoppingItem)>> {
    let mut grouped: BTreeMap<&str, Vec<(&str, &ShoppingItem)>> = BTreeMap::new();
    for (name, item) in list {
        grouped
            .entry(item.category.as_str())
            .or_default()
            .push((name.as_str(), item));
    }
    grouped
}
