pub mod types;
pub mod random;
pub mod rules;
pub mod calendar;
pub mod generator;
pub mod shopping;

pub use types::{PlanMode, ScheduleEntry, SideDish};
pub use random::SeededRandom;
pub use rules::{Rule, RuleSet};
pub use generator::{week_slice, ScheduleGenerator};
pub use shopping::{aggregate, IngredientSource, ShoppingList};
