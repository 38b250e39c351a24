//! Menu configuration loading and validation

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::plan::rules::Rule;
use crate::plan::shopping::{Ingredient, IngredientSource};
use crate::{Error, Result};

const BUILTIN_MENU: &str = include_str!("../data/menu.toml");

/// Where a category's side dishes come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SideSource {
    /// Always served; never drawn at random
    Fixed(String),
    List(Vec<String>),
    PerMain(BTreeMap<String, Vec<String>>),
}

impl SideSource {
    /// Every side string this source can produce
    pub fn all_sides(&self) -> Vec<&str> {
        match self {
            SideSource::Fixed(side) => vec![side.as_str()],
            SideSource::List(sides) => sides.iter().map(String::as_str).collect(),
            SideSource::PerMain(by_main) => by_main
                .values()
                .flatten()
                .map(String::as_str)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMenu {
    pub mains: Vec<String>,
    pub sides: SideSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepTask {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Static menu: categories, dishes, rules, caps and the ingredient database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuConfig {
    /// One category per planned day of a week, shuffled each week
    pub category_template: Vec<String>,
    pub categories: BTreeMap<String, CategoryMenu>,
    #[serde(default)]
    pub monthly_limits: HashMap<String, u32>,
    #[serde(default)]
    pub easy_main_dishes: Vec<String>,
    #[serde(default)]
    pub easy_side_dishes: Vec<String>,
    #[serde(default)]
    pub prep_tasks: Vec<PrepTask>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub ingredients: HashMap<String, Vec<Ingredient>>,
}

impl MenuConfig {
    /// Menu bundled with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_MENU)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let menu = Self::from_toml_str(&text)?;
        info!(
            "Loaded menu from {} ({} categories, {} rules)",
            path.display(),
            menu.categories.len(),
            menu.rules.len()
        );
        Ok(menu)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let menu: MenuConfig = toml::from_str(text)?;
        menu.validate()?;
        Ok(menu)
    }

    /// Rejects menus the generator could not fill a week from
    pub fn validate(&self) -> Result<()> {
        if self.category_template.is_empty() {
            return Err(Error::Config("category_template is empty".to_string()));
        }
        for category in &self.category_template {
            if !self.categories.contains_key(category) {
                return Err(Error::Config(format!(
                    "category_template references unknown category '{}'",
                    category
                )));
            }
        }
        for (name, menu) in &self.categories {
            if menu.mains.is_empty() {
                return Err(Error::Config(format!("category '{}' has no mains", name)));
            }
        }
        for rule in &self.rules {
            match rule {
                Rule::ForceCategoryOnDay { category, .. }
                | Rule::NoPrepOnCategory { category, .. }
                    if !self.categories.contains_key(category) =>
                {
                    return Err(Error::Config(format!(
                        "rule references unknown category '{}'",
                        category
                    )));
                }
                Rule::ForceDishOnDay { main, .. } if self.category_of(main).is_none() => {
                    return Err(Error::Config(format!(
                        "forced dish '{}' is not on any category's menu",
                        main
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// First category (alphabetically) that lists `main` among its mains
    pub fn category_of(&self, main: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, menu)| menu.mains.iter().any(|m| m == main))
            .map(|(name, _)| name.as_str())
    }

    pub fn main_options(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(|menu| menu.mains.as_slice())
            .unwrap_or(&[])
    }

    pub fn side_source(&self, category: &str) -> Option<&SideSource> {
        self.categories.get(category).map(|menu| &menu.sides)
    }

    pub fn monthly_limit(&self, main: &str) -> Option<u32> {
        self.monthly_limits.get(main).copied()
    }

    pub fn is_easy_main(&self, main: &str) -> bool {
        self.easy_main_dishes.iter().any(|m| m == main)
    }

    pub fn has_easy_side(&self, side: &str) -> bool {
        self.easy_side_dishes
            .iter()
            .any(|easy| side.contains(easy.as_str()))
    }

    pub fn prep_task_of_kind(&self, kind: &str) -> Option<&str> {
        self.prep_tasks
            .iter()
            .find(|task| task.kind == kind)
            .map(|task| task.name.as_str())
    }

    pub fn prep_task_names(&self) -> Vec<&str> {
        self.prep_tasks.iter().map(|task| task.name.as_str()).collect()
    }
}

impl IngredientSource for MenuConfig {
    fn ingredients(&self, dish: &str) -> &[Ingredient] {
        self.ingredients
            .get(dish)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
