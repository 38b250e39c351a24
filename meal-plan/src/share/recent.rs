use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentPlan {
    pub seed: i64,
    #[serde(default)]
    pub overrides: String,
    pub date: DateTime<Utc>,
}

/// Recently viewed plans, newest first, at most ten, unique by (seed, overrides)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentPlans {
    plans: Vec<RecentPlan>,
}

impl RecentPlans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the list, treating a missing file as empty
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No recent plans file at {}", path.display());
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        let mut recent: RecentPlans = serde_json::from_str(&text)?;
        recent.plans.truncate(RECENT_LIMIT);
        Ok(recent)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved {} recent plans to {}", self.plans.len(), path.display());
        Ok(())
    }

    /// Moves (or inserts) the plan to the front
    pub fn record(&mut self, seed: i64, overrides: &str, date: DateTime<Utc>) {
        self.plans
            .retain(|plan| !(plan.seed == seed && plan.overrides == overrides));
        self.plans.insert(
            0,
            RecentPlan {
                seed,
                overrides: overrides.to_string(),
                date,
            },
        );
        self.plans.truncate(RECENT_LIMIT);
    }

    pub fn plans(&self) -> &[RecentPlan] {
        &self.plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, minute, 0).unwrap()
    }

    #[test]
    fn newest_first_and_capped() {
        let mut recent = RecentPlans::new();
        for seed in 0..15 {
            recent.record(seed, "", at(seed as u32));
        }
        assert_eq!(recent.len(), RECENT_LIMIT);
        assert_eq!(recent.plans()[0].seed, 14);
        assert_eq!(recent.plans()[9].seed, 5);
    }

    #[test]
    fn deduplicates_by_seed_and_overrides() {
        let mut recent = RecentPlans::new();
        recent.record(1, "3,0,1,0,0", at(0));
        recent.record(2, "", at(1));
        recent.record(1, "3,0,1,0,0", at(2));
        recent.record(1, "", at(3));
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.plans()[0].overrides, "");
        assert_eq!(recent.plans()[1].date, at(2));
    }

    #[test]
    fn persists_to_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recent.json");
        assert!(RecentPlans::load(&path).unwrap().is_empty());

        let mut recent = RecentPlans::new();
        recent.record(9, "1,0,0,0,-1", at(5));
        recent.save(&path).unwrap();
        assert_eq!(RecentPlans::load(&path).unwrap(), recent);
    }
}
