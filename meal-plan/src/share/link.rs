use actix_web::web::Query;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::plan::types::PlanMode;
use crate::{Error, Result};

/// Shareable plan state carried in a URL query string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub seed: i64,
    /// Encoded override map; absent means the baseline is unmodified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PlanMode>,
}

impl ShareLink {
    pub fn new(seed: i64) -> Self {
        Self {
            seed,
            overrides: None,
            start: None,
            mode: None,
        }
    }

    pub fn with_overrides(mut self, encoded: String) -> Self {
        self.overrides = Some(encoded).filter(|encoded| !encoded.is_empty());
        self
    }

    pub fn with_window(mut self, start: NaiveDate, mode: PlanMode) -> Self {
        self.start = Some(start);
        self.mode = Some(mode);
        self
    }

    pub fn parse(query: &str) -> Result<Self> {
        let query = query.trim_start_matches('?');
        Query::<ShareLink>::from_query(query)
            .map(Query::into_inner)
            .map_err(|e| Error::InvalidInput(format!("bad share link: {}", e)))
    }

    /// Form-encoded query string (`seed=..&overrides=..`) without a leading `?`
    pub fn to_query(&self) -> Result<String> {
        Ok(serde_urlencoded::to_string(self)?)
    }
}
