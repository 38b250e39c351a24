use chrono::{Datelike, NaiveDate, Weekday};

use super::types::PlanMode;

/// Planned days per week; Sunday is never planned.
pub const DAYS_PER_WEEK: usize = 6;

/// Non-Sunday dates covered by a plan starting on `start`.
pub fn planning_dates(start: NaiveDate, mode: PlanMode) -> Vec<NaiveDate> {
    let planned = start
        .iter_days()
        .filter(|date| date.weekday() != Weekday::Sun);
    match mode {
        PlanMode::Week => planned.take(DAYS_PER_WEEK).collect(),
        PlanMode::Year => {
            let year = start.year();
            planned.take_while(|date| date.year() == year).collect()
        }
    }
}

pub fn day_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_skips_sunday() {
        // 2024-06-06 is a Thursday
        let dates = planning_dates(date(2024, 6, 6), PlanMode::Week);
        assert_eq!(dates.len(), 6);
        assert!(dates.iter().all(|d| d.weekday() != Weekday::Sun));
        assert_eq!(dates.last(), Some(&date(2024, 6, 12)));
    }

    #[test]
    fn year_runs_through_december() {
        let dates = planning_dates(date(2024, 12, 20), PlanMode::Year);
        assert_eq!(dates.first(), Some(&date(2024, 12, 20)));
        assert_eq!(dates.last(), Some(&date(2024, 12, 31)));
        // 22nd and 29th are Sundays
        assert_eq!(dates.len(), 10);
    }

    #[test]
    fn names_days() {
        assert_eq!(day_name(date(2024, 6, 10)), "Monday");
    }
}
