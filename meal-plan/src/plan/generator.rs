use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::config::{MenuConfig, SideSource};
use super::calendar::{day_name, planning_dates, DAYS_PER_WEEK};
use super::random::SeededRandom;
use super::rules::{DaySelector, Frequency, Rule, RuleSet};
use super::types::{PlanMode, ScheduleEntry, SideDish};

/// Category (and possibly a forced main) decided for one day before dish selection
#[derive(Debug, Clone)]
struct DaySlot {
    category: String,
    forced_main: Option<String>,
}

/// Weekly uniqueness sets and per-month usage counters
#[derive(Debug, Default)]
struct UsageTracker {
    week_mains: HashSet<String>,
    week_sides: HashSet<String>,
    month_counts: HashMap<String, u32>,
    month: Option<(i32, u32)>,
}

impl UsageTracker {
    fn start_week(&mut self) {
        self.week_mains.clear();
        self.week_sides.clear();
    }

    /// Resets monthly counters when `date` falls in a new calendar month
    fn observe(&mut self, date: NaiveDate) {
        let key = (date.year(), date.month());
        if self.month != Some(key) {
            if self.month.is_some() {
                debug!("Month changed to {}-{:02}, resetting usage counters", key.0, key.1);
            }
            self.month_counts.clear();
            self.month = Some(key);
        }
    }

    fn monthly_count(&self, main: &str) -> u32 {
        self.month_counts.get(main).copied().unwrap_or(0)
    }

    fn used_main_this_week(&self, main: &str) -> bool {
        self.week_mains.contains(main)
    }

    /// Keeps a main claimed for a later day out of this week's random picks
    fn reserve_main(&mut self, main: &str) {
        self.week_mains.insert(main.to_string());
    }

    fn used_side_this_week(&self, side: &str) -> bool {
        self.week_sides.contains(side)
    }

    fn record(&mut self, main: &str, side: &SideDish) {
        if !main.is_empty() {
            self.week_mains.insert(main.to_string());
            *self.month_counts.entry(main.to_string()).or_insert(0) += 1;
        }
        if !side.base.is_empty() {
            self.week_sides.insert(side.base.clone());
            self.week_sides.extend(side.components());
        }
    }
}

/// Builds date-ordered schedules from a menu.
///
/// Each week of six days gets a shuffled copy of the category template;
/// high-priority rules claim days first, the rest are filled in date order.
/// When weekly variety and monthly caps cannot both hold, the weekly
/// constraint is dropped first, then the monthly one. Generation never fails.
pub struct ScheduleGenerator<'a> {
    menu: &'a MenuConfig,
    rules: RuleSet,
}

impl<'a> ScheduleGenerator<'a> {
    pub fn new(menu: &'a MenuConfig) -> Self {
        Self {
            menu,
            rules: RuleSet::new(&menu.rules),
        }
    }

    pub fn generate(&self, seed: i64, start: NaiveDate, mode: PlanMode) -> Vec<ScheduleEntry> {
        let dates = planning_dates(start, mode);
        let mut rng = SeededRandom::new(seed);
        let mut usage = UsageTracker::default();
        let mut schedule = Vec::with_capacity(dates.len());

        for (week_index, week) in dates.chunks(DAYS_PER_WEEK).enumerate() {
            usage.start_week();
            usage.observe(week[0]);
            let slots = self.assign_categories(week, week_index, &usage, &mut rng);
            for main in slots.iter().filter_map(|slot| slot.forced_main.as_deref()) {
                usage.reserve_main(main);
            }

            for (date, slot) in week.iter().zip(slots) {
                usage.observe(*date);
                let main = match slot.forced_main {
                    Some(main) => main,
                    None => self.pick_main(&slot.category, &usage, &mut rng),
                };
                let side = self.pick_side(&slot.category, &main, &usage, &mut rng);
                let side_dish = self.annotate_prep(&slot.category, &main, side, &mut rng);
                usage.record(&main, &side_dish);

                schedule.push(ScheduleEntry {
                    date: *date,
                    day_name: day_name(*date),
                    category: slot.category,
                    main_dish: main,
                    side_dish,
                });
            }
        }

        info!(
            "Generated {} planned days from seed {} starting {}",
            schedule.len(),
            seed,
            start
        );
        schedule
    }

    /// Shuffles the template, lets claim rules take days, then fills the rest in order.
    fn assign_categories(
        &self,
        week: &[NaiveDate],
        week_index: usize,
        usage: &UsageTracker,
        rng: &mut SeededRandom,
    ) -> Vec<DaySlot> {
        let mut pool = self.menu.category_template.clone();
        rng.shuffle_by_comparison(&mut pool);

        let mut claimed: Vec<Option<DaySlot>> = vec![None; week.len()];
        for rule in self.rules.claim_rules() {
            match rule {
                Rule::ForceDishOnDay {
                    main,
                    day,
                    frequency,
                    ..
                } => {
                    if !self.frequency_due(*frequency, week_index, main, usage) {
                        continue;
                    }
                    let Some(category) = self.menu.category_of(main) else {
                        continue;
                    };
                    let day_index = match day {
                        DaySelector::Any => {
                            let open: Vec<usize> = (0..week.len())
                                .filter(|&i| claimed[i].is_none())
                                .collect();
                            rng.pick(&open).copied()
                        }
                        DaySelector::On(weekday) => week
                            .iter()
                            .position(|date| date.weekday() == *weekday)
                            .filter(|&i| claimed[i].is_none()),
                    };
                    if let Some(i) = day_index {
                        debug!("Forcing {} on {}", main, week[i]);
                        claimed[i] = Some(DaySlot {
                            category: category.to_string(),
                            forced_main: Some(main.clone()),
                        });
                        remove_first(&mut pool, category);
                    }
                }
                Rule::ForceCategoryOnDay { category, day, .. } => {
                    let day_index = week
                        .iter()
                        .position(|date| date.weekday() == *day)
                        .filter(|&i| claimed[i].is_none());
                    if let Some(i) = day_index {
                        claimed[i] = Some(DaySlot {
                            category: category.clone(),
                            forced_main: None,
                        });
                        remove_first(&mut pool, category);
                    }
                }
                _ => {}
            }
        }

        let mut pool = pool.into_iter();
        let mut refill = self.menu.category_template.iter().cycle();
        claimed
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| DaySlot {
                    category: pool
                        .next()
                        .or_else(|| refill.next().cloned())
                        .unwrap_or_default(),
                    forced_main: None,
                })
            })
            .collect()
    }

    fn frequency_due(
        &self,
        frequency: Frequency,
        week_index: usize,
        main: &str,
        usage: &UsageTracker,
    ) -> bool {
        match frequency {
            Frequency::Weekly => true,
            Frequency::Fortnightly => week_index % 2 == 0,
            Frequency::Monthly => usage.monthly_count(main) == 0,
        }
    }

    /// Fresh and under cap, then under cap, then anything in the category
    fn pick_main(&self, category: &str, usage: &UsageTracker, rng: &mut SeededRandom) -> String {
        let options = self.menu.main_options(category);
        let within_cap = |main: &&String| {
            self.menu
                .monthly_limit(main)
                .map_or(true, |limit| usage.monthly_count(main) < limit)
        };

        let fresh: Vec<&String> = options
            .iter()
            .filter(within_cap)
            .filter(|main| !usage.used_main_this_week(main))
            .collect();
        if let Some(main) = rng.pick(&fresh) {
            return main.to_string();
        }

        debug!("{}: every capped option used this week, allowing a repeat", category);
        let capped: Vec<&String> = options.iter().filter(within_cap).collect();
        if let Some(main) = rng.pick(&capped) {
            return main.to_string();
        }

        debug!("{}: every option at its monthly limit, ignoring caps", category);
        rng.pick(options).cloned().unwrap_or_default()
    }

    /// Forced side, fixed side, or a random allowed side not yet served this week
    fn pick_side(
        &self,
        category: &str,
        main: &str,
        usage: &UsageTracker,
        rng: &mut SeededRandom,
    ) -> String {
        if let Some(side) = self.rules.forced_side(main) {
            return side.to_string();
        }
        let options: Vec<&str> = match self.menu.side_source(category) {
            None => return String::new(),
            Some(SideSource::Fixed(side)) => return side.clone(),
            Some(SideSource::List(sides)) => sides.iter().map(String::as_str).collect(),
            Some(SideSource::PerMain(by_main)) => by_main
                .get(main)
                .map(|sides| sides.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        };

        let invalid = self.rules.invalid_sides(main);
        let allowed: Vec<&str> = options
            .iter()
            .copied()
            .filter(|side| !invalid.contains(side))
            .collect();
        let fresh: Vec<&str> = allowed
            .iter()
            .copied()
            .filter(|side| !usage.used_side_this_week(side))
            .collect();

        if let Some(side) = rng.pick(&fresh) {
            return side.to_string();
        }
        if let Some(side) = rng.pick(&allowed) {
            return side.to_string();
        }
        options.first().map(|side| side.to_string()).unwrap_or_default()
    }

    /// Attaches a prep task unless the category forbids one
    fn annotate_prep(
        &self,
        category: &str,
        main: &str,
        base: String,
        rng: &mut SeededRandom,
    ) -> SideDish {
        let mut side = SideDish::new(base);
        if self.rules.blocks_prep(category) {
            return side;
        }

        let forced = self
            .rules
            .forced_prep_type(&side.base)
            .and_then(|kind| self.menu.prep_task_of_kind(kind));
        if let Some(task) = forced {
            side.prep_task = Some(task.to_string());
            return side;
        }

        if self.menu.is_easy_main(main) || self.menu.has_easy_side(&side.base) {
            let tasks = self.menu.prep_task_names();
            side.prep_task = rng.pick(&tasks).map(|task| task.to_string());
        }
        side
    }
}

fn remove_first(pool: &mut Vec<String>, category: &str) {
    if let Some(index) = pool.iter().position(|c| c == category) {
        pool.remove(index);
    }
}

/// The `week`-th six-day slice of a schedule
pub fn week_slice(schedule: &[ScheduleEntry], week: usize) -> &[ScheduleEntry] {
    schedule.chunks(DAYS_PER_WEEK).nth(week).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Weekday;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn menu(text: &str) -> MenuConfig {
        MenuConfig::from_toml_str(text).unwrap()
    }

    #[test]
    fn same_seed_same_plan() {
        let menu = MenuConfig::builtin().unwrap();
        let generator = ScheduleGenerator::new(&menu);
        let a = generator.generate(42, date(2024, 1, 1), PlanMode::Year);
        let b = generator.generate(42, date(2024, 1, 1), PlanMode::Year);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_vary_the_plan() {
        let menu = MenuConfig::builtin().unwrap();
        let generator = ScheduleGenerator::new(&menu);
        let plans: HashSet<Vec<String>> = (1..20)
            .map(|seed| {
                generator
                    .generate(seed, date(2024, 3, 4), PlanMode::Week)
                    .into_iter()
                    .map(|entry| entry.main_dish)
                    .collect()
            })
            .collect();
        assert!(plans.len() > 1);
    }

    #[test]
    fn entries_follow_planning_dates() {
        let menu = MenuConfig::builtin().unwrap();
        let schedule =
            ScheduleGenerator::new(&menu).generate(7, date(2024, 6, 6), PlanMode::Week);
        let dates: Vec<NaiveDate> = schedule.iter().map(|e| e.date).collect();
        assert_eq!(dates, planning_dates(date(2024, 6, 6), PlanMode::Week));
        assert_eq!(schedule[0].day_name, "Thursday");
    }

    #[test]
    fn mains_are_unique_within_a_week_when_options_allow() {
        let menu = menu(
            r#"
            category_template = ["A", "B", "A", "B", "A", "B"]
            [categories.A]
            mains = ["a1", "a2", "a3", "a4"]
            sides = ["s1", "s2", "s3", "s4"]
            [categories.B]
            mains = ["b1", "b2", "b3"]
            sides = ["t1", "t2", "t3"]
            "#,
        );
        let generator = ScheduleGenerator::new(&menu);
        for seed in 0..25 {
            let schedule = generator.generate(seed, date(2024, 1, 1), PlanMode::Year);
            for week in schedule.chunks(DAYS_PER_WEEK) {
                let mains: HashSet<&str> = week.iter().map(|e| e.main_dish.as_str()).collect();
                assert_eq!(mains.len(), week.len(), "seed {seed}: {:?}", week);
                let sides: HashSet<String> = week.iter().map(|e| e.side_dish.base.clone()).collect();
                assert_eq!(sides.len(), week.len());
            }
        }
    }

    #[test]
    fn repeats_only_after_options_are_exhausted() {
        let menu = menu(
            r#"
            category_template = ["A", "A", "A", "A", "A", "A"]
            [categories.A]
            mains = ["x", "y"]
            sides = ["s"]
            "#,
        );
        let generator = ScheduleGenerator::new(&menu);
        for seed in 0..25 {
            let week = generator.generate(seed, date(2024, 1, 1), PlanMode::Week);
            assert_ne!(week[0].main_dish, week[1].main_dish);
            assert!(week.iter().all(|e| e.side_dish.base == "s"));
        }
    }

    #[test]
    fn monthly_cap_is_respected() {
        let menu = menu(
            r#"
            category_template = ["A", "A", "A", "A", "A", "A"]
            [monthly_limits]
            x = 1
            [categories.A]
            mains = ["x", "y", "z"]
            sides = ["s"]
            "#,
        );
        let generator = ScheduleGenerator::new(&menu);
        for seed in 0..10 {
            let schedule = generator.generate(seed, date(2024, 1, 1), PlanMode::Year);
            let mut per_month: HashMap<u32, u32> = HashMap::new();
            for entry in schedule.iter().filter(|e| e.main_dish == "x") {
                *per_month.entry(entry.date.month()).or_insert(0) += 1;
            }
            assert!(per_month.values().all(|&count| count <= 1), "{per_month:?}");
        }
    }

    #[test]
    fn monthly_cap_gives_way_when_nothing_else_fits() {
        let menu = menu(
            r#"
            category_template = ["A", "A", "A", "A", "A", "A"]
            [monthly_limits]
            only = 1
            [categories.A]
            mains = ["only"]
            sides = ["s"]
            "#,
        );
        let week = ScheduleGenerator::new(&menu).generate(3, date(2024, 1, 1), PlanMode::Week);
        assert!(week.iter().all(|e| e.main_dish == "only"));
    }

    #[test]
    fn builtin_rules_shape_every_full_week() {
        let menu = MenuConfig::builtin().unwrap();
        let generator = ScheduleGenerator::new(&menu);
        for seed in [1, 99, 2024, -5] {
            let schedule = generator.generate(seed, date(2024, 1, 1), PlanMode::Year);
            for week in schedule.chunks(DAYS_PER_WEEK).filter(|w| w.len() == DAYS_PER_WEEK) {
                let saturday = week.iter().find(|e| e.date.weekday() == Weekday::Sat).unwrap();
                assert_eq!(saturday.category, "Biryani");
                assert!(week.iter().any(|e| e.main_dish == "Dosa"));
            }
            for entry in &schedule {
                if entry.main_dish == "Poori" {
                    assert_eq!(entry.side_dish.base, "Potato Masala");
                }
                if entry.main_dish == "Paratha" {
                    assert_ne!(entry.side_dish.base, "Dal Fry");
                }
                if entry.category == "Biryani" {
                    assert!(entry.side_dish.prep_task.is_none());
                } else if entry.side_dish.base.contains("Sambar") {
                    assert_eq!(entry.side_dish.prep_task.as_deref(), Some("Idli Batter"));
                }
            }
        }
    }

    #[test]
    fn easy_mains_get_a_prep_task() {
        let menu = menu(
            r#"
            category_template = ["A"]
            easy_main_dishes = ["quick"]
            [categories.A]
            mains = ["quick"]
            sides = ["plain"]
            [[prep_tasks]]
            name = "Chop Onions"
            type = "chop"
            "#,
        );
        let week = ScheduleGenerator::new(&menu).generate(11, date(2024, 1, 1), PlanMode::Week);
        assert!(week
            .iter()
            .all(|e| e.side_dish.to_string() == "plain (+ Prep: Chop Onions)"));
    }

    #[test]
    fn fixed_side_is_used_verbatim() {
        let menu = MenuConfig::builtin().unwrap();
        let schedule =
            ScheduleGenerator::new(&menu).generate(5, date(2024, 1, 1), PlanMode::Year);
        for entry in schedule.iter().filter(|e| e.category == "Variety Rice") {
            assert_eq!(entry.side_dish.base, "Papad and Potato Fry");
        }
    }

    #[test]
    fn forced_main_is_not_drawn_earlier_in_its_week() {
        let menu = menu(
            r#"
            category_template = ["A", "A", "A", "A", "A", "A"]
            [categories.A]
            mains = ["x", "m1", "m2", "m3", "m4", "m5", "m6", "m7"]
            sides = ["s1", "s2", "s3", "s4", "s5", "s6"]

            [[rules]]
            type = "force_dish_on_day"
            main = "x"
            day = "Sat"
            priority = 95
            "#,
        );
        let generator = ScheduleGenerator::new(&menu);
        for seed in 0..50 {
            let week = generator.generate(seed, date(2024, 1, 1), PlanMode::Week);
            let mains: Vec<&str> = week.iter().map(|e| e.main_dish.as_str()).collect();
            assert_eq!(mains.iter().filter(|&&m| m == "x").count(), 1, "seed {seed}: {mains:?}");
            assert_eq!(week[5].date.weekday(), Weekday::Sat);
            assert_eq!(week[5].main_dish, "x");
        }
    }

    /// Template only serves `A`; `x` lives in `B`, so it appears only when claimed
    fn claimed_menu(rules: &str) -> MenuConfig {
        menu(&format!(
            r#"
            category_template = ["A", "A", "A", "A", "A", "A"]
            [categories.A]
            mains = ["a1", "a2", "a3", "a4", "a5", "a6"]
            sides = ["s1", "s2", "s3", "s4", "s5", "s6"]
            [categories.B]
            mains = ["x"]
            sides = ["b-side"]
            [categories.C]
            mains = ["c1"]
            sides = ["c-side"]
            {rules}
            "#
        ))
    }

    #[test]
    fn fortnightly_dish_lands_in_even_weeks_only() {
        let menu = claimed_menu(
            r#"
            [[rules]]
            type = "force_dish_on_day"
            main = "x"
            day = "any"
            frequency = "fortnightly"
            priority = 95
            "#,
        );
        let schedule = ScheduleGenerator::new(&menu).generate(17, date(2024, 1, 1), PlanMode::Year);
        for (index, week) in schedule.chunks(DAYS_PER_WEEK).enumerate() {
            let served = week.iter().filter(|e| e.main_dish == "x").count();
            let expected = if index % 2 == 0 { 1 } else { 0 };
            assert_eq!(served, expected, "week {index}");
        }
    }

    #[test]
    fn monthly_dish_lands_once_per_month() {
        let menu = claimed_menu(
            r#"
            [[rules]]
            type = "force_dish_on_day"
            main = "x"
            day = "any"
            frequency = "monthly"
            priority = 95
            "#,
        );
        for seed in [2, 40, 333] {
            let schedule =
                ScheduleGenerator::new(&menu).generate(seed, date(2024, 1, 1), PlanMode::Year);
            let mut per_month: HashMap<u32, u32> = HashMap::new();
            for entry in schedule.iter().filter(|e| e.main_dish == "x") {
                *per_month.entry(entry.date.month()).or_insert(0) += 1;
            }
            for month in 1..=12 {
                assert_eq!(per_month.get(&month), Some(&1), "seed {seed} month {month}");
            }
        }
    }

    #[test]
    fn named_weekday_claim_lands_on_that_day() {
        let menu = claimed_menu(
            r#"
            [[rules]]
            type = "force_dish_on_day"
            main = "x"
            day = "Wed"
            priority = 95
            "#,
        );
        let schedule = ScheduleGenerator::new(&menu).generate(8, date(2024, 1, 1), PlanMode::Year);
        for entry in &schedule {
            let wednesday = entry.date.weekday() == Weekday::Wed;
            assert_eq!(entry.main_dish == "x", wednesday, "{}", entry.date);
            if wednesday {
                assert_eq!(entry.category, "B");
            }
        }
    }

    #[test]
    fn category_claim_yields_to_an_earlier_claim() {
        let menu = claimed_menu(
            r#"
            [[rules]]
            type = "force_dish_on_day"
            main = "x"
            day = "Sat"
            priority = 99

            [[rules]]
            type = "force_category_on_day"
            category = "C"
            day = "Sat"
            priority = 95
            "#,
        );
        let schedule = ScheduleGenerator::new(&menu).generate(4, date(2024, 1, 1), PlanMode::Year);
        for entry in &schedule {
            assert_ne!(entry.category, "C");
            if entry.date.weekday() == Weekday::Sat {
                assert_eq!(entry.main_dish, "x");
                assert_eq!(entry.category, "B");
            }
        }
    }

    #[test]
    fn week_slice_returns_six_days() {
        let menu = MenuConfig::builtin().unwrap();
        let schedule =
            ScheduleGenerator::new(&menu).generate(5, date(2024, 1, 1), PlanMode::Year);
        assert_eq!(week_slice(&schedule, 1).len(), 6);
        assert_eq!(week_slice(&schedule, 1)[0].date, date(2024, 1, 8));
        assert!(week_slice(&schedule, 10_000).is_empty());
    }
}
