use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;

use crate::plan::calendar::DAYS_PER_WEEK;
use crate::plan::shopping::{by_category, ShoppingList};
use crate::plan::ScheduleEntry;
use crate::Result;

/// One line per day: `Monday 2024-06-10  [Bread] Chapati with Dal Fry`
pub fn format_entry(entry: &ScheduleEntry) -> String {
    let side = entry.side_dish.to_string();
    if side.is_empty() {
        format!(
            "{:<9} {}  [{}] {}",
            entry.day_name, entry.date, entry.category, entry.main_dish
        )
    } else {
        format!(
            "{:<9} {}  [{}] {} with {}",
            entry.day_name, entry.date, entry.category, entry.main_dish, side
        )
    }
}

/// Prints a schedule week by week
pub fn print_schedule(title: &str, schedule: &[ScheduleEntry]) {
    println!("\n=== {} ===", title);
    println!("Total planned days: {}", schedule.len());
    for (week, days) in schedule.chunks(DAYS_PER_WEEK).enumerate() {
        println!("\nWeek {}:", week + 1);
        for entry in days {
            println!("  {}", format_entry(entry));
        }
    }
}

/// Writes the schedule as plain text, one day per line
pub fn write_schedule_to_file<P: AsRef<Path>>(
    title: &str,
    schedule: &[ScheduleEntry],
    path: P,
) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "** {} **", title)?;
    for entry in schedule {
        writeln!(file, "{}", format_entry(entry))?;
    }
    Ok(())
}

pub fn print_shopping_list(title: &str, list: &ShoppingList) {
    println!("\n=== {} ===", title);
    if list.is_empty() {
        println!("  (nothing to buy)");
        return;
    }
    for (category, items) in by_category(list) {
        println!("\n{}:", category);
        for (name, item) in items {
            println!("  - {} {} {}", name, format_qty(item.qty), item.unit);
        }
    }
}

/// Exports the shopping list as `ingredient,qty,unit,category` rows
pub fn write_shopping_csv<P: AsRef<Path>>(list: &ShoppingList, path: P) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    writer.write_record(["ingredient", "qty", "unit", "category"])?;
    for (name, item) in list {
        writer.write_record([
            name.as_str(),
            format_qty(item.qty).as_str(),
            item.unit.as_str(),
            item.category.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn format_qty(qty: f64) -> String {
    if qty.fract() == 0.0 {
        format!("{}", qty as i64)
    } else {
        format!("{:.2}", qty)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::plan::shopping::ShoppingItem;
    use crate::plan::SideDish;

    fn entry() -> ScheduleEntry {
        ScheduleEntry {
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            day_name: "Monday".into(),
            category: "Bread".into(),
            main_dish: "Chapati".into(),
            side_dish: SideDish::with_prep("Dal Fry", "Molaga Podi"),
        }
    }

    #[test]
    fn formats_a_day() {
        assert_eq!(
            format_entry(&entry()),
            "Monday    2024-06-10  [Bread] Chapati with Dal Fry (+ Prep: Molaga Podi)"
        );
    }

    #[test]
    fn writes_schedule_and_csv() {
        let dir = TempDir::new().unwrap();
        let plan_path = dir.path().join("plan.txt");
        write_schedule_to_file("Week", &[entry()], &plan_path).unwrap();
        let text = std::fs::read_to_string(&plan_path).unwrap();
        assert!(text.starts_with("** Week **\n"));

        let mut list = ShoppingList::new();
        list.insert(
            "Toor Dal".into(),
            ShoppingItem {
                qty: 300.0,
                unit: "g".into(),
                category: "Pulses".into(),
            },
        );
        let csv_path = dir.path().join("list.csv");
        write_shopping_csv(&list, &csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv, "ingredient,qty,unit,category\nToor Dal,300,g,Pulses\n");
    }
}
