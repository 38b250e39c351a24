use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meal_plan::config::MenuConfig;
use meal_plan::display::{print_schedule, print_shopping_list, write_schedule_to_file, write_shopping_csv};
use meal_plan::plan::{aggregate, week_slice, PlanMode, ScheduleGenerator};
use meal_plan::share::{self, MasterIndexLists, ShareLink};
use meal_plan::web::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "meal-plan")]
#[command(about = "Deterministic weekly meal planner")]
#[command(version)]
struct Args {
    /// Menu file (TOML); the bundled menu is used when omitted
    #[arg(short, long, global = true, env = "MEAL_PLAN_MENU")]
    menu: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Seed for dish selection; defaults to the current time
    #[arg(short, long, allow_hyphen_values = true)]
    seed: Option<i64>,

    /// First planned day (YYYY-MM-DD); defaults to today
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Encoded overrides from a share link
    #[arg(long)]
    overrides: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a plan
    Generate {
        #[command(flatten)]
        plan: PlanArgs,

        /// Plan through the end of the year instead of one week
        #[arg(long)]
        year: bool,

        /// Also write the plan to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the shopping list for one week of a plan
    Shopping {
        #[command(flatten)]
        plan: PlanArgs,

        /// Zero-based week of the plan
        #[arg(short, long, default_value = "0")]
        week: usize,

        /// Also export the list as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Run the HTTP server
    Web {
        #[arg(short, long, default_value = "8080", env = "MEAL_PLAN_PORT")]
        port: u16,

        /// JSON file backing the recent-plans list
        #[arg(long, env = "MEAL_PLAN_RECENT_FILE")]
        recent_file: Option<PathBuf>,
    },
}

fn load_menu(path: Option<&PathBuf>) -> Result<MenuConfig> {
    match path {
        Some(path) => MenuConfig::load(path)
            .with_context(|| format!("Failed to load menu from {}", path.display())),
        None => MenuConfig::builtin().context("Bundled menu is invalid"),
    }
}

fn resolve(plan: &PlanArgs) -> (i64, NaiveDate) {
    (
        plan.seed.unwrap_or_else(|| Utc::now().timestamp_millis()),
        plan.start.unwrap_or_else(|| Local::now().date_naive()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meal_plan=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let menu = load_menu(args.menu.as_ref())?;

    match args.command {
        Command::Generate { plan, year, out } => {
            let (seed, start) = resolve(&plan);
            let mode = if year { PlanMode::Year } else { PlanMode::Week };
            let lists = MasterIndexLists::from_menu(&menu);
            let baseline = ScheduleGenerator::new(&menu).generate(seed, start, mode);
            let overrides = plan
                .overrides
                .as_deref()
                .map(|encoded| share::decode(encoded, &lists))
                .unwrap_or_default();
            let schedule = share::apply(&baseline, &overrides);

            print_schedule(&format!("Meal plan (seed {})", seed), &schedule);
            let link = ShareLink::new(seed)
                .with_overrides(share::encode(&overrides, &lists))
                .with_window(start, mode);
            println!("\nShare: ?{}", link.to_query().context("Failed to build share link")?);

            if let Some(out) = out {
                write_schedule_to_file(&format!("Meal plan (seed {})", seed), &schedule, &out)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                info!("Plan saved to {}", out.display());
            }
        }
        Command::Shopping { plan, week, csv } => {
            let (seed, start) = resolve(&plan);
            let mode = if week == 0 { PlanMode::Week } else { PlanMode::Year };
            let lists = MasterIndexLists::from_menu(&menu);
            let baseline = ScheduleGenerator::new(&menu).generate(seed, start, mode);
            let overrides = plan
                .overrides
                .as_deref()
                .map(|encoded| share::decode(encoded, &lists))
                .unwrap_or_default();
            let schedule = share::apply(&baseline, &overrides);
            let days = week_slice(&schedule, week);
            anyhow::ensure!(!days.is_empty(), "week {} is outside the plan", week);

            let list = aggregate(days, &menu);
            print_shopping_list(&format!("Shopping list, week {} (seed {})", week + 1, seed), &list);
            if let Some(csv) = csv {
                write_shopping_csv(&list, &csv)
                    .with_context(|| format!("Failed to write {}", csv.display()))?;
                info!("Shopping list saved to {}", csv.display());
            }
        }
        Command::Web { port, recent_file } => {
            let state = AppState::new(menu, recent_file).context("Failed to initialize server state")?;
            info!("Starting meal-plan server on port {}", port);
            web::start_server(port, state).await.context("Server error")?;
        }
    }

    Ok(())
}
