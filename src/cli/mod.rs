pub mod browse;
pub mod manage;
pub mod output;
pub mod track;

use std::{fmt::Display, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::{debug, level_filters::LevelFilter};

use crate::{
    aggregation::GroupKey,
    config::{Config, DEFAULT_DEBOUNCE},
    entries::{cases::DailyCases, repository::JsonFileRepository, store::EntryStore},
    utils::{
        clock::{Clock, DefaultClock},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Casetime", version, long_about = None)]
#[command(about = "Time tracker for cases and the activities done on them", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default uses $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Print logs to the console")]
    log: bool,
    #[arg(long = "log-filter", global = true)]
    log_filter: Option<LevelFilter>,
    #[arg(
        long = "debounce-ms",
        global = true,
        default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64,
        help = "How long to coalesce writes of today's sessions"
    )]
    debounce_ms: u64,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start timing a case. Press Ctrl-C to stop and store the session")]
    Track {
        #[arg(help = "Case the time is spent on")]
        case_name: String,
        #[arg(help = "What is being done on the case")]
        activity: String,
    },
    #[command(about = "Show today's sessions")]
    Today,
    #[command(about = "Show sessions of a previous day")]
    Show {
        #[command(flatten)]
        date: DateArgs,
    },
    #[command(about = "List days that have sessions, most recent first")]
    Dates,
    #[command(about = "Show totals of a day grouped by case or activity")]
    Summary {
        #[command(flatten)]
        date: DateArgs,
        #[arg(long, default_value_t = GroupKey::CaseName)]
        by: GroupKey,
    },
    #[command(about = "Change a stored session. Total time is recomputed from start and end")]
    Edit {
        #[arg(help = "Session id or an unambiguous prefix of it")]
        id: String,
        #[arg(long = "case")]
        case_name: Option<String>,
        #[arg(long)]
        activity: Option<String>,
        #[arg(long, help = "Start time, HH:MM:SS or HH:MM")]
        start: Option<String>,
        #[arg(long, help = "End time, HH:MM:SS or HH:MM")]
        end: Option<String>,
    },
    #[command(about = "Delete a session from whichever day it belongs to")]
    Delete {
        #[arg(help = "Session id or an unambiguous prefix of it")]
        id: String,
    },
    #[command(about = "Remove every session of today")]
    ResetToday,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct DateArgs {
    #[arg(
        long,
        short,
        help = "Day to show. Examples are \"yesterday\", \"2025-03-15\", \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl DateArgs {
    /// Resolves the requested day, `today` when nothing was given.
    fn resolve(&self, today: NaiveDate) -> Result<NaiveDate> {
        let Some(value) = &self.date else {
            return Ok(today);
        };
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(date);
        }
        match parse_date_string(value, Local::now(), self.date_style.into()) {
            Ok(v) => Ok(v.date_naive()),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {value}: {e}"),
                )
                .into()),
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = args
        .log_filter
        .or(if args.log { Some(LevelFilter::TRACE) } else { None });
    let config = Config::new(args.dir)?
        .with_debounce(Duration::from_millis(args.debounce_ms))
        .with_logging(logging_level, args.log);
    enable_logging(
        CLI_PREFIX,
        &config.logs_dir(),
        config.log_level,
        config.log_console,
    )?;
    debug!("Running {:?} with {config:?}", args.commands);

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let repository = Arc::new(JsonFileRepository::new(config.entries_dir())?);
    let store = EntryStore::open(repository, clock.clone(), config.debounce).await;
    let cases = Arc::new(DailyCases::new(Arc::new(store), vec![]));
    let today = cases.store().today();

    let result = match args.commands {
        Commands::Track {
            case_name,
            activity,
        } => track::process_track_command(cases.clone(), clock, &config, &case_name, &activity).await,
        Commands::Today => {
            browse::print_today(&cases, clock.as_ref());
            Ok(())
        }
        Commands::Show { date } => {
            browse::print_day(&cases, date.resolve(today)?);
            Ok(())
        }
        Commands::Dates => {
            browse::print_dates(&cases);
            Ok(())
        }
        Commands::Summary { date, by } => {
            browse::print_summary(&cases, clock.as_ref(), date.resolve(today)?, by);
            Ok(())
        }
        Commands::Edit {
            id,
            case_name,
            activity,
            start,
            end,
        } => {
            manage::process_edit_command(
                &cases,
                &id,
                manage::SessionChanges {
                    case_name,
                    activity,
                    start,
                    end,
                },
            )
            .await
        }
        Commands::Delete { id } => manage::process_delete_command(&cases, &id).await,
        Commands::ResetToday => manage::process_reset_today_command(&cases).await,
    };

    // Whatever is still scheduled has to reach the disk before the store goes away.
    cases.flush().await?;
    result
}

/// Reports invalid user input the same way clap reports argument errors.
pub(crate) fn validation_error(message: String) -> anyhow::Error {
    Args::command()
        .error(clap::error::ErrorKind::ValueValidation, message)
        .into()
}
