use std::{io::Write, sync::Arc};

use ansi_term::Colour;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{
    aggregation::{related_cases, sum_duration, sum_duration_with_live_session},
    config::Config,
    entries::cases::DailyCases,
    timer::{lock::TimerLock, TimerController},
    utils::{
        clock::Clock,
        duration::{format_human, millis_to_clock, seconds_to_clock},
        shutdown::detect_shutdown,
        time::format_time_of_day,
    },
};

use super::output::sessions_table;

/// Runs the timer in the foreground until Ctrl-C, then stores the session.
pub async fn process_track_command(
    cases: Arc<DailyCases>,
    clock: Arc<dyn Clock>,
    config: &Config,
    case_name: &str,
    activity: &str,
) -> Result<()> {
    let Some(_timer_lock) = TimerLock::acquire(&config.entries_dir()).await? else {
        println!(
            "{}",
            Colour::Yellow.paint("Another casetime process is already tracking, stop it first")
        );
        return Ok(());
    };

    if let Some(open) = cases.all_cases().iter().find(|v| v.is_open()) {
        warn!("Found unfinished session {}", open.id);
        println!(
            "{}",
            Colour::Yellow.paint(format!(
                "Session {} / {} started at {} was never stopped and will be dropped",
                open.case_name,
                open.activity,
                format_time_of_day(open.start_time)
            ))
        );
    }

    let mut timer = TimerController::new(cases.clone(), clock, config.frame);
    if timer.start(case_name, activity).is_none() {
        return Ok(());
    }
    println!(
        "Tracking {} / {}. Press Ctrl-C to stop",
        Colour::Green.bold().paint(case_name),
        activity
    );

    let shutdown = CancellationToken::new();
    tokio::join!(
        detect_shutdown(shutdown.clone()),
        display_timer(&timer, &cases, &shutdown),
    );

    let Some(session) = timer.stop() else {
        error!("Timer stopped without a session");
        return Ok(());
    };
    cases.flush().await?;

    println!("{}", sessions_table(&[session.clone()]));
    let related = related_cases(&cases.all_cases(), &session.case_name);
    println!(
        "{} today: {}",
        session.case_name,
        format_human(sum_duration(&related))
    );
    Ok(())
}

/// Redraws the elapsed time of the session and the running total of its case every time the
/// timer publishes a new value.
async fn display_timer(timer: &TimerController, cases: &DailyCases, shutdown: &CancellationToken) {
    let mut receiver = timer.subscribe();
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let elapsed_ms = receiver.borrow_and_update().as_millis() as u64;
        let Some(current) = timer.current_case() else {
            continue;
        };
        let related = related_cases(&cases.all_cases(), &current.case_name);
        let case_total =
            sum_duration_with_live_session(&related, Some(&current), elapsed_ms, timer.is_running());
        print!(
            "\r{}  case total {}",
            Colour::Green.bold().paint(millis_to_clock(elapsed_ms)),
            seconds_to_clock(case_total)
        );
        if let Err(e) = stdout.flush() {
            error!("Failed to draw the timer {e:?}");
        }
    }
    println!();
}
