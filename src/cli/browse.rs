use chrono::NaiveDate;

use crate::{
    aggregation::{group_totals, sum_duration, GroupKey, LiveSession},
    entries::{cases::DailyCases, entities::Session},
    utils::{
        clock::Clock,
        duration::{diff_times, format_human},
        time::{date_to_day_key, time_of_day},
    },
};

use super::output::{sessions_table, title, totals_table, PageSlots};

/// Prints the sessions currently listed for today.
pub fn print_today(cases: &DailyCases, clock: &dyn Clock) {
    let sessions = cases.all_cases();
    let live = live_session(&sessions, clock);
    println!(
        "{}",
        day_page(&sessions, cases.store().today(), live).render()
    );
}

pub fn print_day(cases: &DailyCases, date: NaiveDate) {
    let sessions = cases.get_entries_for_date(date);
    println!("{}", day_page(&sessions, date, None).render());
}

pub fn print_dates(cases: &DailyCases) {
    let dates = cases.get_available_dates();
    if dates.is_empty() {
        println!("Nothing has been tracked yet");
        return;
    }
    for date in dates {
        let sessions = cases.get_entries_for_date(date);
        println!(
            "{}\t{} sessions\t{}",
            date_to_day_key(date),
            sessions.len(),
            format_human(sum_duration(&sessions))
        );
    }
}

pub fn print_summary(cases: &DailyCases, clock: &dyn Clock, date: NaiveDate, by: GroupKey) {
    let sessions = cases.get_entries_for_date(date);
    let live = if date == cases.store().today() {
        live_session(&sessions, clock)
    } else {
        None
    };
    let heading = match by {
        GroupKey::CaseName => "Case",
        GroupKey::Activity => "Activity",
    };
    let page = PageSlots {
        top: Some(title(&format!("Summary of {}", date.format("%-d. %B %Y")))),
        left: Some(totals_table(heading, &group_totals(&sessions, by, live))),
        ..Default::default()
    };
    println!("{}", page.render());
}

fn day_page(sessions: &[Session], date: NaiveDate, live: Option<LiveSession<'_>>) -> PageSlots {
    let live_seconds = live.map_or(0, |v| v.elapsed_ms / 1000);
    PageSlots {
        top: Some(title(&date.format("%-d. %B %Y").to_string())),
        left: Some(sessions_table(sessions)),
        right: (!sessions.is_empty())
            .then(|| totals_table("Case", &group_totals(sessions, GroupKey::CaseName, live))),
        bottom: Some(format!(
            "Total {}",
            format_human(sum_duration(sessions) + live_seconds)
        )),
    }
}

/// A session left open in storage is being timed by a running `track`. Its elapsed time is
/// estimated from its start.
fn live_session<'a>(sessions: &'a [Session], clock: &dyn Clock) -> Option<LiveSession<'a>> {
    let now = time_of_day(clock.time());
    sessions
        .iter()
        .find(|v| v.is_open())
        .map(|session| LiveSession {
            session,
            elapsed_ms: diff_times(session.start_time, now).num_milliseconds() as u64,
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveTime;

    use super::*;
    use crate::{
        entries::entities::tests::{closed, hms, TEST_DATE},
        utils::clock::test_clock::ManualClock,
    };

    #[test]
    fn test_live_session_from_open_record() {
        let clock = ManualClock::at(TEST_DATE, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        clock.advance(Duration::from_secs(42));
        let sessions = vec![
            closed("a", "Acme", "Review", "00:01:00"),
            Session::open("b", "Acme", "Call", hms(10, 0, 0)),
        ];
        let live = live_session(&sessions, &clock).unwrap();
        assert_eq!(&*live.session.id, "b");
        assert_eq!(live.elapsed_ms, 42_000);

        assert!(live_session(&sessions[..1], &clock).is_none());
    }

    #[test]
    fn test_day_page_totals() {
        let sessions = vec![
            closed("a", "Acme", "Review", "00:01:00"),
            closed("b", "Acme", "Call", "00:02:30"),
        ];
        let page = day_page(&sessions, TEST_DATE, None);
        assert_eq!(page.bottom.as_deref(), Some("Total 0h 3m 30s"));
        assert!(page.right.unwrap().contains("Acme"));

        let empty = day_page(&[], TEST_DATE, None);
        assert_eq!(empty.right, None);
        assert_eq!(empty.bottom.as_deref(), Some("Total 0h 0m 0s"));
    }
}
