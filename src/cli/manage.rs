use anyhow::Result;
use tracing::info;

use crate::{
    entries::{cases::DailyCases, entities::Session},
    utils::time::parse_time_of_day,
};

use super::{output::sessions_table, validation_error};

/// Fields of a session the user asked to change.
#[derive(Debug, Default)]
pub struct SessionChanges {
    pub case_name: Option<String>,
    pub activity: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl SessionChanges {
    /// Applies the changes. Total time is recomputed only if a time changed, an open session
    /// stays open unless an end is given.
    pub fn apply(self, session: Session) -> Result<Session> {
        let parse = |value: &str| {
            parse_time_of_day(value)
                .ok_or_else(|| validation_error(format!("Can't parse {value} as a time of day")))
        };
        let start = self.start.as_deref().map(parse).transpose()?;
        let end = self.end.as_deref().map(parse).transpose()?;

        let mut session = session;
        if let Some(case_name) = self.case_name {
            session = session.with_case_name(case_name);
        }
        if let Some(activity) = self.activity {
            session = session.with_activity(activity);
        }
        if start.is_some() || end.is_some() {
            let start = start.unwrap_or(session.start_time);
            let end = end.or(session.end_time);
            session = session.with_times(start, end);
        }
        Ok(session)
    }
}

/// Finds the stored session whose id starts with `prefix`. Anything but a single match is
/// reported to the user.
pub fn resolve_session(cases: &DailyCases, prefix: &str) -> Result<Option<Session>> {
    let matches = cases
        .store()
        .all_sessions()
        .into_iter()
        .filter(|v| v.id.starts_with(prefix))
        .collect::<Vec<_>>();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.into_iter().next()),
        _ => Err(validation_error(format!(
            "Id {prefix} matches several sessions:\n{}",
            sessions_table(&matches)
        ))),
    }
}

pub async fn process_edit_command(
    cases: &DailyCases,
    id: &str,
    changes: SessionChanges,
) -> Result<()> {
    let Some(session) = resolve_session(cases, id)? else {
        println!("No session with id {id}");
        return Ok(());
    };
    let updated = changes.apply(session)?;
    cases.edit_case(&updated).await?;
    info!("Edited {}", updated.id);
    println!("{}", sessions_table(&[updated]));
    Ok(())
}

pub async fn process_delete_command(cases: &DailyCases, id: &str) -> Result<()> {
    let Some(session) = resolve_session(cases, id)? else {
        println!("No session with id {id}");
        return Ok(());
    };
    if cases.delete_case(&session.id).await? {
        println!("Deleted {} / {}", session.case_name, session.activity);
    }
    Ok(())
}

pub async fn process_reset_today_command(cases: &DailyCases) -> Result<()> {
    let count = cases.all_cases().len();
    cases.reset_today().await?;
    println!("Removed {count} sessions of today");
    Ok(())
}
