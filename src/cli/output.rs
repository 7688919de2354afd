//! Plain text rendering of pages. A page is a [PageSlots] with up to four sections, the left and
//! right ones are placed side by side.

use ansi_term::Style;

use crate::{
    aggregation::GroupTotal,
    entries::entities::Session,
    utils::{
        duration::{format_duration, seconds_to_clock, OPEN_SENTINEL},
        time::format_time_of_day,
    },
};

/// Labels longer than this are cut in tables.
const MAX_LABEL: usize = 14;
const ID_PREFIX: usize = 8;
const COLUMN_GAP: &str = "    ";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageSlots {
    pub top: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
}

impl PageSlots {
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if let Some(top) = &self.top {
            sections.push(top.clone());
        }
        match (&self.left, &self.right) {
            (Some(left), Some(right)) => sections.push(side_by_side(left, right)),
            (Some(single), None) | (None, Some(single)) => sections.push(single.clone()),
            (None, None) => {}
        }
        if let Some(bottom) = &self.bottom {
            sections.push(bottom.clone());
        }
        sections.join("\n\n")
    }
}

fn side_by_side(left: &str, right: &str) -> String {
    let left_lines = left.lines().collect::<Vec<_>>();
    let right_lines = right.lines().collect::<Vec<_>>();
    let width = left_lines
        .iter()
        .map(|v| visible_width(v))
        .max()
        .unwrap_or(0);
    (0..left_lines.len().max(right_lines.len()))
        .map(|i| {
            let l = left_lines.get(i).copied().unwrap_or("");
            let r = right_lines.get(i).copied().unwrap_or("");
            let padding = " ".repeat(width - visible_width(l));
            format!("{l}{padding}{COLUMN_GAP}{r}").trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Columns a line takes in the terminal. Escape sequences used for styling take none.
fn visible_width(line: &str) -> usize {
    let mut width = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // Styling sequences end with a letter, e.g. `ESC[1m`.
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

pub fn title(text: &str) -> String {
    Style::new().bold().paint(text).to_string()
}

/// Cuts long labels so that table columns stay aligned.
pub fn shorten(text: &str) -> String {
    if text.chars().count() > MAX_LABEL {
        format!("{} ...", text.chars().take(MAX_LABEL).collect::<String>())
    } else {
        text.to_string()
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..ID_PREFIX).unwrap_or(id)
}

pub fn sessions_table(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions".into();
    }
    let mut lines = vec![format!(
        "{:<8}  {:<18}  {:<8}  {:<8}  {:<8}  {}",
        "Id", "Case", "Start", "End", "Time", "Activity"
    )];
    for session in sessions {
        lines.push(format!(
            "{:<8}  {:<18}  {:<8}  {:<8}  {:<8}  {}",
            short_id(&session.id),
            shorten(&session.case_name),
            format_time_of_day(session.start_time),
            session
                .end_time
                .map(format_time_of_day)
                .unwrap_or_else(|| OPEN_SENTINEL.into()),
            session
                .total_time
                .map(format_duration)
                .unwrap_or_else(|| OPEN_SENTINEL.into()),
            shorten(&session.activity),
        ));
    }
    lines.join("\n")
}

pub fn totals_table(heading: &str, totals: &[GroupTotal]) -> String {
    let mut lines = vec![format!("{:<18}  {:>8}  {:>8}", heading, "Sessions", "Total")];
    for total in totals {
        lines.push(format!(
            "{:<18}  {:>8}  {:>8}",
            shorten(&total.key),
            total.sessions,
            seconds_to_clock(total.seconds)
        ));
    }
    lines.join("\n")
}
