use std::{collections::HashMap, fmt::Display, sync::Arc};

use clap::ValueEnum;

use crate::entries::entities::Session;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum GroupKey {
    #[value(name = "case")]
    CaseName,
    Activity,
}

impl GroupKey {
    pub fn of<'a>(&self, session: &'a Session) -> &'a Arc<str> {
        match self {
            GroupKey::CaseName => &session.case_name,
            GroupKey::Activity => &session.activity,
        }
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::CaseName => write!(f, "case"),
            GroupKey::Activity => write!(f, "activity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGroup {
    pub key: Arc<str>,
    pub sessions: Vec<Session>,
}

/// Session that is still being timed along with how long it has been running.
#[derive(Debug, Clone, Copy)]
pub struct LiveSession<'a> {
    pub session: &'a Session,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: Arc<str>,
    pub sessions: usize,
    pub seconds: f64,
}

/// Groups sessions in order of the first occurrence of every key.
pub fn group_by(sessions: &[Session], key: GroupKey) -> Vec<SessionGroup> {
    let mut positions = HashMap::<Arc<str>, usize>::new();
    let mut groups = Vec::<SessionGroup>::new();
    for session in sessions {
        let value = key.of(session);
        match positions.get(value) {
            Some(&index) => groups[index].sessions.push(session.clone()),
            None => {
                positions.insert(value.clone(), groups.len());
                groups.push(SessionGroup {
                    key: value.clone(),
                    sessions: vec![session.clone()],
                });
            }
        }
    }
    groups
}

/// Sessions sharing a case name with `case_name`.
pub fn related_cases(sessions: &[Session], case_name: &str) -> Vec<Session> {
    sessions
        .iter()
        .filter(|v| &*v.case_name == case_name)
        .cloned()
        .collect()
}

/// Total of stored durations in seconds. Open sessions contribute nothing.
pub fn sum_duration(sessions: &[Session]) -> u64 {
    sessions.iter().filter_map(Session::total_seconds).sum()
}

/// Total for the case of the first session in `sessions`, counting only sessions of that case.
/// While running, the live elapsed time of the active session is added once when it belongs to
/// the same case. Its own open record in `sessions` has no stored total, so nothing is counted
/// twice.
pub fn sum_duration_with_live_session(
    sessions: &[Session],
    active: Option<&Session>,
    live_elapsed_ms: u64,
    is_running: bool,
) -> f64 {
    let Some(first) = sessions.first() else {
        return 0.;
    };
    let case_name = &first.case_name;
    let stored = sessions
        .iter()
        .filter(|v| &v.case_name == case_name)
        .filter_map(Session::total_seconds)
        .sum::<u64>() as f64;

    match active {
        Some(active) if is_running && &active.case_name == case_name => {
            stored + live_elapsed_ms as f64 / 1000.
        }
        _ => stored,
    }
}

/// Totals per group. The live session counts towards the group it falls into.
pub fn group_totals(
    sessions: &[Session],
    key: GroupKey,
    live: Option<LiveSession<'_>>,
) -> Vec<GroupTotal> {
    group_by(sessions, key)
        .into_iter()
        .map(|group| {
            let live_seconds = match live {
                Some(live) if key.of(live.session) == &group.key => {
                    live.elapsed_ms as f64 / 1000.
                }
                _ => 0.,
            };
            GroupTotal {
                seconds: sum_duration(&group.sessions) as f64 + live_seconds,
                sessions: group.sessions.len(),
                key: group.key,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::entries::entities::{
        tests::{closed, hms},
        Session,
    };

    use super::*;

    fn sample() -> Vec<Session> {
        vec![
            closed("1", "Acme", "Review", "00:01:00"),
            closed("2", "Other", "Call", "00:00:30"),
            closed("3", "Acme", "Call", "00:02:30"),
            closed("4", "Third", "Review", "00:00:10"),
            closed("5", "Other", "Review", "00:00:05"),
        ]
    }

    #[test]
    fn test_group_by_first_occurrence_order() {
        let groups = group_by(&sample(), GroupKey::CaseName);
        let keys = groups.iter().map(|v| v.key.to_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["Acme", "Other", "Third"]);
        let ids = groups[0]
            .sessions
            .iter()
            .map(|v| v.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "3"]);

        let by_activity = group_by(&sample(), GroupKey::Activity);
        let keys = by_activity
            .iter()
            .map(|v| v.key.to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["Review", "Call"]);
    }

    #[test]
    fn test_group_by_preserves_sessions() {
        let sessions = sample();
        for key in [GroupKey::CaseName, GroupKey::Activity] {
            let mut flattened = group_by(&sessions, key)
                .into_iter()
                .flat_map(|v| v.sessions)
                .collect::<Vec<_>>();
            flattened.sort_by(|a, b| a.id.cmp(&b.id));
            assert_eq!(flattened, sessions);
        }
        assert!(group_by(&[], GroupKey::CaseName).is_empty());
    }

    #[test]
    fn test_sum_duration() {
        let sessions = vec![
            closed("1", "Acme", "Review", "00:01:00"),
            closed("2", "Acme", "Call", "00:02:30"),
        ];
        assert_eq!(sum_duration(&sessions), 210);
    }

    #[test]
    fn test_sum_duration_skips_open_sessions() {
        let sessions = vec![
            closed("1", "Acme", "Review", "00:01:00"),
            Session::open("2", "Acme", "Review", hms(10, 0, 0)),
        ];
        assert_eq!(sum_duration(&sessions), 60);
    }

    #[test]
    fn test_live_session_counted_once() {
        let active = Session::open("2", "Acme", "Review", hms(10, 0, 0));
        let sessions = vec![active.clone(), closed("1", "Acme", "Review", "00:01:00")];
        assert_eq!(
            sum_duration_with_live_session(&sessions, Some(&active), 5000, true),
            65.
        );

        let without_open_copy = vec![closed("1", "Acme", "Review", "00:01:00")];
        assert_eq!(
            sum_duration_with_live_session(&without_open_copy, Some(&active), 5000, true),
            65.
        );
    }

    #[test]
    fn test_live_session_ignored_when_not_matching() {
        let sessions = vec![closed("1", "Acme", "Review", "00:01:00")];
        let other = Session::open("2", "Other", "Review", hms(10, 0, 0));
        assert_eq!(
            sum_duration_with_live_session(&sessions, Some(&other), 5000, true),
            60.
        );
        let active = Session::open("3", "Acme", "Review", hms(10, 0, 0));
        assert_eq!(
            sum_duration_with_live_session(&sessions, Some(&active), 5000, false),
            60.
        );
        assert_eq!(sum_duration_with_live_session(&sessions, None, 5000, true), 60.);
        assert_eq!(sum_duration_with_live_session(&[], Some(&active), 5000, true), 0.);
    }

    #[test]
    fn test_live_sum_counts_only_the_first_case() {
        let sessions = vec![
            closed("1", "Acme", "Review", "00:01:00"),
            closed("2", "Other", "Review", "00:05:00"),
        ];
        assert_eq!(sum_duration_with_live_session(&sessions, None, 0, false), 60.);
    }

    #[test]
    fn test_related_cases() {
        let related = related_cases(&sample(), "Other");
        assert_eq!(related.len(), 2);
        assert!(related.iter().all(|v| &*v.case_name == "Other"));
    }

    #[test]
    fn test_group_totals_with_live_session() {
        let active = Session::open("6", "Other", "Call", hms(10, 0, 0));
        let mut sessions = sample();
        sessions.insert(0, active.clone());
        let totals = group_totals(
            &sessions,
            GroupKey::CaseName,
            Some(LiveSession {
                session: &active,
                elapsed_ms: 2500,
            }),
        );
        assert_eq!(
            totals,
            vec![
                GroupTotal {
                    key: "Other".into(),
                    sessions: 3,
                    seconds: 37.5,
                },
                GroupTotal {
                    key: "Acme".into(),
                    sessions: 2,
                    seconds: 210.,
                },
                GroupTotal {
                    key: "Third".into(),
                    sessions: 1,
                    seconds: 10.,
                },
            ]
        );
    }
}
