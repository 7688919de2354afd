use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::{
    duration::diff_times,
    time::day_key_to_date,
};

/// One contiguous start/stop timing record. While the timer is running `end_time` and
/// `total_time` are absent and persisted as `--:--`.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Arc<str>,
    pub case_name: Arc<str>,
    pub activity: Arc<str>,
    #[serde(with = "time_ser")]
    pub start_time: NaiveTime,
    #[serde(with = "open_time_ser")]
    pub end_time: Option<NaiveTime>,
    #[serde(with = "open_duration_ser")]
    pub total_time: Option<Duration>,
}

impl Session {
    pub fn open(
        id: impl Into<Arc<str>>,
        case_name: impl Into<Arc<str>>,
        activity: impl Into<Arc<str>>,
        start_time: NaiveTime,
    ) -> Self {
        Self {
            id: id.into(),
            case_name: case_name.into(),
            activity: activity.into(),
            start_time,
            end_time: None,
            total_time: None,
        }
    }

    /// Closed session where the total is derived from start and end.
    pub fn closed(
        id: impl Into<Arc<str>>,
        case_name: impl Into<Arc<str>>,
        activity: impl Into<Arc<str>>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self::open(id, case_name, activity, start_time).close(end_time, diff_times(start_time, end_time))
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn close(self, end_time: NaiveTime, total_time: Duration) -> Self {
        Self {
            end_time: Some(end_time),
            total_time: Some(total_time),
            ..self
        }
    }

    /// Stored total in whole seconds. Open sessions have none.
    pub fn total_seconds(&self) -> Option<u64> {
        self.total_time.map(|v| v.num_seconds().max(0) as u64)
    }

    pub fn with_case_name(self, case_name: impl Into<Arc<str>>) -> Self {
        Self {
            case_name: case_name.into(),
            ..self
        }
    }

    pub fn with_activity(self, activity: impl Into<Arc<str>>) -> Self {
        Self {
            activity: activity.into(),
            ..self
        }
    }

    /// Changes start and end, recomputing the total. An open session stays open.
    pub fn with_times(self, start_time: NaiveTime, end_time: Option<NaiveTime>) -> Self {
        Self {
            start_time,
            end_time,
            total_time: end_time.map(|end| diff_times(start_time, end)),
            ..self
        }
    }
}

mod time_ser {
    use chrono::NaiveTime;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{format_time_of_day, parse_time_of_day};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_time_of_day(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_time_of_day(&s).ok_or_else(|| D::Error::custom(format!("invalid time of day {s}")))
    }
}

mod open_time_ser {
    use chrono::NaiveTime;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    use crate::utils::{
        duration::OPEN_SENTINEL,
        time::{format_time_of_day, parse_time_of_day},
    };

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(time) => serializer.serialize_str(&format_time_of_day(*time)),
            None => serializer.serialize_str(OPEN_SENTINEL),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == OPEN_SENTINEL {
            return Ok(None);
        }
        parse_time_of_day(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid time of day {s}")))
    }
}

mod open_duration_ser {
    use chrono::Duration;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    use crate::utils::duration::{clock_to_duration, format_duration, OPEN_SENTINEL};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_str(&format_duration(*duration)),
            None => serializer.serialize_str(OPEN_SENTINEL),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == OPEN_SENTINEL {
            return Ok(None);
        }
        clock_to_duration(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid duration {s}")))
    }
}

/// All sessions ever recorded, bucketed by the local calendar day they were started on.
#[derive(PartialEq, Eq, Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct DailyEntries(BTreeMap<NaiveDate, Vec<Session>>);

impl DailyEntries {
    /// Reads the persisted mapping. Anything that doesn't parse is skipped with a warning:
    /// a broken file yields an empty mapping, a broken bucket or session is left out.
    pub fn from_json(raw: &str) -> Self {
        let buckets = match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Stored entries are corrupted, starting from scratch: {e}");
                return Self::default();
            }
        };

        let mut entries = BTreeMap::new();
        for (key, value) in buckets {
            let Some(date) = day_key_to_date(&key) else {
                warn!("Ignoring bucket with illegal date key {key:?}");
                continue;
            };
            let serde_json::Value::Array(items) = value else {
                warn!("Ignoring bucket {key} that isn't a list");
                continue;
            };
            let sessions = items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<Session>(item.clone()) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("In bucket {key} found illegal session {item}: {e}");
                        None
                    }
                })
                .collect();
            entries.insert(date, sessions);
        }
        Self(entries)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains_key(&date)
    }

    pub fn bucket(&self, date: NaiveDate) -> &[Session] {
        self.0.get(&date).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_bucket(&mut self, date: NaiveDate, sessions: Vec<Session>) {
        self.0.insert(date, sessions);
    }

    pub fn remove_bucket(&mut self, date: NaiveDate) -> Option<Vec<Session>> {
        self.0.remove(&date)
    }

    /// Most recent first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.0.keys().rev().copied().collect()
    }

    /// Day that holds the session with `id`.
    pub fn owner_of(&self, id: &str) -> Option<NaiveDate> {
        self.0
            .iter()
            .find(|(_, sessions)| sessions.iter().any(|v| &*v.id == id))
            .map(|(date, _)| *date)
    }

    /// Sessions of every day, oldest day first.
    pub fn all_sessions(&self) -> Vec<Session> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn ids(&self) -> HashSet<Arc<str>> {
        self.0.values().flatten().map(|v| v.id.clone()).collect()
    }

    /// Three way merge of two copies that diverged from `base`. A session changed or removed on
    /// one side only takes that side, when both changed it `local` wins. A session removed on one
    /// side and changed on the other is kept. Order follows `local`, sessions only `remote` added
    /// keep their position from `remote`.
    pub fn merge(base: &Self, local: &Self, remote: &Self) -> Self {
        let base_sessions = base.by_id();
        let local_sessions = local.by_id();
        let remote_sessions = remote.by_id();

        let days = local
            .0
            .keys()
            .chain(remote.0.keys())
            .copied()
            .collect::<BTreeSet<_>>();
        let mut merged = BTreeMap::new();
        for day in days {
            let mut sessions = local
                .bucket(day)
                .iter()
                .filter_map(|ours| {
                    let id = &*ours.id;
                    match (base_sessions.get(id), remote_sessions.get(id)) {
                        (Some(&original), Some(&theirs)) if ours == original => Some(theirs.clone()),
                        (Some(&original), None) if ours == original => None,
                        _ => Some(ours.clone()),
                    }
                })
                .collect::<Vec<_>>();
            for (index, theirs) in remote.bucket(day).iter().enumerate() {
                let id = &*theirs.id;
                if !base_sessions.contains_key(id) && !local_sessions.contains_key(id) {
                    sessions.insert(index.min(sessions.len()), theirs.clone());
                }
            }

            let dropped = base.contains(day) && !(local.contains(day) && remote.contains(day));
            if !sessions.is_empty() || !dropped {
                merged.insert(day, sessions);
            }
        }
        Self(merged)
    }

    fn by_id(&self) -> HashMap<&str, &Session> {
        self.0.values().flatten().map(|v| (&*v.id, v)).collect()
    }

    /// Removes the session from every bucket. Returns whether anything was removed.
    pub fn delete_by_id(&mut self, id: &str) -> bool {
        let mut removed = false;
        for sessions in self.0.values_mut() {
            let before = sessions.len();
            sessions.retain(|v| &*v.id != id);
            removed |= sessions.len() != before;
        }
        removed
    }

    /// Replaces every session sharing the id of `updated`. Returns whether anything matched.
    pub fn edit_by_id(&mut self, updated: &Session) -> bool {
        let mut found = false;
        for session in self.0.values_mut().flatten() {
            if session.id == updated.id {
                *session = updated.clone();
                found = true;
            }
        }
        found
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime};

    use super::{DailyEntries, Session};

    pub const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    pub fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    pub fn closed(id: &str, case_name: &str, activity: &str, total: &str) -> Session {
        let total = crate::utils::duration::clock_to_duration(total).unwrap();
        let start = hms(8, 0, 0);
        Session::open(id, case_name, activity, start).close(start + total, total)
    }

    #[test]
    fn test_session_wire_format() {
        let session = Session::closed("a", "Acme", "Review", hms(10, 0, 0), hms(10, 0, 5));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "a",
                "caseName": "Acme",
                "activity": "Review",
                "startTime": "10:00:00",
                "endTime": "10:00:05",
                "totalTime": "00:00:05",
            })
        );
    }

    #[test]
    fn test_open_session_uses_sentinel() {
        let session = Session::open("a", "Acme", "Review", hms(10, 0, 0));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["endTime"], "--:--");
        assert_eq!(value["totalTime"], "--:--");
        let parsed: Session = serde_json::from_value(value).unwrap();
        assert!(parsed.is_open());
        assert_eq!(parsed.total_seconds(), None);
    }

    #[test]
    fn test_closed_clamps_inverted_times() {
        let session = Session::closed("a", "Acme", "Review", hms(11, 0, 0), hms(10, 0, 0));
        assert_eq!(session.total_time, Some(Duration::zero()));
    }

    #[test]
    fn test_total_time_over_a_day() {
        let raw = r#"{"id":"a","caseName":"c","activity":"x","startTime":"08:00:00","endTime":"09:00:00","totalTime":"30:00:00"}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.total_seconds(), Some(30 * 3600));
    }

    #[test]
    fn test_entries_corrupted_file() {
        assert_eq!(DailyEntries::from_json("{not json"), DailyEntries::default());
        assert_eq!(DailyEntries::from_json("[]"), DailyEntries::default());
        assert_eq!(DailyEntries::from_json(""), DailyEntries::default());
    }

    #[test]
    fn test_entries_skip_illegal_parts() {
        let raw = r#"{
            "2018-07-04": [
                {"id":"a","caseName":"c","activity":"x","startTime":"08:00:00","endTime":"09:00:00","totalTime":"01:00:00"},
                {"id":"b","caseName":"c"}
            ],
            "yesterday": [],
            "2018-07-05": "oops"
        }"#;
        let entries = DailyEntries::from_json(raw);
        assert_eq!(entries.dates(), vec![TEST_DATE]);
        assert_eq!(entries.bucket(TEST_DATE).len(), 1);
    }

    #[test]
    fn test_entries_skip_unrepresentable_total() {
        let raw = r#"{
            "2018-07-04": [
                {"id":"a","caseName":"c","activity":"x","startTime":"08:00:00","endTime":"09:00:00","totalTime":"9999999999999:00:00"},
                {"id":"b","caseName":"c","activity":"x","startTime":"08:00:00","endTime":"09:00:00","totalTime":"01:00:00"}
            ]
        }"#;
        let entries = DailyEntries::from_json(raw);
        let ids = entries
            .bucket(TEST_DATE)
            .iter()
            .map(|v| v.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_entries_json_round_trip() {
        let mut entries = DailyEntries::default();
        entries.set_bucket(TEST_DATE, vec![closed("a", "Acme", "Review", "00:01:00")]);
        let json = entries.to_json().unwrap();
        assert!(json.starts_with(r#"{"2018-07-04":[{"id":"a""#));
        assert_eq!(DailyEntries::from_json(&json), entries);
    }

    fn ids(entries: &DailyEntries, date: NaiveDate) -> Vec<String> {
        entries
            .bucket(date)
            .iter()
            .map(|v| v.id.to_string())
            .collect()
    }

    #[test]
    fn test_merge_takes_one_sided_changes() {
        let mut base = DailyEntries::default();
        base.set_bucket(
            TEST_DATE,
            vec![
                closed("a", "Acme", "Review", "00:01:00"),
                closed("b", "Acme", "Call", "00:02:00"),
                closed("c", "Other", "Call", "00:03:00"),
            ],
        );

        // Locally "a" is edited and "n" added, remotely "b" is deleted and "c" edited.
        let mut local = base.clone();
        local.edit_by_id(&closed("a", "Acme", "Meeting", "00:01:00"));
        let mut today = local.bucket(TEST_DATE).to_vec();
        today.insert(0, closed("n", "New", "Review", "00:00:10"));
        local.set_bucket(TEST_DATE, today);

        let mut remote = base.clone();
        remote.delete_by_id("b");
        remote.edit_by_id(&closed("c", "Other", "Call", "00:30:00"));

        let merged = DailyEntries::merge(&base, &local, &remote);
        assert_eq!(ids(&merged, TEST_DATE), vec!["n", "a", "c"]);
        let merged_today = merged.bucket(TEST_DATE);
        assert_eq!(&*merged_today[1].activity, "Meeting");
        assert_eq!(merged_today[2].total_seconds(), Some(30 * 60));
    }

    #[test]
    fn test_merge_keeps_remote_additions() {
        let other_day = TEST_DATE.succ_opt().unwrap();
        let mut base = DailyEntries::default();
        base.set_bucket(TEST_DATE, vec![closed("a", "Acme", "Review", "00:01:00")]);

        let mut local = base.clone();
        local.delete_by_id("a");

        let mut remote = base.clone();
        remote.set_bucket(
            TEST_DATE,
            vec![
                closed("r", "Remote", "Call", "00:00:05"),
                closed("a", "Acme", "Review", "00:01:00"),
            ],
        );
        remote.set_bucket(other_day, vec![closed("s", "Remote", "Call", "00:00:05")]);

        let merged = DailyEntries::merge(&base, &local, &remote);
        assert_eq!(ids(&merged, TEST_DATE), vec!["r"]);
        assert_eq!(ids(&merged, other_day), vec!["s"]);
    }

    #[test]
    fn test_merge_drops_bucket_removed_on_one_side() {
        let previous = TEST_DATE.pred_opt().unwrap();
        let mut base = DailyEntries::default();
        base.set_bucket(previous, vec![closed("p", "Acme", "Review", "00:01:00")]);
        base.set_bucket(TEST_DATE, vec![closed("a", "Acme", "Review", "00:01:00")]);

        let mut local = base.clone();
        local.remove_bucket(TEST_DATE);

        let merged = DailyEntries::merge(&base, &local, &base);
        assert_eq!(merged.dates(), vec![previous]);
        // Nothing diverged, nothing changes.
        assert_eq!(DailyEntries::merge(&base, &base, &base), base);
    }

    #[test]
    fn test_entries_delete_and_edit_across_buckets() {
        let mut entries = DailyEntries::default();
        let other_day = TEST_DATE.succ_opt().unwrap();
        entries.set_bucket(TEST_DATE, vec![closed("a", "Acme", "Review", "00:01:00")]);
        entries.set_bucket(
            other_day,
            vec![
                closed("b", "Acme", "Call", "00:02:00"),
                closed("c", "Other", "Call", "00:03:00"),
            ],
        );

        assert_eq!(entries.owner_of("b"), Some(other_day));
        assert_eq!(entries.dates(), vec![other_day, TEST_DATE]);

        let edited = closed("b", "Acme", "Meeting", "00:05:00");
        assert!(entries.edit_by_id(&edited));
        assert_eq!(entries.bucket(other_day)[0], edited);
        assert!(!entries.edit_by_id(&closed("missing", "x", "y", "00:00:01")));

        assert!(entries.delete_by_id("b"));
        assert!(!entries.delete_by_id("b"));
        assert_eq!(entries.all_sessions().len(), 2);
    }
}
