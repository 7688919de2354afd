use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};

/// This is the standard way of converting a date to a bucket key in casetime.
pub fn date_to_day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn day_key_to_date(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Time of day stored in a session. Sub-second precision is dropped because sessions only
/// persist whole seconds.
pub fn time_of_day(moment: DateTime<Local>) -> NaiveTime {
    let time = moment.time();
    time.with_nanosecond(0).unwrap_or(time)
}

/// Parses `HH:MM:SS`, falling back to `HH:MM` with zero seconds.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use super::*;

    #[test]
    fn test_day_key_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_to_day_key(date), "2024-03-07");
        assert_eq!(day_key_to_date("2024-03-07"), Some(date));
        assert_eq!(day_key_to_date("07/03/2024"), None);
    }

    #[test]
    fn test_time_of_day_drops_fraction() {
        let moment = Local
            .with_ymd_and_hms(2024, 3, 7, 10, 0, 5)
            .earliest()
            .unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(
            time_of_day(moment),
            NaiveTime::from_hms_opt(10, 0, 5).unwrap()
        );
    }

    #[test]
    fn test_parse_time_of_day_without_seconds() {
        assert_eq!(
            parse_time_of_day("09:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(
            parse_time_of_day(" 09:30:15 "),
            NaiveTime::from_hms_opt(9, 30, 15)
        );
        assert_eq!(parse_time_of_day("--:--"), None);
    }
}
