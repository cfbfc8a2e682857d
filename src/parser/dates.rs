//! Pluggable due-date parsing.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};

/// Turns the free text after a due-date token into a timestamp.
///
/// Implementations return `None` for anything they cannot read; they never fail.
pub trait DueDateParser: Send + Sync {
    fn parse_due_date(&self, text: &str) -> Option<DateTime<Utc>>;
}

/// Small built-in parser for ISO dates and a handful of relative phrases.
///
/// Understands `2024-05-01`, `2024-05-01 14:30`, RFC 3339 timestamps, `today`,
/// `tomorrow`, `yesterday`, weekday names (next occurrence, today excluded),
/// `next week` and `in N days|weeks`. Dates without a time land at midnight UTC.
#[derive(Debug, Clone, Default)]
pub struct SimpleDateParser {
    /// Fixed reference date; `None` uses the current UTC date.
    today: Option<NaiveDate>,
}

impl SimpleDateParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative phrases against a fixed date.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn relative(&self, text: &str) -> Option<NaiveDate> {
        let today = self.today();
        match text {
            "today" => return Some(today),
            "tomorrow" => return shift(today, Duration::try_days(1)),
            "yesterday" => return shift(today, Duration::try_days(-1)),
            "next week" => return shift(today, Duration::try_weeks(1)),
            _ => {}
        }

        if let Some(weekday) = parse_weekday(text) {
            let ahead = (7 + weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            return shift(today, Duration::try_days(ahead));
        }

        let rest = text.strip_prefix("in ")?;
        let (count, unit) = rest.split_once(' ')?;
        let count: i64 = count.parse().ok()?;
        match unit {
            "day" | "days" => shift(today, Duration::try_days(count)),
            "week" | "weeks" => shift(today, Duration::try_weeks(count)),
            _ => None,
        }
    }
}

/// `today` moved by `delta`, or `None` when either falls outside chrono's range.
fn shift(today: NaiveDate, delta: Option<Duration>) -> Option<NaiveDate> {
    today.checked_add_signed(delta?)
}

impl DueDateParser for SimpleDateParser {
    fn parse_due_date(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Some(ts.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
            return Some(dt.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(date.and_time(NaiveTime::MIN).and_utc());
        }

        let lowered = text.to_lowercase();
        self.relative(&lowered)
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }
}

/// A parser that never finds a date. Useful when due dates are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDates;

impl DueDateParser for NoDates {
    fn parse_due_date(&self, _text: &str) -> Option<DateTime<Utc>> {
        None
    }
}

fn parse_weekday(text: &str) -> Option<Weekday> {
    match text {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
