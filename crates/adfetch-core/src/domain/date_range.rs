use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration};

use crate::ValidationError;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Inclusive reporting window for insights, in account-local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    since: Date,
    until: Date,
}

impl DateRange {
    pub fn new(since: Date, until: Date) -> Result<Self, ValidationError> {
        if since > until {
            return Err(ValidationError::InvertedDateRange {
                since: format_date(since),
                until: format_date(until),
            });
        }
        Ok(Self { since, until })
    }

    pub fn parse(since: &str, until: &str) -> Result<Self, ValidationError> {
        Self::new(parse_date(since)?, parse_date(until)?)
    }

    pub const fn single_day(day: Date) -> Self {
        Self {
            since: day,
            until: day,
        }
    }

    /// The `days` days ending with `today`, inclusive.
    pub fn last_days(today: Date, days: u16) -> Result<Self, ValidationError> {
        let span = i64::from(days.max(1)) - 1;
        let since = today
            .checked_sub(Duration::days(span))
            .ok_or(ValidationError::DateOutOfRange { days })?;
        Ok(Self {
            since,
            until: today,
        })
    }

    pub const fn since(self) -> Date {
        self.since
    }

    pub const fn until(self) -> Date {
        self.until
    }

    /// `time_range` parameter value.
    pub fn to_param(self) -> Value {
        json!({
            "since": format_date(self.since),
            "until": format_date(self.until),
        })
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", format_date(self.since), format_date(self.until))
    }
}

fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_owned(),
    })
}

fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}
