//! Five-field cron expressions evaluated in UTC.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far ahead [`CronExpr::next_after`] searches before giving up
const SEARCH_HORIZON_DAYS: i64 = 5 * 366;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("Cron expression {expr:?} has {found} fields, expected 5")]
    FieldCount { expr: String, found: usize },

    #[error("Unknown cron macro {0:?}")]
    UnknownMacro(String),

    #[error("Invalid {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Allowed values of one field as a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronField {
    bits: u64,
    /// False when the field was written starting with `*`
    restricted: bool,
}

impl CronField {
    pub fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

impl FieldSpec {
    fn parse(&self, text: &str) -> Result<CronField, CronError> {
        let invalid = |reason| CronError::InvalidField {
            field: self.name,
            value: text.to_string(),
            reason,
        };

        let mut bits = 0u64;
        for item in text.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| invalid("step is not a number"))?;
                    if step == 0 {
                        return Err(invalid("step must be positive"));
                    }
                    (range, Some(step))
                }
                None => (item, None),
            };

            let (start, end) = if range == "*" {
                (self.min, self.max)
            } else if let Some((lo, hi)) = range.split_once('-') {
                (self.value(lo).ok_or_else(|| invalid("unknown value"))?, self.value(hi).ok_or_else(|| invalid("unknown value"))?)
            } else {
                let start = self.value(range).ok_or_else(|| invalid("unknown value"))?;
                // `5/15` means every 15 starting at 5
                (start, if step.is_some() { self.max } else { start })
            };

            if start > end {
                return Err(invalid("range start is after its end"));
            }

            let step = step.unwrap_or(1) as usize;
            for value in (start..=end).step_by(step) {
                bits |= 1 << value;
            }
        }

        Ok(CronField {
            bits,
            restricted: !text.starts_with('*'),
        })
    }

    fn value(&self, token: &str) -> Option<u32> {
        let value = match token.parse::<u32>() {
            Ok(value) => value,
            Err(_) => {
                let lower = token.to_ascii_lowercase();
                let index = self.names.iter().position(|name| *name == lower)?;
                // Month names start at 1, weekday names at 0
                index as u32 + self.min
            }
        };
        (self.min..=self.max).contains(&value).then_some(value)
    }
}

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: CronField,
    hours: CronField,
    days_of_month: CronField,
    months: CronField,
    days_of_week: CronField,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let trimmed = expr.trim();
        let expanded = if trimmed.starts_with('@') {
            match trimmed.to_ascii_lowercase().as_str() {
                "@hourly" => "0 * * * *",
                "@daily" | "@midnight" => "0 0 * * *",
                "@weekly" => "0 0 * * 0",
                "@monthly" => "0 0 1 * *",
                "@yearly" | "@annually" => "0 0 1 1 *",
                _ => return Err(CronError::UnknownMacro(trimmed.to_string())),
            }
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(CronError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        };

        let mut days_of_week = DAY_OF_WEEK.parse(dow)?;
        if days_of_week.contains(7) {
            days_of_week.bits = (days_of_week.bits & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: MINUTE.parse(minute)?,
            hours: HOUR.parse(hour)?,
            days_of_month: DAY_OF_MONTH.parse(dom)?,
            months: MONTH.parse(month)?,
            days_of_week,
        })
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First matching minute strictly after `after`.
    ///
    /// Returns `None` for expressions that cannot fire within five years
    /// (for example `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = after + TimeDelta::days(SEARCH_HORIZON_DAYS);
        let mut t = after.with_second(0)?.with_nanosecond(0)? + TimeDelta::minutes(1);

        while t <= horizon {
            if !self.months.contains(t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = midnight(NaiveDate::from_ymd_opt(year, month, 1)?)?;
                continue;
            }

            if !self.day_matches(t.date_naive()) {
                t = midnight(t.date_naive().succ_opt()?)?;
                continue;
            }

            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)? + TimeDelta::hours(1);
                continue;
            }

            if !self.minutes.contains(t.minute()) {
                t += TimeDelta::minutes(1);
                continue;
            }

            return Some(t);
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted either may match
        if self.days_of_month.is_restricted() && self.days_of_week.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
