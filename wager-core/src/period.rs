use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::UnknownVariant;

/// How many months a finished leaderboard window is kept around.
const RETENTION_MONTHS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(UnknownVariant {
                kind: "period",
                value: other.to_string(),
            }),
        }
    }
}

/// A closed interval `[start, end]`, with `end` one millisecond before the next window opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeriodWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Computes the window of `period` that contains `now`, using the calendar of `now`'s time zone.
///
/// Weeks start on Sunday. The returned bounds are converted to UTC.
pub fn period_window<Tz: TimeZone>(period: Period, now: &DateTime<Tz>) -> PeriodWindow {
    let tz = now.timezone();
    let today = now.date_naive();

    let (first_day, next_first_day) = match period {
        Period::Daily => (today, today + Days::new(1)),
        Period::Weekly => {
            let sunday = today - Days::new(today.weekday().num_days_from_sunday() as u64);
            (sunday, sunday + Days::new(7))
        }
        Period::Monthly => {
            let first = today - Days::new(today.day0() as u64);
            (first, first + Months::new(1))
        }
    };

    let start = local_midnight(&tz, first_day);
    let end = local_midnight(&tz, next_first_day) - TimeDelta::milliseconds(1);
    PeriodWindow { start, end }
}

/// Windows ending before this instant are eligible for cleanup.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(RETENTION_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    // midnight can fall into a DST gap, the day then starts an hour later
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
