use chrono::{Datelike, Duration, Local, NaiveDate};
use strum::{AsRefStr, EnumString};

/// Date windows offered by the schedule and stats keyboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Period {
    Yesterday,
    Today,
    Tomorrow,
    Week,
    Month,
}

impl Period {
    /// Inclusive first and last day. Weeks run Monday to Sunday.
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Yesterday => {
                let day = today - Duration::days(1);
                (day, day)
            }
            Period::Today => (today, today),
            Period::Tomorrow => {
                let day = today + Duration::days(1);
                (day, day)
            }
            Period::Week => week_range(today),
            Period::Month => month_range(today),
        }
    }

    pub fn is_multi_day(&self) -> bool {
        matches!(self, Period::Week | Period::Month)
    }

    pub fn stats_label(&self) -> &'static str {
        match self {
            Period::Week => "This Week",
            Period::Month => "This Month",
            _ => "Today",
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn week_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

pub fn month_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today.with_day(1).unwrap_or(today);
    let next_month_start = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    };
    let end = next_month_start
        .map(|d| d - Duration::days(1))
        .unwrap_or(start);
    (start, end)
}
