//! YYYYMMDD integer date helpers

use chrono::{Datelike, NaiveDate};

/// Parse a YYYYMMDD integer into a calendar date, if valid
#[must_use]
pub fn ymd_to_date(ymd: u32) -> Option<NaiveDate> {
    #[allow(clippy::cast_possible_wrap)]
    let year = (ymd / 10_000) as i32;
    let month = (ymd / 100) % 100;
    let day = ymd % 100;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Encode a calendar date back to a YYYYMMDD integer
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn date_to_ymd(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

/// The calendar day after `ymd`, or `None` if `ymd` is not a valid date
#[must_use]
pub fn next_day(ymd: u32) -> Option<u32> {
    let date = ymd_to_date(ymd)?;
    date.succ_opt().map(date_to_ymd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_within_month() {
        assert_eq!(next_day(20_230_614), Some(20_230_615));
    }

    #[test]
    fn steps_across_month_and_year() {
        assert_eq!(next_day(20_230_131), Some(20_230_201));
        assert_eq!(next_day(20_231_231), Some(20_240_101));
    }

    #[test]
    fn handles_leap_years() {
        assert_eq!(next_day(20_240_228), Some(20_240_229));
        assert_eq!(next_day(20_240_229), Some(20_240_301));
        assert_eq!(next_day(20_230_228), Some(20_230_301));
        // century rule
        assert_eq!(next_day(21_000_228), Some(21_000_301));
        assert_eq!(next_day(20_000_228), Some(20_000_229));
    }

    #[test]
    fn rejects_invalid_dates() {
        assert_eq!(next_day(20_230_230), None);
        assert_eq!(next_day(20_231_301), None);
    }
}
