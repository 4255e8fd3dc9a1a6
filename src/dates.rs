// 📅 Dates - DD.MM.YYYY parsing and age arithmetic

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").expect("valid date regex"));

/// Source of "today" for age checks. Tables take one so tests can pin the date.
pub type Clock = fn() -> NaiveDate;

pub fn system_today() -> NaiveDate {
    Local::now().date_naive()
}

/// `DD.MM.YYYY` with two-digit day/month and a real calendar date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    if !DATE_SHAPE.is_match(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Whole years between `birth` and `on`, one less if the birthday
/// has not come round yet in the year of `on`.
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Calendar ordering of two `DD.MM.YYYY` strings. Unparseable text sorts
/// as the earliest possible date.
pub fn compare_dates(left: &str, right: &str) -> Ordering {
    let key = |text: &str| parse_date(text).unwrap_or(NaiveDate::MIN);
    key(left).cmp(&key(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_shape() {
        assert_eq!(parse_date("05.03.1990"), Some(d(1990, 3, 5)));
        assert_eq!(parse_date("5.3.1990"), None);
        assert_eq!(parse_date("1990-03-05"), None);
        assert_eq!(parse_date("31.02.2000"), None); // not a calendar date
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let birth = d(2000, 6, 15);
        assert_eq!(age_on(birth, d(2018, 6, 14)), 17);
        assert_eq!(age_on(birth, d(2018, 6, 15)), 18);
        assert_eq!(age_on(birth, d(2018, 12, 31)), 18);
    }

    #[test]
    fn test_compare_dates_uses_calendar_order() {
        assert_eq!(compare_dates("31.12.2019", "01.01.2020"), Ordering::Less);
        assert_eq!(compare_dates("02.01.2020", "01.01.2020"), Ordering::Greater);
        assert_eq!(compare_dates("01.01.2020", "01.01.2020"), Ordering::Equal);
        assert_eq!(compare_dates("garbage", "01.01.2020"), Ordering::Less);
    }
}
