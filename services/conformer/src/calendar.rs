//! Calendar Generator - the date dimension
//!
//! One row per day in [start, end) with:
//! - calendar breakdown and ISO week
//! - Brazilian national holidays (fixed and Easter-relative)
//! - retail events (Black Friday, Mother's Day, Dia dos Namorados,
//!   Children's Day, Consumer's Day)
//! - fiscal year starting July 1
//!
//! The function is pure: same range and mode, same rows.

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::parse::year_in_range;
use crate::silver::DateDim;

/// How the Easter anchor for Carnival and Good Friday is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CarnivalMode {
    /// Gregorian Easter (anonymous algorithm)
    #[default]
    Computus,
    /// Legacy approximation: April 1 plus a fixed number of days.
    /// Kept only to reproduce historical date-dimension output.
    FixedOffset,
}

impl FromStr for CarnivalMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "computus" | "easter" => Ok(CarnivalMode::Computus),
            "fixed_offset" | "legacy" => Ok(CarnivalMode::FixedOffset),
            other => anyhow::bail!(
                "Unknown carnival mode '{}' (expected computus or fixed_offset)",
                other
            ),
        }
    }
}

impl fmt::Display for CarnivalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarnivalMode::Computus => f.write_str("computus"),
            CarnivalMode::FixedOffset => f.write_str("fixed_offset"),
        }
    }
}

/// Days after April 1 used as the Easter stand-in by the legacy mode
pub const LEGACY_EASTER_OFFSET_DAYS: i64 = 15;

const FIXED_HOLIDAYS: &[(u32, u32, &str)] = &[
    (1, 1, "New Year's Day"),
    (4, 21, "Tiradentes"),
    (5, 1, "Labor Day"),
    (9, 7, "Independence Day"),
    (10, 12, "Children's Day"),
    (11, 2, "All Souls' Day"),
    (11, 15, "Republic Proclamation Day"),
    (12, 25, "Christmas Day"),
];

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Gregorian Easter Sunday (anonymous / Meeus-Jones-Butcher algorithm)
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Carnival Monday, Carnival Tuesday and Good Friday for a year
pub fn moving_holidays(year: i32, mode: CarnivalMode) -> Option<[(NaiveDate, &'static str); 3]> {
    let (anchor, monday, tuesday) = match mode {
        CarnivalMode::Computus => (easter_sunday(year)?, -48, -47),
        CarnivalMode::FixedOffset => (
            NaiveDate::from_ymd_opt(year, 4, 1)? + Duration::days(LEGACY_EASTER_OFFSET_DAYS),
            -47,
            -46,
        ),
    };
    Some([
        (anchor + Duration::days(monday), "Carnival Monday"),
        (anchor + Duration::days(tuesday), "Carnival Tuesday"),
        (anchor - Duration::days(2), "Good Friday"),
    ])
}

/// Friday after the fourth Thursday of November
pub fn black_friday(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4).map(|d| d + Duration::days(1))
}

/// Second Sunday of May
pub fn mothers_day(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, 5, Weekday::Sun, 2)
}

/// Fiscal year and quarter for a fiscal year starting July 1
pub fn fiscal_period(date: NaiveDate) -> (i32, &'static str) {
    match date.month() {
        7..=9 => (date.year() + 1, "FQ1"),
        10..=12 => (date.year() + 1, "FQ2"),
        1..=3 => (date.year(), "FQ3"),
        _ => (date.year(), "FQ4"),
    }
}

/// Holiday names per date for one year; a date can carry more than one
pub fn holidays(year: i32, mode: CarnivalMode) -> BTreeMap<NaiveDate, Vec<&'static str>> {
    let mut out: BTreeMap<NaiveDate, Vec<&'static str>> = BTreeMap::new();
    for (month, day, name) in FIXED_HOLIDAYS {
        if let Some(date) = NaiveDate::from_ymd_opt(year, *month, *day) {
            out.entry(date).or_default().push(*name);
        }
    }
    if let Some(moving) = moving_holidays(year, mode) {
        for (date, name) in moving {
            out.entry(date).or_default().push(name);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct CalendarGenerator {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub mode: CarnivalMode,
}

impl CalendarGenerator {
    pub fn new(start: NaiveDate, end: NaiveDate, mode: CarnivalMode) -> Self {
        Self { start, end, mode }
    }

    pub fn generate(&self) -> Result<Vec<DateDim>> {
        if self.start >= self.end {
            anyhow::bail!(
                "Calendar range is empty: start {} is not before end {}",
                self.start,
                self.end
            );
        }
        // date_key packs the year into four digits
        let last = self.end.pred_opt().unwrap_or(self.end);
        if !year_in_range(self.start.year()) || !year_in_range(last.year()) {
            anyhow::bail!(
                "Calendar range {} .. {} is outside the supported years",
                self.start,
                self.end
            );
        }

        let mut per_year: BTreeMap<i32, BTreeMap<NaiveDate, Vec<&'static str>>> = BTreeMap::new();
        let mut rows = Vec::new();

        for date in self.start.iter_days().take_while(|d| *d < self.end) {
            let year = date.year();
            let year_holidays = per_year
                .entry(year)
                .or_insert_with(|| holidays(year, self.mode));
            let holiday_name = year_holidays.get(&date).map(|names| names.join(" / "));
            rows.push(self.row(date, holiday_name));
        }

        Ok(rows)
    }

    fn row(&self, date: NaiveDate, holiday_name: Option<String>) -> DateDim {
        let year = date.year();
        let month = date.month();
        let day = date.day();
        let weekday = date.weekday();
        let quarter = (month - 1) / 3 + 1;
        let (fiscal_year, fiscal_quarter) = fiscal_period(date);

        DateDim {
            date_key: year * 10_000 + (month * 100 + day) as i32,
            full_date: date,
            year,
            quarter: quarter as i32,
            quarter_name: format!("Q{}", quarter),
            month: month as i32,
            month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
            year_month: format!("{}-{:02}", year, month),
            day_of_month: day as i32,
            day_of_week: weekday.number_from_monday() as i32,
            day_name: DAY_NAMES[weekday.num_days_from_monday() as usize].to_string(),
            day_of_year: date.ordinal() as i32,
            week_number_iso: date.iso_week().week() as i32,
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            is_holiday: holiday_name.is_some(),
            holiday_name,
            is_black_friday: black_friday(year) == Some(date),
            is_mothers_day: mothers_day(year) == Some(date),
            is_valentines_day: month == 6 && day == 12,
            is_childrens_day: month == 10 && day == 12,
            is_consumers_day: month == 3 && day == 15,
            fiscal_year,
            fiscal_quarter: fiscal_quarter.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn default_range() -> Vec<DateDim> {
        CalendarGenerator::new(d(2016, 1, 1), d(2020, 1, 1), CarnivalMode::Computus)
            .generate()
            .unwrap()
    }

    fn row(rows: &[DateDim], date: NaiveDate) -> &DateDim {
        rows.iter().find(|r| r.full_date == date).unwrap()
    }

    // -------------------------------------------------------------------------
    // RANGE
    // -------------------------------------------------------------------------

    #[test]
    fn test_range_is_complete_and_gap_free() {
        let rows = default_range();
        // 2016 is a leap year
        assert_eq!(rows.len(), 366 + 365 + 365 + 365);
        assert_eq!(rows.first().unwrap().full_date, d(2016, 1, 1));
        assert_eq!(rows.last().unwrap().full_date, d(2019, 12, 31));
        for pair in rows.windows(2) {
            assert_eq!(pair[1].full_date - pair[0].full_date, Duration::days(1));
        }
    }

    #[test]
    fn test_empty_range_is_an_error() {
        let result =
            CalendarGenerator::new(d(2020, 1, 1), d(2020, 1, 1), CarnivalMode::Computus).generate();
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_range_years_are_an_error() {
        let far = NaiveDate::from_ymd_opt(250_000, 1, 1).unwrap();
        let result = CalendarGenerator::new(d(2016, 1, 1), far, CarnivalMode::Computus).generate();
        assert!(result.is_err());

        let last_day =
            CalendarGenerator::new(d(9999, 12, 31), d(10_000, 1, 1), CarnivalMode::Computus)
                .generate()
                .unwrap();
        assert_eq!(last_day[0].date_key, 99991231);
    }

    #[test]
    fn test_date_key_format() {
        let rows = default_range();
        assert_eq!(row(&rows, d(2018, 3, 7)).date_key, 20180307);
    }

    // -------------------------------------------------------------------------
    // FISCAL
    // -------------------------------------------------------------------------

    #[test]
    fn test_fiscal_quarter_boundaries() {
        let rows = default_range();
        let july = row(&rows, d(2019, 7, 1));
        assert_eq!((july.fiscal_year, july.fiscal_quarter.as_str()), (2020, "FQ1"));
        let june = row(&rows, d(2019, 6, 30));
        assert_eq!((june.fiscal_year, june.fiscal_quarter.as_str()), (2019, "FQ4"));
    }

    #[test]
    fn test_fiscal_quarter_mapping() {
        assert_eq!(fiscal_period(d(2018, 10, 1)), (2019, "FQ2"));
        assert_eq!(fiscal_period(d(2018, 12, 31)), (2019, "FQ2"));
        assert_eq!(fiscal_period(d(2019, 1, 1)), (2019, "FQ3"));
        assert_eq!(fiscal_period(d(2019, 4, 1)), (2019, "FQ4"));
    }

    // -------------------------------------------------------------------------
    // RETAIL EVENTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_black_friday_2019() {
        let rows = default_range();
        let flagged: Vec<NaiveDate> = rows
            .iter()
            .filter(|r| r.is_black_friday && r.year == 2019)
            .map(|r| r.full_date)
            .collect();
        assert_eq!(flagged, vec![d(2019, 11, 29)]);
    }

    #[test]
    fn test_black_friday_other_years() {
        assert_eq!(black_friday(2016), Some(d(2016, 11, 25)));
        assert_eq!(black_friday(2017), Some(d(2017, 11, 24)));
        assert_eq!(black_friday(2018), Some(d(2018, 11, 23)));
    }

    #[test]
    fn test_mothers_day_is_second_sunday_of_may() {
        assert_eq!(mothers_day(2019), Some(d(2019, 5, 12)));
        assert_eq!(mothers_day(2018), Some(d(2018, 5, 13)));
        let rows = default_range();
        assert!(row(&rows, d(2017, 5, 14)).is_mothers_day);
    }

    #[test]
    fn test_fixed_retail_dates() {
        let rows = default_range();
        assert!(row(&rows, d(2018, 6, 12)).is_valentines_day);
        assert!(row(&rows, d(2018, 10, 12)).is_childrens_day);
        assert!(row(&rows, d(2018, 3, 15)).is_consumers_day);
        assert!(!row(&rows, d(2018, 2, 14)).is_valentines_day);
    }

    // -------------------------------------------------------------------------
    // HOLIDAYS
    // -------------------------------------------------------------------------

    #[test]
    fn test_fixed_holidays_flagged() {
        let rows = default_range();
        let tiradentes = row(&rows, d(2017, 4, 21));
        assert!(tiradentes.is_holiday);
        assert_eq!(tiradentes.holiday_name.as_deref(), Some("Tiradentes"));
        assert!(row(&rows, d(2019, 12, 25)).is_holiday);
        assert!(!row(&rows, d(2019, 12, 26)).is_holiday);
    }

    #[test]
    fn test_easter_dates() {
        assert_eq!(easter_sunday(2016), Some(d(2016, 3, 27)));
        assert_eq!(easter_sunday(2017), Some(d(2017, 4, 16)));
        assert_eq!(easter_sunday(2018), Some(d(2018, 4, 1)));
        assert_eq!(easter_sunday(2019), Some(d(2019, 4, 21)));
    }

    #[test]
    fn test_computus_carnival_2019() {
        let names = holidays(2019, CarnivalMode::Computus);
        assert_eq!(names.get(&d(2019, 3, 4)), Some(&vec!["Carnival Monday"]));
        assert_eq!(names.get(&d(2019, 3, 5)), Some(&vec!["Carnival Tuesday"]));
        assert_eq!(names.get(&d(2019, 4, 19)), Some(&vec!["Good Friday"]));
    }

    #[test]
    fn test_fixed_offset_mode_uses_april_anchor() {
        // anchor = 2019-04-16
        let names = holidays(2019, CarnivalMode::FixedOffset);
        assert_eq!(names.get(&d(2019, 2, 28)), Some(&vec!["Carnival Monday"]));
        assert_eq!(names.get(&d(2019, 3, 1)), Some(&vec!["Carnival Tuesday"]));
        assert_eq!(names.get(&d(2019, 4, 14)), Some(&vec!["Good Friday"]));
    }

    #[test]
    fn test_colliding_holidays_are_joined() {
        // Good Friday 2000 fell on Tiradentes
        let rows = CalendarGenerator::new(d(2000, 4, 1), d(2000, 5, 1), CarnivalMode::Computus)
            .generate()
            .unwrap();
        assert_eq!(
            row(&rows, d(2000, 4, 21)).holiday_name.as_deref(),
            Some("Tiradentes / Good Friday")
        );
    }

    #[test]
    fn test_carnival_mode_parsing() {
        assert_eq!("computus".parse::<CarnivalMode>().unwrap(), CarnivalMode::Computus);
        assert_eq!("FIXED_OFFSET".parse::<CarnivalMode>().unwrap(), CarnivalMode::FixedOffset);
        assert!("lunar".parse::<CarnivalMode>().is_err());
    }

    // -------------------------------------------------------------------------
    // CALENDAR ATTRIBUTES
    // -------------------------------------------------------------------------

    #[test]
    fn test_weekend_and_iso_week() {
        let rows = default_range();
        let sunday = row(&rows, d(2017, 1, 1));
        assert!(sunday.is_weekend);
        assert_eq!(sunday.day_name, "Sunday");
        assert_eq!(sunday.day_of_week, 7);
        // 2017-01-01 belongs to ISO week 52 of 2016
        assert_eq!(sunday.week_number_iso, 52);
        let monday = row(&rows, d(2017, 1, 2));
        assert!(!monday.is_weekend);
        assert_eq!(monday.week_number_iso, 1);
    }

    #[test]
    fn test_quarter_and_month_labels() {
        let rows = default_range();
        let r = row(&rows, d(2018, 8, 15));
        assert_eq!(r.quarter, 3);
        assert_eq!(r.quarter_name, "Q3");
        assert_eq!(r.month_name, "August");
        assert_eq!(r.year_month, "2018-08");
        assert_eq!(r.day_of_year, 227);
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(default_range(), default_range());
    }
}
