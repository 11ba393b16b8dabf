//! Date resolution for spreadsheet encodings
//!
//! Spreadsheets store dates either as a serial day count from the 1899-12-30
//! epoch (the offset absorbs the historical 1900 leap-year bug) or as text.
//! Everything here is total: a value that cannot be read as a plausible date
//! resolves to `None`.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Timelike};

use crate::types::Cell;

/// `NaiveDate::num_days_from_ce` of 1899-12-30
const EXCEL_EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// Smallest serial accepted as a date (1899-12-31)
pub const SERIAL_MIN: f64 = 1.0;

/// Largest serial accepted as a date (2064-04-08)
pub const SERIAL_MAX: f64 = 60_000.0;

/// Plausible calendar years for text dates
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const FREEFORM_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%a %b %d %Y",
];

const FREEFORM_DATETIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

/// Month-only labels such as "Mar 2024" read as the first of the month
const MONTH_ONLY_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y"];

/// Resolve any cell to a calendar date
pub fn resolve_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(n) => resolve_serial(*n),
        Cell::Text(s) | Cell::DateTime(s) => resolve_text(s),
        Cell::Boolean(_) | Cell::Empty => None,
    }
}

/// Resolve a serial day count; the time-of-day fraction is dropped
pub fn resolve_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(SERIAL_MIN..=SERIAL_MAX).contains(&serial.floor()) {
        return None;
    }
    NaiveDate::from_num_days_from_ce_opt(EXCEL_EPOCH_DAYS_FROM_CE + serial.floor() as i32)
}

/// Resolve date text: serial-looking numbers first, then ISO forms, then free-form
pub fn resolve_text(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(n) = s.parse::<f64>() {
        if (SERIAL_MIN..=SERIAL_MAX).contains(&n.floor()) {
            return resolve_serial(n);
        }
    }

    parse_iso(s)
        .or_else(|| parse_freeform(s))
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ISO_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            ISO_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_freeform(s: &str) -> Option<NaiveDate> {
    FREEFORM_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            FREEFORM_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            let padded = format!("1 {}", s);
            MONTH_ONLY_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&padded, fmt).ok())
        })
}

/// Encode a date as a serial day count
pub fn to_serial(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - EXCEL_EPOCH_DAYS_FROM_CE)
}

/// Encode a date-time as a serial with the time of day as the fraction
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    to_serial(dt.date()) + f64::from(dt.time().num_seconds_from_midnight()) / 86_400.0
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}
