//! Temporal configuration and the date-double representation.
//!
//! The engine stores instants as a "date-double": the integer part is days
//! since 1899-12-30 and the fraction is the time of day. All temporal
//! arithmetic happens on that double; formatting goes through a small
//! pattern interpreter covering the subset of `SimpleDateFormat` tokens
//! the configuration strings use.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::{EvalError, Result, ValueKind};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Date/time formatting options for expression evaluation.
///
/// The date-time format variants are derived by joining the date format
/// and the relevant time format with a single space. Defaults follow the
/// US locale.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemporalConfig {
    pub date_format: String,
    pub time_format_12: String,
    pub time_format_24: String,
    pub date_separator: char,
    pub time_separator: char,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        TemporalConfig::us()
    }
}

impl TemporalConfig {
    pub const US_DATE_FORMAT: &'static str = "M/d/yyyy";
    pub const US_TIME_FORMAT_12: &'static str = "h:mm:ss a";
    pub const US_TIME_FORMAT_24: &'static str = "H:mm:ss";

    /// US locale configuration.
    pub fn us() -> TemporalConfig {
        TemporalConfig {
            date_format: Self::US_DATE_FORMAT.to_string(),
            time_format_12: Self::US_TIME_FORMAT_12.to_string(),
            time_format_24: Self::US_TIME_FORMAT_24.to_string(),
            date_separator: '/',
            time_separator: ':',
        }
    }

    pub fn date_time_format_12(&self) -> String {
        format!("{} {}", self.date_format, self.time_format_12)
    }

    pub fn date_time_format_24(&self) -> String {
        format!("{} {}", self.date_format, self.time_format_24)
    }

    pub fn default_date_format(&self) -> &str {
        &self.date_format
    }

    pub fn default_time_format(&self) -> &str {
        &self.time_format_12
    }

    pub fn default_date_time_format(&self) -> String {
        self.date_time_format_12()
    }

    /// Default render pattern for a temporal value of the given kind.
    pub(crate) fn default_format_for(&self, kind: ValueKind) -> String {
        match kind {
            ValueKind::Date => self.date_format.clone(),
            ValueKind::Time => self.time_format_12.clone(),
            _ => self.default_date_time_format(),
        }
    }
}

/// An instant carried by a DATE, TIME or DATE_TIME value, together with
/// the pattern used to render it as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Temporal {
    date_double: f64,
    format: Arc<str>,
}

impl Temporal {
    pub fn new(date_double: f64, format: impl Into<Arc<str>>) -> Temporal {
        Temporal {
            date_double,
            format: format.into(),
        }
    }

    pub fn from_datetime(dt: NaiveDateTime, format: impl Into<Arc<str>>) -> Temporal {
        Temporal::new(datetime_to_date_double(dt), format)
    }

    pub fn date_double(&self) -> f64 {
        self.date_double
    }

    pub fn format_pattern(&self) -> &str {
        &self.format
    }

    pub fn to_datetime(&self) -> NaiveDateTime {
        date_double_to_datetime(self.date_double)
    }

    pub fn render(&self) -> String {
        format_datetime(self.to_datetime(), &self.format)
    }
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("fixed epoch is a valid date")
}

pub fn date_double_to_datetime(date_double: f64) -> NaiveDateTime {
    epoch() + Duration::milliseconds((date_double * MILLIS_PER_DAY).round() as i64)
}

pub fn datetime_to_date_double(dt: NaiveDateTime) -> f64 {
    (dt - epoch()).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Render `dt` according to a `SimpleDateFormat`-style pattern.
///
/// Supported tokens: `yyyy yy M MM d dd H HH h hh m mm s ss a`; every
/// other character is emitted literally.
pub(crate) fn format_datetime(dt: NaiveDateTime, pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        match c {
            'y' => {
                let year = dt.year();
                if run >= 4 {
                    out.push_str(&format!("{year:04}"));
                } else {
                    out.push_str(&format!("{:02}", year.rem_euclid(100)));
                }
            }
            'M' => push_padded(&mut out, dt.month(), run),
            'd' => push_padded(&mut out, dt.day(), run),
            'H' => push_padded(&mut out, dt.hour(), run),
            'h' => {
                let (_, hour12) = dt.time().hour12();
                push_padded(&mut out, hour12, run);
            }
            'm' => push_padded(&mut out, dt.minute(), run),
            's' => push_padded(&mut out, dt.second(), run),
            'a' => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            other => {
                for _ in 0..run {
                    out.push(other);
                }
            }
        }
        i += run;
    }
    out
}

fn push_padded(out: &mut String, value: u32, width: usize) {
    if width >= 2 {
        out.push_str(&format!("{value:02}"));
    } else {
        out.push_str(&value.to_string());
    }
}

/// Which components a parsed temporal string carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParsedKind {
    Date,
    Time,
    DateTime,
}

impl ParsedKind {
    pub(crate) fn value_kind(self) -> ValueKind {
        match self {
            ParsedKind::Date => ValueKind::Date,
            ParsedKind::Time => ValueKind::Time,
            ParsedKind::DateTime => ValueKind::DateTime,
        }
    }
}

/// Parse a date/time string using the configuration's separators and the
/// component order of its date format.
pub(crate) fn parse_temporal(text: &str, cfg: &TemporalConfig) -> Result<(f64, ParsedKind)> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EvalError::Type("invalid date/time value ''".into()));
    }

    let mut am = false;
    let mut pm = false;
    let mut rest = text;
    for (suffix, is_pm) in [(" am", false), (" pm", true), ("am", false), ("pm", true)] {
        if rest.len() > suffix.len() && rest.to_ascii_lowercase().ends_with(suffix) {
            rest = rest[..rest.len() - suffix.len()].trim_end();
            am = !is_pm;
            pm = is_pm;
            break;
        }
    }

    let has_date = rest.contains(cfg.date_separator);
    let has_time = rest.contains(cfg.time_separator);
    if !has_date && !has_time {
        return Err(EvalError::Type(format!("invalid date/time value '{text}'")));
    }

    let (date_part, time_part) = if has_date && has_time {
        let split = rest
            .find(' ')
            .ok_or_else(|| EvalError::Type(format!("invalid date/time value '{text}'")))?;
        (Some(&rest[..split]), Some(rest[split + 1..].trim()))
    } else if has_date {
        (Some(rest), None)
    } else {
        (None, Some(rest))
    };

    let mut days = 0.0;
    if let Some(date_part) = date_part {
        let date = parse_date_components(date_part, cfg)?;
        days = datetime_to_date_double(
            date.and_hms_opt(0, 0, 0)
                .ok_or_else(|| EvalError::Type(format!("invalid date value '{text}'")))?,
        );
    }

    let mut fraction = 0.0;
    if let Some(time_part) = time_part {
        let mut pieces = time_part.split(cfg.time_separator);
        let hour: u32 = parse_component(pieces.next(), text)?;
        let minute: u32 = parse_component(pieces.next(), text)?;
        let second: u32 = match pieces.next() {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| EvalError::Type(format!("invalid time value '{text}'")))?,
            None => 0,
        };
        let hour = match (am, pm) {
            (true, _) if hour == 12 => 0,
            (_, true) if hour < 12 => hour + 12,
            _ => hour,
        };
        if hour > 23 || minute > 59 || second > 59 {
            return Err(EvalError::Type(format!("invalid time value '{text}'")));
        }
        fraction = f64::from(hour * 3600 + minute * 60 + second) / 86_400.0;
    }

    let kind = match (date_part, time_part) {
        (Some(_), Some(_)) => ParsedKind::DateTime,
        (Some(_), None) => ParsedKind::Date,
        (None, _) => ParsedKind::Time,
    };
    Ok((days + fraction, kind))
}

fn parse_component(piece: Option<&str>, original: &str) -> Result<u32> {
    piece
        .map(str::trim)
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| EvalError::Type(format!("invalid time value '{original}'")))
}

fn parse_date_components(date_part: &str, cfg: &TemporalConfig) -> Result<NaiveDate> {
    let numbers: Vec<i32> = date_part
        .split(cfg.date_separator)
        .map(|p| {
            p.trim()
                .parse()
                .map_err(|_| EvalError::Type(format!("invalid date value '{date_part}'")))
        })
        .collect::<Result<_>>()?;
    if numbers.len() != 3 {
        return Err(EvalError::Type(format!("invalid date value '{date_part}'")));
    }

    // Component order comes from the configured date pattern.
    let mut order = Vec::with_capacity(3);
    for c in cfg.date_format.chars() {
        if matches!(c, 'y' | 'M' | 'd') && !order.contains(&c) {
            order.push(c);
        }
    }
    if order.len() != 3 {
        order = vec!['M', 'd', 'y'];
    }

    let (mut year, mut month, mut day) = (0, 0, 0);
    for (component, value) in order.iter().zip(&numbers) {
        match component {
            'y' => year = *value,
            'M' => month = *value,
            _ => day = *value,
        }
    }
    if (0..100).contains(&year) {
        year += if year < 30 { 2000 } else { 1900 };
    }

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| EvalError::Type(format!("invalid date value '{date_part}'")))
}

/// `DateSerial` month/day arithmetic: out-of-range components roll over.
pub(crate) fn date_from_serial_parts(year: i32, month: i32, day: i32) -> Result<NaiveDate> {
    let year = if (0..30).contains(&year) {
        year + 2000
    } else if (30..100).contains(&year) {
        year + 1900
    } else {
        year
    };

    let total_months = i64::from(year) * 12 + i64::from(month) - 1;
    let rolled_year = total_months.div_euclid(12);
    let rolled_month = total_months.rem_euclid(12) + 1;

    let first = NaiveDate::from_ymd_opt(rolled_year as i32, rolled_month as u32, 1)
        .ok_or_else(|| EvalError::Arithmetic(format!("invalid date year {year}")))?;
    Ok(first + Duration::days(i64::from(day) - 1))
}

/// Build a time-of-day fraction, rolling out-of-range components.
pub(crate) fn time_fraction(hours: i32, minutes: i32, seconds: i32) -> f64 {
    let total = i64::from(hours) * 3600 + i64::from(minutes) * 60 + i64::from(seconds);
    total as f64 / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn date_double_round_trips() {
        let moment = dt(2003, 1, 2, 13, 30, 0);
        let dd = datetime_to_date_double(moment);
        assert_eq!(date_double_to_datetime(dd), moment);
        // 2003-01-02 is 37623 days after the epoch.
        assert_eq!(dd.trunc(), 37623.0);
        assert!((dd.fract() - 0.5625).abs() < 1e-9);
    }

    #[test]
    fn formats_us_patterns() {
        let moment = dt(2003, 1, 2, 13, 5, 7);
        assert_eq!(format_datetime(moment, "M/d/yyyy"), "1/2/2003");
        assert_eq!(format_datetime(moment, "h:mm:ss a"), "1:05:07 PM");
        assert_eq!(format_datetime(moment, "H:mm:ss"), "13:05:07");
        assert_eq!(
            format_datetime(moment, "M/d/yyyy h:mm:ss a"),
            "1/2/2003 1:05:07 PM"
        );
        assert_eq!(format_datetime(dt(2003, 1, 2, 0, 0, 0), "hh:mm a"), "12:00 AM");
        assert_eq!(format_datetime(moment, "yy"), "03");
    }

    #[test]
    fn parses_dates_times_and_datetimes() {
        let cfg = TemporalConfig::us();

        let (dd, kind) = parse_temporal("1/2/2003", &cfg).unwrap();
        assert_eq!(kind, ParsedKind::Date);
        assert_eq!(date_double_to_datetime(dd), dt(2003, 1, 2, 0, 0, 0));

        let (dd, kind) = parse_temporal("1/2/2003 1:05:07 PM", &cfg).unwrap();
        assert_eq!(kind, ParsedKind::DateTime);
        assert_eq!(date_double_to_datetime(dd), dt(2003, 1, 2, 13, 5, 7));

        let (dd, kind) = parse_temporal("13:42", &cfg).unwrap();
        assert_eq!(kind, ParsedKind::Time);
        assert!((dd - (13.0 * 3600.0 + 42.0 * 60.0) / 86_400.0).abs() < 1e-9);

        assert!(parse_temporal("pancake", &cfg).is_err());
    }

    #[test]
    fn two_digit_years_pivot_at_30() {
        let cfg = TemporalConfig::us();
        let (dd, _) = parse_temporal("1/2/03", &cfg).unwrap();
        assert_eq!(date_double_to_datetime(dd).year(), 2003);
        let (dd, _) = parse_temporal("1/2/85", &cfg).unwrap();
        assert_eq!(date_double_to_datetime(dd).year(), 1985);
    }

    #[test]
    fn serial_parts_roll_over() {
        assert_eq!(
            date_from_serial_parts(2000, 13, 1).unwrap(),
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()
        );
        assert_eq!(
            date_from_serial_parts(2000, 2, 30).unwrap(),
            NaiveDate::from_ymd_opt(2000, 3, 1).unwrap()
        );
        assert_eq!(
            date_from_serial_parts(3, 6, 15).unwrap(),
            NaiveDate::from_ymd_opt(2003, 6, 15).unwrap()
        );
    }
}
