//! Re-encoding of time axes.
//!
//! Model output uses a variety of calendars and time encodings, and some files carry
//! broken time values altogether. [`replace_time`] discards the stored values and writes a
//! regular monthly (or annual) axis anchored on a known date, encoded as
//! `days since <first step>` in the dataset's calendar.
//!
//! ```
//! use omz_core::dataset::{Dataset, Variable};
//! use omz_core::time::{replace_time, Frequency};
//!
//! let mut ds = Dataset::new();
//! ds.insert_variable("o2", Variable::from_vec("time", vec![0.0; 3])).unwrap();
//!
//! // the second step falls on January 2015, so the axis starts in December 2014
//! let ds = replace_time(&ds, "2015-01-16", 1, Frequency::MonthStart, Some("noleap")).unwrap();
//! let time = ds.coord("time").unwrap();
//! assert_eq!(time.to_vec(), vec![0.0, 31.0, 62.0]);
//! assert_eq!(time.attrs()["units"].as_str(), Some("days since 2014-12-01"));
//! ```

use crate::dataset::{AttrValue, Dataset, Variable};
use crate::errors::{OmzError, OmzResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CUMULATIVE_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Spacing of a regular time axis; every step falls on the first day of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    MonthStart,
    YearStart,
}

impl FromStr for Frequency {
    type Err = OmzError;

    /// Accepts the pandas-style aliases `1MS`/`MS` and `1YS`/`YS`/`1AS`/`AS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('1') {
            "MS" => Ok(Frequency::MonthStart),
            "YS" | "AS" => Ok(Frequency::YearStart),
            _ => Err(OmzError::Invalid(format!("Unsupported frequency '{s}'"))),
        }
    }
}

/// CF calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Calendar {
    /// `standard`/`gregorian`, treated as proleptic Gregorian.
    Standard,
    ProlepticGregorian,
    /// `noleap`/`365_day`
    NoLeap,
    /// `all_leap`/`366_day`
    AllLeap,
    /// `360_day`
    Day360,
}

impl FromStr for Calendar {
    type Err = OmzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(OmzError::Invalid(format!("Unsupported calendar '{other}'"))),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        };
        write!(f, "{name}")
    }
}

/// First day of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthStart {
    pub year: i32,
    pub month: u32,
}

impl MonthStart {
    /// Parse a date such as `2015-01`, `2015-01-16` or `2015-01-16T12:00:00`.
    ///
    /// Only the year and month are kept.
    pub fn parse(s: &str) -> OmzResult<Self> {
        let s = s.trim();
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map(|d| d.date()))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|d| d.date()))
            .map_err(|_| OmzError::MalformedDate(s.to_string()))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }

    /// The date `steps` periods before this one.
    pub fn back(&self, steps: usize, freq: Frequency) -> Self {
        match freq {
            Frequency::YearStart => Self {
                year: self.year - steps as i32,
                month: self.month,
            },
            Frequency::MonthStart => self.add_months(-(steps as i64)),
        }
    }

    /// The date `steps` periods after this one.
    pub fn forward(&self, steps: usize, freq: Frequency) -> Self {
        match freq {
            Frequency::YearStart => Self {
                year: self.year + steps as i32,
                month: self.month,
            },
            Frequency::MonthStart => self.add_months(steps as i64),
        }
    }

    fn add_months(&self, months: i64) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) + months;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    fn to_naive(self) -> OmzResult<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or_else(|| OmzError::MalformedDate(self.to_string()))
    }

    /// Days from `origin` to this date in `calendar`.
    pub fn days_since(&self, origin: &MonthStart, calendar: Calendar) -> OmzResult<i64> {
        let years = (self.year - origin.year) as i64;
        let (m, m0) = (self.month as usize - 1, origin.month as usize - 1);
        Ok(match calendar {
            Calendar::Standard | Calendar::ProlepticGregorian => self
                .to_naive()?
                .signed_duration_since(origin.to_naive()?)
                .num_days(),
            Calendar::NoLeap => years * 365 + CUMULATIVE_DAYS[m] - CUMULATIVE_DAYS[m0],
            Calendar::AllLeap => {
                let leap = |i: usize| CUMULATIVE_DAYS[i] + i64::from(i >= 2);
                years * 366 + leap(m) - leap(m0)
            }
            Calendar::Day360 => years * 360 + (m as i64 - m0 as i64) * 30,
        })
    }
}

impl fmt::Display for MonthStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-01", self.year, self.month)
    }
}

/// Extract the single element of `values`.
///
/// Reference dates are often taken from a one-element selection of another dataset's
/// time axis.
pub fn unpack_date<T: Clone + fmt::Debug>(values: &[T]) -> OmzResult<T> {
    match values {
        [single] => Ok(single.clone()),
        _ => Err(OmzError::Invalid(format!(
            "Expected exactly one reference date, got {values:?}"
        ))),
    }
}

fn resolve_calendar(ds: &Dataset, calendar: Option<&str>) -> OmzResult<Calendar> {
    let from_time = ds
        .coord("time")
        .and_then(|t| t.attrs().get("calendar"))
        .and_then(AttrValue::as_str);
    calendar
        .or(from_time)
        .or_else(|| ds.attr_str("calendar"))
        .unwrap_or("standard")
        .parse()
}

/// Replace the time axis of `ds` by a regular series on which step `start_idx` falls on
/// the month of `ref_date`.
///
/// The calendar is `calendar` if given, else the `calendar` attribute of the time
/// coordinate, else that of the dataset, else `standard`. Other attributes of the time
/// coordinate are kept; `units` and `calendar` are rewritten to match the new values.
pub fn replace_time(
    ds: &Dataset,
    ref_date: &str,
    start_idx: usize,
    freq: Frequency,
    calendar: Option<&str>,
) -> OmzResult<Dataset> {
    let reference = MonthStart::parse(ref_date)?;
    let periods = ds.dim_len("time").ok_or_else(|| OmzError::DimensionMismatch {
        dim: "time".to_string(),
        context: "dataset whose time axis is replaced".to_string(),
    })?;
    let calendar = resolve_calendar(ds, calendar)?;
    let start = reference.back(start_idx, freq);
    debug!("New time axis: {periods} steps from {start} ({calendar} calendar)");

    let values = (0..periods)
        .map(|k| {
            start
                .forward(k, freq)
                .days_since(&start, calendar)
                .map(|d| d as f64)
        })
        .collect::<OmzResult<Vec<f64>>>()?;

    let mut time = Variable::from_vec("time", values);
    if let Some(old) = ds.coord("time") {
        *time.attrs_mut() = old.attrs().clone();
    }
    let time = time
        .with_attr("units", format!("days since {start}"))
        .with_attr("calendar", calendar.to_string());

    let mut out = ds.clone();
    out.insert_coord("time", time)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(steps: usize) -> Dataset {
        let mut ds = Dataset::new();
        ds.insert_variable("o2", Variable::from_vec("time", vec![1.0; steps]))
            .unwrap();
        ds.insert_coord(
            "time",
            Variable::from_vec("time", vec![-999.0; steps])
                .with_attr("long_name", "time")
                .with_attr("calendar", "360_day"),
        )
        .unwrap();
        ds
    }

    #[test]
    fn parses_reference_dates() {
        assert_eq!(
            MonthStart::parse("2015-01-16").unwrap(),
            MonthStart { year: 2015, month: 1 }
        );
        assert_eq!(MonthStart::parse("1850-07").unwrap().month, 7);
        assert_eq!(MonthStart::parse("2000-02-01T12:00:00").unwrap().year, 2000);
        for bad in ["2000-13", "January 2000", "", "2000-02-30"] {
            assert!(matches!(
                MonthStart::parse(bad),
                Err(OmzError::MalformedDate(_))
            ));
        }
    }

    #[test]
    fn propagates_back_across_year() {
        let reference = MonthStart::parse("2000-01-01").unwrap();
        assert_eq!(
            reference.back(14, Frequency::MonthStart),
            MonthStart { year: 1998, month: 11 }
        );
        assert_eq!(
            reference.back(12, Frequency::MonthStart),
            MonthStart { year: 1999, month: 1 }
        );
        assert_eq!(reference.back(3, Frequency::YearStart).year, 1997);
    }

    #[test]
    fn calendar_from_time_coordinate() {
        let out = replace_time(&monthly(4), "2000-03-15", 5, Frequency::MonthStart, None).unwrap();
        let time = out.coord("time").unwrap();
        assert_eq!(time.to_vec(), vec![0.0, 30.0, 60.0, 90.0]);
        assert_eq!(time.attrs()["units"].as_str(), Some("days since 1999-10-01"));
        assert_eq!(time.attrs()["calendar"].as_str(), Some("360_day"));
        assert_eq!(time.attrs()["long_name"].as_str(), Some("time"));
        assert_eq!(out.variable("o2").unwrap().to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn explicit_calendar_wins() {
        let out = replace_time(
            &monthly(3),
            "2000-01",
            0,
            Frequency::MonthStart,
            Some("standard"),
        )
        .unwrap();
        // January and February of a leap year
        assert_eq!(out.coord("time").unwrap().to_vec(), vec![0.0, 31.0, 60.0]);

        let leap = replace_time(&monthly(3), "2001-01", 0, Frequency::MonthStart, Some("all_leap"))
            .unwrap();
        assert_eq!(leap.coord("time").unwrap().to_vec(), vec![0.0, 31.0, 60.0]);
    }

    #[test]
    fn dataset_calendar_and_default() {
        let mut ds = Dataset::new();
        ds.insert_variable("o2", Variable::from_vec("time", vec![1.0; 2]))
            .unwrap();
        let out = replace_time(&ds, "1850-01", 0, Frequency::YearStart, None).unwrap();
        let time = out.coord("time").unwrap();
        assert_eq!(time.to_vec(), vec![0.0, 365.0]);
        assert_eq!(time.attrs()["calendar"].as_str(), Some("standard"));

        ds.set_attr("calendar", "noleap");
        let out = replace_time(&ds, "1852-01", 0, Frequency::YearStart, None).unwrap();
        assert_eq!(out.coord("time").unwrap().to_vec(), vec![0.0, 365.0]);
    }

    #[test]
    fn malformed_reference_is_fatal() {
        let err = replace_time(&monthly(2), "20xx-01", 0, Frequency::MonthStart, None).unwrap_err();
        assert!(matches!(err, OmzError::MalformedDate(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn unpack_single_date() {
        assert_eq!(unpack_date(&["2015-01-16"]).unwrap(), "2015-01-16");
        assert!(unpack_date::<&str>(&[]).is_err());
        assert!(unpack_date(&["2015-01-16", "2015-02-16"]).is_err());
    }

    #[test]
    fn frequency_aliases() {
        assert_eq!("1MS".parse::<Frequency>().unwrap(), Frequency::MonthStart);
        assert_eq!("AS".parse::<Frequency>().unwrap(), Frequency::YearStart);
        assert!("1D".parse::<Frequency>().is_err());
    }
}
