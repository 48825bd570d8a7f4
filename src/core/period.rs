//! Chart windows for NAV and portfolio history.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    SevenDays,
    #[default]
    ThirtyDays,
    YearToDate,
    OneYear,
    ThreeYears,
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Period::SevenDays => "7d",
                Period::ThirtyDays => "30d",
                Period::YearToDate => "ytd",
                Period::OneYear => "1y",
                Period::ThreeYears => "3y",
            }
        )
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "7d" => Ok(Period::SevenDays),
            "30d" => Ok(Period::ThirtyDays),
            "ytd" => Ok(Period::YearToDate),
            "1y" => Ok(Period::OneYear),
            "3y" => Ok(Period::ThreeYears),
            _ => Err(anyhow::anyhow!("Invalid period: {}", s)),
        }
    }
}

impl Period {
    /// First date (inclusive) that belongs to the window ending at `today`.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Period::SevenDays => today - Duration::days(7),
            Period::ThirtyDays => today - Duration::days(30),
            Period::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            Period::OneYear => today - Duration::days(365),
            Period::ThreeYears => today - Duration::days(365 * 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_display() {
        for text in ["7d", "30d", "ytd", "1y", "3y"] {
            let period: Period = text.parse().unwrap();
            assert_eq!(period.to_string(), text);
        }
        assert_eq!("YTD".parse::<Period>().unwrap(), Period::YearToDate);
        assert!("5y".parse::<Period>().is_err());
        assert_eq!(Period::default(), Period::ThirtyDays);
    }

    #[test]
    fn test_period_cutoff() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 18).unwrap();
        assert_eq!(
            Period::SevenDays.cutoff(today),
            NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
        );
        assert_eq!(
            Period::ThirtyDays.cutoff(today),
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap()
        );
        assert_eq!(
            Period::YearToDate.cutoff(today),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
        assert_eq!(
            Period::OneYear.cutoff(today),
            NaiveDate::from_ymd_opt(2025, 2, 18).unwrap()
        );
    }
}
