//! Environment configuration.
//!
//! Variables (all optional except `DB_URL` for database runs):
//!   DB_URL, DB_MAX_CONNECTIONS, CITY_RULES_PATH, CALENDAR_START,
//!   CALENDAR_END, CARNIVAL_MODE, LOAD_ATOMIC, DEFAULT_DELIVERY_DAYS

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use std::path::PathBuf;

use crate::calendar::CarnivalMode;
use crate::parse::year_in_range;
use crate::timeline::DEFAULT_DELIVERY_DAYS;

pub const DEFAULT_CALENDAR_START: &str = "2016-01-01";
pub const DEFAULT_CALENDAR_END: &str = "2020-01-01";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub city_rules_path: Option<PathBuf>,
    /// Inclusive
    pub calendar_start: NaiveDate,
    /// Exclusive
    pub calendar_end: NaiveDate,
    pub carnival_mode: CarnivalMode,
    /// Run every truncate and insert inside one transaction
    pub atomic: bool,
    pub default_delivery_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let calendar_start = parse_date(&var("CALENDAR_START", DEFAULT_CALENDAR_START))
            .context("CALENDAR_START is not a YYYY-MM-DD date")?;
        let calendar_end = parse_date(&var("CALENDAR_END", DEFAULT_CALENDAR_END))
            .context("CALENDAR_END is not a YYYY-MM-DD date")?;
        if !year_in_range(calendar_start.year()) || !year_in_range(calendar_end.year()) {
            anyhow::bail!(
                "CALENDAR_START/CALENDAR_END must use four-digit years ({} .. {})",
                calendar_start,
                calendar_end
            );
        }
        if calendar_start >= calendar_end {
            anyhow::bail!(
                "CALENDAR_START ({}) must be before CALENDAR_END ({})",
                calendar_start,
                calendar_end
            );
        }

        let db_max_connections: u32 = var("DB_MAX_CONNECTIONS", "5")
            .trim()
            .parse()
            .context("DB_MAX_CONNECTIONS must be a positive integer")?;
        if db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        let default_delivery_days: i64 =
            var("DEFAULT_DELIVERY_DAYS", &DEFAULT_DELIVERY_DAYS.to_string())
                .trim()
                .parse()
                .context("DEFAULT_DELIVERY_DAYS must be an integer number of days")?;
        if default_delivery_days < 0 {
            anyhow::bail!(
                "DEFAULT_DELIVERY_DAYS must not be negative (got {})",
                default_delivery_days
            );
        }

        Ok(Self {
            db_url: lookup("DB_URL").filter(|s| !s.trim().is_empty()),
            db_max_connections,
            city_rules_path: lookup("CITY_RULES_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            calendar_start,
            calendar_end,
            carnival_mode: var("CARNIVAL_MODE", "computus").parse()?,
            atomic: parse_bool(&var("LOAD_ATOMIC", "true"))
                .context("LOAD_ATOMIC must be true or false")?,
            default_delivery_days,
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?)
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.db_url, None);
        assert_eq!(c.db_max_connections, 5);
        assert_eq!(c.calendar_start, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(c.calendar_end, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(c.carnival_mode, CarnivalMode::Computus);
        assert!(c.atomic);
        assert_eq!(c.default_delivery_days, 10);
        assert!(c.require_db_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("DB_URL", "postgres://localhost/dw"),
            ("CITY_RULES_PATH", "/etc/conformer/rules.json"),
            ("CALENDAR_END", "2021-01-01"),
            ("CARNIVAL_MODE", "fixed_offset"),
            ("LOAD_ATOMIC", "false"),
            ("DEFAULT_DELIVERY_DAYS", "12"),
        ])
        .unwrap();
        assert_eq!(c.require_db_url().unwrap(), "postgres://localhost/dw");
        assert_eq!(c.city_rules_path, Some(PathBuf::from("/etc/conformer/rules.json")));
        assert_eq!(c.calendar_end, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(c.carnival_mode, CarnivalMode::FixedOffset);
        assert!(!c.atomic);
        assert_eq!(c.default_delivery_days, 12);
    }

    #[test]
    fn test_inverted_calendar_range_rejected() {
        let inverted = config(&[("CALENDAR_START", "2020-01-01"), ("CALENDAR_END", "2019-01-01")]);
        assert!(inverted.is_err());
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(config(&[("CALENDAR_START", "01/01/2016")]).is_err());
        assert!(config(&[("LOAD_ATOMIC", "maybe")]).is_err());
        assert!(config(&[("CARNIVAL_MODE", "lunar")]).is_err());
    }

    #[test]
    fn test_numeric_values_fail_loudly() {
        assert!(config(&[("DEFAULT_DELIVERY_DAYS", "ten")]).is_err());
        assert!(config(&[("DEFAULT_DELIVERY_DAYS", "-3")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "many")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
        let c = config(&[("DEFAULT_DELIVERY_DAYS", "0")]).unwrap();
        assert_eq!(c.default_delivery_days, 0);
    }

    #[test]
    fn test_calendar_years_outside_four_digits_rejected() {
        assert!(config(&[("CALENDAR_END", "+250000-01-01")]).is_err());
    }
}
