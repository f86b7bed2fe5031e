//! Fixed-size export windows over a global date range.

use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Format the portal's date inputs expect.
pub const PORTAL_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Window length must be at least one day")]
    ZeroWindow,
}

/// One export window. Built by [`generate_periods`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `start` as typed into the portal (`dd/mm/YYYY`).
    pub start_label: String,
    /// `end` as typed into the portal (`dd/mm/YYYY`).
    pub end_label: String,
    /// Canonical `YYYYmmdd_YYYYmmdd` name, used for the renamed download.
    pub name: String,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            start_label: start.format(PORTAL_DATE_FORMAT).to_string(),
            end_label: end.format(PORTAL_DATE_FORMAT).to_string(),
            name: format!("{}_{}", start.format("%Y%m%d"), end.format("%Y%m%d")),
        }
    }

    /// Inclusive length in days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Split `[start, end]` into contiguous windows of `window_days` days.
///
/// Every window but the last is exactly `window_days` long; the last one is
/// clamped to `end`. A `start` after `end` yields no periods.
pub fn generate_periods(
    start: NaiveDate,
    end: NaiveDate,
    window_days: u32,
) -> Result<Vec<Period>, PeriodError> {
    if window_days == 0 {
        return Err(PeriodError::ZeroWindow);
    }

    let span = Days::new(u64::from(window_days) - 1);
    let mut periods = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let period_end = cursor
            .checked_add_days(span)
            .map_or(end, |candidate| candidate.min(end));
        periods.push(Period::new(cursor, period_end));

        match period_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(periods)
}
