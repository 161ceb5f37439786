//! Signup funnel: stage counts from the analytics service plus derived
//! percentage-of-baseline and drop-off columns.

use crate::errors::QueryError;
use crate::report::{DateRange, FieldFilter, MatchMode, ReportQuery, ReportResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendered in place of any value that cannot be computed.
pub const SENTINEL: &str = "—";

pub const PAGE_VIEW_EVENT: &str = "page_view";
pub const REGISTER_CLICK_EVENT: &str = "click_register";
pub const SIGN_IN_EVENT: &str = "discord_signin";
pub const FUNNEL_EVENTS: [&str; 3] = [PAGE_VIEW_EVENT, REGISTER_CLICK_EVENT, SIGN_IN_EVENT];

const FUNNEL_METRIC: &str = "totalUsers";
const EVENT_DIMENSION: &str = "eventName";

/// Baseline for percentages; stage 0 is a placeholder without data.
const BASELINE: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Lookback {
    Week,
    #[default]
    TwoWeeks,
    Month,
}

impl Lookback {
    pub const ALL: [Lookback; 3] = [Lookback::Week, Lookback::TwoWeeks, Lookback::Month];

    pub fn days(self) -> u32 {
        match self {
            Self::Week => 7,
            Self::TwoWeeks => 14,
            Self::Month => 30,
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|lookback| lookback.days() == days)
    }

    /// Inclusive range of `days()` calendar days ending on `today`.
    pub fn date_range(self, today: NaiveDate) -> DateRange {
        DateRange::new(today - Duration::days(i64::from(self.days()) - 1), today)
    }
}

impl TryFrom<u32> for Lookback {
    type Error = QueryError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::from_days(days).ok_or_else(|| {
            QueryError::InvalidArgument(format!("lookback must be one of 7, 14 or 30, got {days}"))
        })
    }
}

impl From<Lookback> for u32 {
    fn from(lookback: Lookback) -> Self {
        lookback.days()
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days())
    }
}

/// Calendar date of `now` in the reporting timezone.
pub fn local_today(timezone: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

/// One dimensioned query: distinct users per event, restricted to the funnel
/// events by a single regex alternation (OR inside one predicate).
pub fn funnel_query(range: DateRange) -> Result<ReportQuery, QueryError> {
    let events = FieldFilter::new(EVENT_DIMENSION, FUNNEL_EVENTS.join("|"), MatchMode::FullRegexp)?;
    Ok(ReportQuery::new([FUNNEL_METRIC], range)
        .dimension(EVENT_DIMENSION)
        .filter(events))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub name: String,
    pub total: Option<u64>,
}

impl FunnelStage {
    fn new(name: &str, total: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            total,
        }
    }
}

pub fn stages_from_counts(counts: &ReportResult) -> Vec<FunnelStage> {
    vec![
        FunnelStage::new("Social Media Impressions", None),
        FunnelStage::new("Landing Page Visits", Some(counts.count(PAGE_VIEW_EVENT))),
        FunnelStage::new("Clicked Register", Some(counts.count(REGISTER_CLICK_EVENT))),
        FunnelStage::new("Signed in with Discord", Some(counts.count(SIGN_IN_EVENT))),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelRow {
    pub step: String,
    pub total: Option<u64>,
    pub total_display: String,
    pub percent_of_baseline: String,
    pub drop_off: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub lookback_days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rows: Vec<FunnelRow>,
}

impl FunnelReport {
    pub fn build(lookback: Lookback, range: DateRange, counts: &ReportResult) -> Self {
        Self {
            lookback_days: lookback.days(),
            start_date: range.start,
            end_date: range.end,
            rows: derive_rows(&stages_from_counts(counts)),
        }
    }
}

/// Adds the percentage and drop-off columns.
///
/// Derived columns need a baseline stage with a positive total; otherwise
/// every row carries the sentinel in both columns.
pub fn derive_rows(stages: &[FunnelStage]) -> Vec<FunnelRow> {
    let baseline = stages
        .get(BASELINE)
        .and_then(|stage| stage.total)
        .filter(|total| *total > 0);

    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let (percent_of_baseline, drop_off) = match baseline {
                Some(baseline) => (
                    percent_of_baseline(index, stage.total, baseline),
                    drop_off(stages, index),
                ),
                None => (SENTINEL.to_string(), SENTINEL.to_string()),
            };
            FunnelRow {
                step: stage.name.clone(),
                total: stage.total,
                total_display: stage
                    .total
                    .map(format_thousands)
                    .unwrap_or_else(|| SENTINEL.to_string()),
                percent_of_baseline,
                drop_off,
            }
        })
        .collect()
}

fn percent_of_baseline(index: usize, total: Option<u64>, baseline: u64) -> String {
    match total {
        Some(total) if index >= BASELINE => format_percent(total as f64 / baseline as f64),
        _ => SENTINEL.to_string(),
    }
}

fn drop_off(stages: &[FunnelStage], index: usize) -> String {
    if index < BASELINE || index + 1 >= stages.len() {
        return SENTINEL.to_string();
    }
    match (stages[index].total, stages[index + 1].total) {
        (Some(current), Some(next)) if current > 0 => {
            format_percent(1.0 - next as f64 / current as f64)
        }
        _ => SENTINEL.to_string(),
    }
}

/// `0.25` -> `"25.00%"`.
pub fn format_percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// `1234567` -> `"1,234,567"`.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
