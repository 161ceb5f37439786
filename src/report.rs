//! Aggregate report queries against the analytics service.
//!
//! A [`ReportQuery`] names metrics, optional dimensions, an inclusive date
//! range and zero or more field filters. [`run_report`] turns it into one
//! `runReport` request and shapes the rows into a [`ReportResult`].

use crate::analytics::{
    AnalyticsBackend, FilterExpression, FilterExpressionList, NamedField, RunReportRequest,
    RunReportResponse, StringFilter, WireDateRange, WireFilter,
};
use crate::errors::QueryError;
use crate::outcome::Outcome;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    Exact,
    BeginsWith,
    FullRegexp,
}

impl MatchMode {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::BeginsWith => "BEGINS_WITH",
            Self::FullRegexp => "FULL_REGEXP",
        }
    }
}

/// A single `field <mode> value` predicate, checked when constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    field: String,
    value: String,
    mode: MatchMode,
}

impl FieldFilter {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        mode: MatchMode,
    ) -> Result<Self, QueryError> {
        let field = field.into();
        let value = value.into();
        if field.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "filter field name must not be empty".to_string(),
            ));
        }
        if mode == MatchMode::FullRegexp {
            Regex::new(&value).map_err(|err| {
                QueryError::InvalidArgument(format!("invalid filter pattern '{value}': {err}"))
            })?;
        }
        Ok(Self { field, value, mode })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    fn to_wire(&self) -> WireFilter {
        WireFilter {
            field_name: self.field.clone(),
            string_filter: StringFilter {
                match_type: self.mode.wire_name().to_string(),
                value: self.value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportQuery {
    metrics: Vec<String>,
    dimensions: Vec<String>,
    date_range: DateRange,
    filters: Vec<FieldFilter>,
}

impl ReportQuery {
    pub fn new<I, S>(metrics: I, date_range: DateRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
            dimensions: Vec::new(),
            date_range,
            filters: Vec::new(),
        }
    }

    pub fn dimension(mut self, name: impl Into<String>) -> Self {
        self.dimensions.push(name.into());
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn is_dimensioned(&self) -> bool {
        !self.dimensions.is_empty()
    }

    /// Builds the request body; several filters are ANDed, a single one is sent as is.
    pub fn to_request(&self) -> RunReportRequest {
        let dimension_filter = match self.filters.as_slice() {
            [] => None,
            [single] => Some(FilterExpression::Filter(single.to_wire())),
            many => Some(FilterExpression::AndGroup(FilterExpressionList {
                expressions: many
                    .iter()
                    .map(|filter| FilterExpression::Filter(filter.to_wire()))
                    .collect(),
            })),
        };

        RunReportRequest {
            date_ranges: vec![WireDateRange {
                start_date: self.date_range.start.format("%Y-%m-%d").to_string(),
                end_date: self.date_range.end.format("%Y-%m-%d").to_string(),
            }],
            metrics: self.metrics.iter().map(NamedField::new).collect(),
            dimensions: self.dimensions.iter().map(NamedField::new).collect(),
            dimension_filter,
        }
    }

    /// Value handed back when the backend cannot answer.
    pub fn safe_default(&self) -> ReportResult {
        if self.is_dimensioned() {
            ReportResult::Dimensioned(BTreeMap::new())
        } else {
            ReportResult::Scalar(0)
        }
    }

    /// Shapes backend rows according to whether dimensions were requested.
    pub fn shape(&self, response: &RunReportResponse) -> Result<ReportResult, QueryError> {
        if !self.is_dimensioned() {
            let value = match response.rows.first() {
                Some(row) => parse_metric(row.metric_values.first().map(|v| v.value.as_str()))?,
                None => 0,
            };
            return Ok(ReportResult::Scalar(value));
        }

        let mut counts = BTreeMap::new();
        for row in &response.rows {
            let key = row
                .dimension_values
                .first()
                .map(|v| v.value.clone())
                .ok_or_else(|| {
                    QueryError::MalformedResponse("row is missing its dimension value".to_string())
                })?;
            let value = parse_metric(row.metric_values.first().map(|v| v.value.as_str()))?;
            counts.insert(key, value);
        }
        Ok(ReportResult::Dimensioned(counts))
    }
}

fn parse_metric(raw: Option<&str>) -> Result<u64, QueryError> {
    let raw = raw.ok_or_else(|| {
        QueryError::MalformedResponse("row is missing its metric value".to_string())
    })?;
    raw.trim()
        .parse::<u64>()
        .map_err(|err| QueryError::MalformedResponse(format!("metric value '{raw}': {err}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportResult {
    Scalar(u64),
    Dimensioned(BTreeMap<String, u64>),
}

impl ReportResult {
    /// Count for a dimension value; values the backend did not return read as zero.
    pub fn count(&self, key: &str) -> u64 {
        match self {
            Self::Dimensioned(counts) => counts.get(key).copied().unwrap_or(0),
            Self::Scalar(_) => 0,
        }
    }

    pub fn scalar(&self) -> u64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Dimensioned(_) => 0,
        }
    }
}

/// Runs one report. Backend failures degrade to the query's safe default.
pub async fn run_report(backend: &dyn AnalyticsBackend, query: &ReportQuery) -> Outcome<ReportResult> {
    let request = query.to_request();
    let result = backend
        .run_report(&request)
        .await
        .and_then(|response| query.shape(&response));
    Outcome::from_result("analytics", result, query.safe_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{ReportRow, WireValue};
    use crate::errors::FailureKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        )
    }

    fn row(dimension: Option<&str>, metric: &str) -> ReportRow {
        ReportRow {
            dimension_values: dimension
                .map(|value| vec![WireValue { value: value.to_string() }])
                .unwrap_or_default(),
            metric_values: vec![WireValue { value: metric.to_string() }],
        }
    }

    struct StubBackend {
        response: Result<RunReportResponse, fn() -> QueryError>,
        seen: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl AnalyticsBackend for StubBackend {
        async fn run_report(&self, request: &RunReportRequest) -> Result<RunReportResponse, QueryError> {
            self.seen
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[test]
    fn single_filter_is_not_wrapped() {
        let query = ReportQuery::new(["totalUsers"], range())
            .filter(FieldFilter::new("eventName", "page_view", MatchMode::Exact).unwrap());
        let body = serde_json::to_value(query.to_request()).unwrap();
        assert_eq!(body["dimensionFilter"]["filter"]["fieldName"], "eventName");
        assert_eq!(
            body["dimensionFilter"]["filter"]["stringFilter"]["matchType"],
            "EXACT"
        );
        assert!(body["dimensionFilter"].get("andGroup").is_none());
    }

    #[test]
    fn multiple_filters_are_anded() {
        let query = ReportQuery::new(["totalUsers"], range())
            .filter(FieldFilter::new("eventName", "page_", MatchMode::BeginsWith).unwrap())
            .filter(FieldFilter::new("country", "Canada", MatchMode::Exact).unwrap());
        let body = serde_json::to_value(query.to_request()).unwrap();
        let expressions = body["dimensionFilter"]["andGroup"]["expressions"]
            .as_array()
            .expect("and group");
        assert_eq!(expressions.len(), 2);
        assert_eq!(
            expressions[0]["filter"]["stringFilter"]["matchType"],
            "BEGINS_WITH"
        );
        assert_eq!(expressions[1]["filter"]["fieldName"], "country");
    }

    #[test]
    fn request_without_filters_or_dimensions_omits_them() {
        let body = serde_json::to_value(ReportQuery::new(["activeUsers"], range()).to_request())
            .unwrap();
        assert!(body.get("dimensionFilter").is_none());
        assert!(body.get("dimensions").is_none());
        assert_eq!(body["dateRanges"][0]["startDate"], "2026-03-01");
        assert_eq!(body["dateRanges"][0]["endDate"], "2026-03-14");
        assert_eq!(body["metrics"][0]["name"], "activeUsers");
    }

    #[test]
    fn invalid_regex_is_rejected_at_construction() {
        let err = FieldFilter::new("eventName", "page_view|(", MatchMode::FullRegexp).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
        assert!(FieldFilter::new(" ", "x", MatchMode::Exact).is_err());
    }

    #[test]
    fn each_match_mode_has_a_wire_name() {
        for (mode, value, wire) in [
            (MatchMode::Exact, "page_view", "EXACT"),
            (MatchMode::BeginsWith, "page_", "BEGINS_WITH"),
            (MatchMode::FullRegexp, "page_view|click_register", "FULL_REGEXP"),
        ] {
            let query = ReportQuery::new(["totalUsers"], range())
                .filter(FieldFilter::new("eventName", value, mode).unwrap());
            let body = serde_json::to_value(query.to_request()).unwrap();
            assert_eq!(body["dimensionFilter"]["filter"]["stringFilter"]["matchType"], wire);
            assert_eq!(body["dimensionFilter"]["filter"]["stringFilter"]["value"], value);
        }
    }

    #[test]
    fn scalar_uses_first_row_or_zero() {
        let query = ReportQuery::new(["activeUsers"], range());
        let response = RunReportResponse {
            rows: vec![row(None, "17"), row(None, "99")],
        };
        assert_eq!(query.shape(&response).unwrap(), ReportResult::Scalar(17));
        assert_eq!(
            query.shape(&RunReportResponse::default()).unwrap(),
            ReportResult::Scalar(0)
        );
    }

    #[test]
    fn dimensioned_lookup_defaults_to_zero() {
        let query = ReportQuery::new(["totalUsers"], range()).dimension("eventName");
        let response = RunReportResponse {
            rows: vec![row(Some("page_view"), "1000"), row(Some("click_register"), "250")],
        };
        let result = query.shape(&response).unwrap();
        assert_eq!(result.count("page_view"), 1000);
        assert_eq!(result.count("click_register"), 250);
        assert_eq!(result.count("discord_signin"), 0);
    }

    #[test]
    fn non_numeric_metric_is_malformed() {
        let query = ReportQuery::new(["totalUsers"], range()).dimension("eventName");
        let response = RunReportResponse {
            rows: vec![row(Some("page_view"), "lots")],
        };
        assert!(matches!(
            query.shape(&response),
            Err(QueryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn date_range_counts_both_ends() {
        assert_eq!(range().days(), 14);
    }

    #[tokio::test]
    async fn run_report_shapes_backend_rows() {
        let backend = StubBackend {
            response: Ok(RunReportResponse {
                rows: vec![row(Some("page_view"), "12")],
            }),
            seen: Mutex::new(Vec::new()),
        };
        let query = ReportQuery::new(["totalUsers"], range()).dimension("eventName");
        let outcome = run_report(&backend, &query).await;
        assert!(outcome.failure().is_none());
        assert_eq!(outcome.value().count("page_view"), 12);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_report_degrades_to_safe_default() {
        let backend = StubBackend {
            response: Err(|| QueryError::Permission("no viewer role".into())),
            seen: Mutex::new(Vec::new()),
        };

        let dimensioned = ReportQuery::new(["totalUsers"], range()).dimension("eventName");
        let outcome = run_report(&backend, &dimensioned).await;
        assert_eq!(outcome.value(), &ReportResult::Dimensioned(BTreeMap::new()));
        assert_eq!(outcome.failure().unwrap().kind, FailureKind::Permission);

        let scalar = ReportQuery::new(["activeUsers"], range());
        let outcome = run_report(&backend, &scalar).await;
        assert_eq!(outcome.value(), &ReportResult::Scalar(0));
    }
}
