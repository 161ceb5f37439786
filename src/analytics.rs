//! Google Analytics Data API client.
//!
//! Only `runReport` is used. Requests are authorised with a bearer token
//! minted from a service-account key (see [`crate::credentials`]).

use crate::credentials::{ServiceAccountKey, TokenSource};
use crate::errors::{QueryError, Unavailable};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://analyticsdata.googleapis.com";

#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn run_report(&self, request: &RunReportRequest) -> Result<RunReportResponse, QueryError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    pub date_ranges: Vec<WireDateRange>,
    pub metrics: Vec<NamedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<NamedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_filter: Option<FilterExpression>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedField {
    pub name: String,
}

impl NamedField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterExpression {
    Filter(WireFilter),
    AndGroup(FilterExpressionList),
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterExpressionList {
    pub expressions: Vec<FilterExpression>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFilter {
    pub field_name: String,
    pub string_filter: StringFilter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    pub match_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunReportResponse {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: Vec<WireValue>,
    #[serde(default)]
    pub metric_values: Vec<WireValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireValue {
    pub value: String,
}

pub struct Ga4Client {
    client: Client,
    base_url: String,
    property_id: String,
    tokens: TokenSource,
}

impl Ga4Client {
    pub fn new(
        property_id: impl Into<String>,
        key: ServiceAccountKey,
        base_url: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let client = http_client()?;
        Ok(Self {
            tokens: TokenSource::new(client.clone(), key),
            client,
            base_url: base_url.into(),
            property_id: property_id.into(),
        })
    }

    /// Client with a fixed access token, skipping the key exchange.
    #[cfg(test)]
    pub fn with_token(
        property_id: impl Into<String>,
        base_url: impl Into<String>,
        token: &str,
    ) -> Result<Self, QueryError> {
        let client = http_client()?;
        Ok(Self {
            tokens: TokenSource::fixed(token),
            client,
            base_url: base_url.into(),
            property_id: property_id.into(),
        })
    }

    fn report_url(&self) -> String {
        format!(
            "{}/v1beta/properties/{}:runReport",
            self.base_url.trim_end_matches('/'),
            self.property_id
        )
    }
}

#[async_trait]
impl AnalyticsBackend for Ga4Client {
    async fn run_report(&self, request: &RunReportRequest) -> Result<RunReportResponse, QueryError> {
        let token = self.tokens.access_token().await?;
        let url = self.report_url();
        debug!("GA4 runReport: {url}");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::from_status(status, body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(RunReportResponse::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Stand-in used when the analytics settings are missing or unusable.
pub struct UnavailableAnalytics {
    reason: Unavailable,
}

impl UnavailableAnalytics {
    pub fn new(reason: Unavailable) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl AnalyticsBackend for UnavailableAnalytics {
    async fn run_report(&self, _request: &RunReportRequest) -> Result<RunReportResponse, QueryError> {
        Err(self.reason.to_error())
    }
}

pub(crate) fn http_client() -> Result<Client, QueryError> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}
