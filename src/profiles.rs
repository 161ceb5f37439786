//! Counts over the `profiles` table, read through the Supabase REST API.

use crate::analytics::http_client;
use crate::errors::{QueryError, Unavailable};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use reqwest::header::CONTENT_RANGE;
use tracing::debug;

pub const PROFILES_TABLE: &str = "profiles";

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn count_all(&self) -> Result<u64, QueryError>;

    /// Rows whose `created_at` falls in `[start, end]`.
    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, QueryError>;
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Result<Self, QueryError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
            service_key: service_key.into(),
            table: PROFILES_TABLE.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }

    async fn count(&self, filters: &[(&str, String)]) -> Result<u64, QueryError> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string()), ("limit", "0".to_string())];
        query.extend(filters.iter().cloned());
        debug!(table = %self.table, "counting rows");

        let response = self
            .client
            .get(self.table_url())
            .query(&query)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "count=exact")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::from_status(status, body));
        }

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                QueryError::MalformedResponse("response has no Content-Range header".to_string())
            })?;
        parse_content_range_total(range)
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn count_all(&self) -> Result<u64, QueryError> {
        self.count(&[]).await
    }

    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, QueryError> {
        self.count(&[
            ("created_at", format!("gte.{}", timestamp(start))),
            ("created_at", format!("lte.{}", timestamp(end))),
        ])
        .await
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reads the total out of `0-24/3573` or `*/3573`.
fn parse_content_range_total(range: &str) -> Result<u64, QueryError> {
    let total = range
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| QueryError::MalformedResponse(format!("unexpected Content-Range '{range}'")))?;
    total.parse::<u64>().map_err(|_| {
        QueryError::MalformedResponse(format!("Content-Range '{range}' carries no exact count"))
    })
}

/// Stand-in used when the profile store settings are missing.
pub struct UnavailableProfiles {
    reason: Unavailable,
}

impl UnavailableProfiles {
    pub fn new(reason: Unavailable) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl ProfileStore for UnavailableProfiles {
    async fn count_all(&self) -> Result<u64, QueryError> {
        Err(self.reason.to_error())
    }

    async fn count_created_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<u64, QueryError> {
        Err(self.reason.to_error())
    }
}
