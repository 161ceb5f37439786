//! Query service behind the pages: signup counts from the profile store and
//! the funnel from the analytics service, memoized through [`QueryCache`].

use crate::analytics::{AnalyticsBackend, Ga4Client, UnavailableAnalytics};
use crate::cache::QueryCache;
use crate::config::{
    GA4_PROPERTY_ID, GA4_SERVICE_ACCOUNT_JSON, SUPABASE_SERVICE_ROLE_KEY, SUPABASE_URL,
    SettingStatus, Settings,
};
use crate::credentials::ServiceAccountKey;
use crate::errors::{Failure, FailureKind, QueryError, Unavailable};
use crate::funnel::{FunnelReport, Lookback, funnel_query, local_today};
use crate::outcome::Outcome;
use crate::profiles::{ProfileStore, SupabaseClient, UnavailableProfiles};
use crate::report::{DateRange, ReportQuery, ReportResult, run_report};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

const LIFETIME_OP: &str = "profiles.count_all";
const REPORT_OP: &str = "analytics.run_report";

pub struct Dashboard {
    profiles: Arc<dyn ProfileStore>,
    analytics: Arc<dyn AnalyticsBackend>,
    cache: QueryCache,
    timezone: Tz,
    settings: Vec<SettingStatus>,
}

impl Dashboard {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        analytics: Arc<dyn AnalyticsBackend>,
        cache: QueryCache,
        timezone: Tz,
    ) -> Self {
        Self {
            profiles,
            analytics,
            cache,
            timezone,
            settings: Vec::new(),
        }
    }

    /// Builds both backends; one that cannot be configured is replaced by a
    /// stand-in whose every call fails, so the other still serves data.
    pub fn from_settings(settings: &Settings) -> Self {
        let profiles: Arc<dyn ProfileStore> = match (&settings.supabase_url, &settings.supabase_key) {
            (Some(url), Some(key)) => match SupabaseClient::new(url.clone(), key.clone()) {
                Ok(client) => Arc::new(client),
                Err(err) => {
                    error!("failed to build profile store client: {err}");
                    Arc::new(UnavailableProfiles::new(Unavailable::InvalidCredentials(
                        err.detail(),
                    )))
                }
            },
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push(SUPABASE_URL);
                }
                if key.is_none() {
                    missing.push(SUPABASE_SERVICE_ROLE_KEY);
                }
                error!("profile store not configured, missing {}", missing.join(", "));
                Arc::new(UnavailableProfiles::new(Unavailable::Missing(missing)))
            }
        };

        let analytics: Arc<dyn AnalyticsBackend> =
            match (&settings.ga4_property_id, &settings.ga4_service_account_json) {
                (Some(property_id), Some(json)) => {
                    let client = ServiceAccountKey::from_json(json).and_then(|key| {
                        info!("analytics authenticating as {}", key.client_email);
                        Ga4Client::new(property_id.clone(), key, settings.ga4_api_base.clone())
                    });
                    match client {
                        Ok(client) => Arc::new(client),
                        Err(err) => {
                            error!("failed to build analytics client: {err}");
                            Arc::new(UnavailableAnalytics::new(Unavailable::InvalidCredentials(
                                err.detail(),
                            )))
                        }
                    }
                }
                (property_id, json) => {
                    let mut missing = Vec::new();
                    if property_id.is_none() {
                        missing.push(GA4_PROPERTY_ID);
                    }
                    if json.is_none() {
                        missing.push(GA4_SERVICE_ACCOUNT_JSON);
                    }
                    error!("analytics not configured, missing {}", missing.join(", "));
                    Arc::new(UnavailableAnalytics::new(Unavailable::Missing(missing)))
                }
            };

        let mut dashboard = Self::new(
            profiles,
            analytics,
            QueryCache::new(settings.cache_ttl),
            settings.timezone,
        );
        dashboard.settings = settings.required();
        dashboard
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn today(&self) -> NaiveDate {
        local_today(self.timezone, Utc::now())
    }

    pub async fn lifetime_signups(&self) -> Outcome<u64> {
        if let Some(count) = self.cache.get(LIFETIME_OP, &()).await {
            return Outcome::ready(count);
        }
        let outcome = Outcome::from_result("profiles", self.profiles.count_all().await, 0);
        if let Outcome::Ready { value } = &outcome {
            self.cache.insert(LIFETIME_OP, &(), value).await;
        }
        outcome
    }

    /// Profiles created since local midnight. The window ends at `now`, so the
    /// result is never memoized.
    pub async fn signups_today(&self) -> Outcome<u64> {
        self.signups_since_midnight(Utc::now()).await
    }

    pub async fn signups_since_midnight(&self, now: DateTime<Utc>) -> Outcome<u64> {
        let start = local_midnight_utc(self.timezone, now);
        Outcome::from_result(
            "profiles",
            self.profiles.count_created_between(start, now).await,
            0,
        )
    }

    /// Runs a report, reusing a memoized result while it is fresh.
    /// Degraded results are not memoized.
    pub async fn report(&self, query: &ReportQuery) -> Outcome<ReportResult> {
        if let Some(result) = self.cache.get(REPORT_OP, query).await {
            return Outcome::ready(result);
        }
        let outcome = run_report(self.analytics.as_ref(), query).await;
        if let Outcome::Ready { value } = &outcome {
            self.cache.insert(REPORT_OP, query, value).await;
        }
        outcome
    }

    pub async fn funnel(&self, lookback: Lookback) -> Outcome<FunnelReport> {
        self.funnel_at(lookback, self.today()).await
    }

    pub async fn funnel_at(&self, lookback: Lookback, today: NaiveDate) -> Outcome<FunnelReport> {
        let range = lookback.date_range(today);
        let counts = match funnel_query(range) {
            Ok(query) => self.report(&query).await,
            Err(err) => Outcome::from_result(
                "analytics",
                Err(err),
                ReportResult::Dimensioned(Default::default()),
            ),
        };
        counts.map(|counts| FunnelReport::build(lookback, range, &counts))
    }

    /// Checks settings and both backends without touching the cache.
    pub async fn check_connections(&self) -> ConnectionReport {
        let mut checks: Vec<ConnectionCheck> = self
            .settings
            .iter()
            .map(|status| ConnectionCheck {
                name: status.name.to_string(),
                ok: status.present,
                detail: if status.present {
                    format!("found {}", status.name)
                } else {
                    format!("{} is not set", status.name)
                },
                hint: None,
            })
            .collect();

        checks.push(match self.profiles.count_all().await {
            Ok(count) => ConnectionCheck::passed(
                "profile store",
                format!("found {count} rows in the profiles table"),
            ),
            Err(err) => ConnectionCheck::failed("profile store", &err, profile_hint(err.kind())),
        });

        let today = self.today();
        let probe = ReportQuery::new(["activeUsers"], DateRange::new(today - Duration::days(1), today));
        checks.push(
            match self.analytics.run_report(&probe.to_request()).await {
                Ok(response) => ConnectionCheck::passed(
                    "analytics",
                    format!("test report returned {} rows", response.rows.len()),
                ),
                Err(err) => ConnectionCheck::failed("analytics", &err, analytics_hint(err.kind())),
            },
        );

        let all_ok = checks.iter().all(|check| check.ok);
        if all_ok {
            info!("all connections are working");
        } else {
            error!("one or more connections failed");
        }
        ConnectionReport { all_ok, checks }
    }
}

fn local_midnight_utc(timezone: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = local_today(timezone, now).and_hms_opt(0, 0, 0).unwrap_or_default();
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        // midnight skipped by a DST jump; fall back to treating it as UTC
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

fn profile_hint(kind: FailureKind) -> Option<&'static str> {
    match kind {
        FailureKind::Configuration => Some("set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY"),
        FailureKind::Permission => Some("check SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY"),
        FailureKind::InvalidArgument => Some("ensure the profiles table exists"),
        _ => None,
    }
}

fn analytics_hint(kind: FailureKind) -> Option<&'static str> {
    match kind {
        FailureKind::Configuration => Some("set GA4_PROPERTY_ID and GA4_SERVICE_ACCOUNT_JSON"),
        FailureKind::MalformedResponse => {
            Some("GA4_SERVICE_ACCOUNT_JSON must hold the entire service account key file")
        }
        FailureKind::Permission => {
            Some("the service account may lack the Viewer role in the property's access management")
        }
        FailureKind::InvalidArgument => Some("GA4_PROPERTY_ID may be incorrect"),
        FailureKind::Transport => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
    pub hint: Option<&'static str>,
}

impl ConnectionCheck {
    fn passed(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            detail,
            hint: None,
        }
    }

    fn failed(name: &'static str, err: &QueryError, hint: Option<&'static str>) -> Self {
        let failure = Failure::new(name, err);
        Self {
            name: name.to_string(),
            ok: false,
            detail: failure.message,
            hint,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub all_ok: bool,
    pub checks: Vec<ConnectionCheck>,
}
