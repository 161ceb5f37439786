//! Environment-based configuration.

use crate::analytics::DEFAULT_API_BASE;
use crate::cache::DEFAULT_TTL;
use chrono_tz::Tz;
use serde::Serialize;
use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

pub const SUPABASE_URL: &str = "SUPABASE_URL";
pub const SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const GA4_PROPERTY_ID: &str = "GA4_PROPERTY_ID";
pub const GA4_SERVICE_ACCOUNT_JSON: &str = "GA4_SERVICE_ACCOUNT_JSON";

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub ga4_property_id: Option<String>,
    pub ga4_service_account_json: Option<String>,
    pub ga4_api_base: String,
    pub timezone: Tz,
    pub cache_ttl: Duration,
}

/// Whether one required setting was provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingStatus {
    pub name: &'static str,
    pub present: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds settings from any name -> value source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let timezone = match get("DASHBOARD_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| format!("DASHBOARD_TIMEZONE '{name}' is not a known timezone"))?,
            None => DEFAULT_TIMEZONE,
        };

        Ok(Self {
            port: get("PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(DEFAULT_PORT),
            supabase_url: get(SUPABASE_URL),
            supabase_key: get(SUPABASE_SERVICE_ROLE_KEY),
            ga4_property_id: get(GA4_PROPERTY_ID),
            ga4_service_account_json: get(GA4_SERVICE_ACCOUNT_JSON),
            ga4_api_base: get("GA4_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timezone,
            cache_ttl: get("CACHE_TTL_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TTL),
        })
    }

    pub fn required(&self) -> Vec<SettingStatus> {
        vec![
            SettingStatus {
                name: GA4_PROPERTY_ID,
                present: self.ga4_property_id.is_some(),
            },
            SettingStatus {
                name: GA4_SERVICE_ACCOUNT_JSON,
                present: self.ga4_service_account_json.is_some(),
            },
            SettingStatus {
                name: SUPABASE_URL,
                present: self.supabase_url.is_some(),
            },
            SettingStatus {
                name: SUPABASE_SERVICE_ROLE_KEY,
                present: self.supabase_key.is_some(),
            },
        ]
    }
}
