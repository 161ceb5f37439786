use crate::funnel::{FunnelReport, Lookback};
use crate::outcome::Outcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LookbackParams {
    pub lookback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupsResponse {
    pub timezone: String,
    pub lifetime: Outcome<u64>,
    pub today: Outcome<u64>,
}

/// Everything the HTML page shows for one render.
#[derive(Debug)]
pub struct DashboardView {
    pub lookback: Lookback,
    pub lifetime: Outcome<u64>,
    pub today: Outcome<u64>,
    pub funnel: Outcome<FunnelReport>,
}
