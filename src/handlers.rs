use crate::dashboard::ConnectionReport;
use crate::errors::AppError;
use crate::funnel::{FunnelReport, Lookback};
use crate::models::{DashboardView, LookbackParams, SignupsResponse};
use crate::outcome::Outcome;
use crate::state::AppState;
use crate::ui::render_index;
use axum::{
    Json,
    extract::{Query, State},
    response::Html,
};
use tracing::warn;

pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<LookbackParams>,
) -> Html<String> {
    let lookback = match parse_lookback(params.lookback.as_deref()) {
        Ok(lookback) => lookback,
        Err(err) => {
            warn!("{}, using the default", err.message);
            Lookback::default()
        }
    };

    let dashboard = &state.dashboard;
    let view = DashboardView {
        lookback,
        lifetime: dashboard.lifetime_signups().await,
        today: dashboard.signups_today().await,
        funnel: dashboard.funnel(lookback).await,
    };
    Html(render_index(&view))
}

pub async fn get_lifetime(State(state): State<AppState>) -> Json<SignupsResponse> {
    let dashboard = &state.dashboard;
    Json(SignupsResponse {
        timezone: dashboard.timezone().name().to_string(),
        lifetime: dashboard.lifetime_signups().await,
        today: dashboard.signups_today().await,
    })
}

pub async fn get_funnel(
    State(state): State<AppState>,
    Query(params): Query<LookbackParams>,
) -> Result<Json<Outcome<FunnelReport>>, AppError> {
    let lookback = parse_lookback(params.lookback.as_deref())?;
    Ok(Json(state.dashboard.funnel(lookback).await))
}

pub async fn get_connections(State(state): State<AppState>) -> Json<ConnectionReport> {
    Json(state.dashboard.check_connections().await)
}

fn parse_lookback(raw: Option<&str>) -> Result<Lookback, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Lookback::default());
    };
    raw.parse::<u32>()
        .ok()
        .and_then(Lookback::from_days)
        .ok_or_else(|| AppError::bad_request("lookback must be one of 7, 14 or 30"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_defaults_to_two_weeks() {
        assert_eq!(parse_lookback(None).unwrap(), Lookback::TwoWeeks);
        assert_eq!(parse_lookback(Some("")).unwrap(), Lookback::TwoWeeks);
    }

    #[test]
    fn lookback_accepts_allowed_values_only() {
        assert_eq!(parse_lookback(Some("7")).unwrap(), Lookback::Week);
        assert_eq!(parse_lookback(Some(" 30 ")).unwrap(), Lookback::Month);
        assert!(parse_lookback(Some("21")).is_err());
        assert!(parse_lookback(Some("week")).is_err());
    }
}
