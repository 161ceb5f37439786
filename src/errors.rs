use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

/// Errors raised while talking to the profile store or the analytics service.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("missing configuration: {0}")]
    Configuration(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl QueryError {
    /// Classifies a non-success HTTP status from either backend.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Permission(body),
            400 | 404 => Self::InvalidArgument(body),
            code => Self::Status { status: code, body },
        }
    }

    /// The message without its kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Configuration(msg)
            | Self::Permission(msg)
            | Self::InvalidArgument(msg)
            | Self::MalformedResponse(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Permission(_) => FailureKind::Permission,
            Self::InvalidArgument(_) => FailureKind::InvalidArgument,
            Self::Transport(_) | Self::Status { .. } => FailureKind::Transport,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Why a backend could not be built at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    Missing(Vec<&'static str>),
    InvalidCredentials(String),
}

impl Unavailable {
    pub fn to_error(&self) -> QueryError {
        match self {
            Self::Missing(names) => QueryError::Configuration(names.join(", ")),
            Self::InvalidCredentials(message) => QueryError::MalformedResponse(message.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Permission,
    InvalidArgument,
    Transport,
    MalformedResponse,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Permission => "permission",
            Self::InvalidArgument => "invalid argument",
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed response",
        }
    }
}

/// A backend failure as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub source: &'static str,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(source: &'static str, err: &QueryError) -> Self {
        Self {
            source,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        let denied = QueryError::from_status(reqwest::StatusCode::FORBIDDEN, "nope".into());
        assert_eq!(denied.kind(), FailureKind::Permission);

        let invalid = QueryError::from_status(reqwest::StatusCode::BAD_REQUEST, "bad id".into());
        assert_eq!(invalid.kind(), FailureKind::InvalidArgument);

        let unavailable =
            QueryError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert_eq!(unavailable.kind(), FailureKind::Transport);
    }

    #[test]
    fn failure_carries_source_and_message() {
        let err = QueryError::Configuration("GA4_PROPERTY_ID".into());
        let failure = Failure::new("analytics", &err);
        assert_eq!(failure.source, "analytics");
        assert_eq!(failure.kind, FailureKind::Configuration);
        assert_eq!(failure.message, "missing configuration: GA4_PROPERTY_ID");
    }
}
