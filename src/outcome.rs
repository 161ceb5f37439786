//! Tagged result of a dashboard query.
//!
//! A query never fails outright: when its backend errors, it still yields a
//! safe default value alongside the failure so the rest of the page renders.

use crate::errors::{Failure, QueryError};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ready { value: T },
    Degraded { value: T, failure: Failure },
}

impl<T> Outcome<T> {
    pub fn ready(value: T) -> Self {
        Self::Ready { value }
    }

    /// Converts a backend result, substituting `fallback` on error.
    pub fn from_result(source: &'static str, result: Result<T, QueryError>, fallback: T) -> Self {
        match result {
            Ok(value) => Self::Ready { value },
            Err(err) => {
                warn!(source, kind = err.kind().label(), "query degraded: {err}");
                Self::Degraded {
                    value: fallback,
                    failure: Failure::new(source, &err),
                }
            }
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Ready { value } | Self::Degraded { value, .. } => value,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Ready { .. } => None,
            Self::Degraded { failure, .. } => Some(failure),
        }
    }

    pub fn into_parts(self) -> (T, Option<Failure>) {
        match self {
            Self::Ready { value } => (value, None),
            Self::Degraded { value, failure } => (value, Some(failure)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ready { value } => Outcome::Ready { value: f(value) },
            Self::Degraded { value, failure } => Outcome::Degraded {
                value: f(value),
                failure,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[test]
    fn error_yields_fallback_and_failure() {
        let outcome: Outcome<u64> = Outcome::from_result(
            "profiles",
            Err(QueryError::Permission("denied".into())),
            0,
        );
        assert_eq!(*outcome.value(), 0);
        let failure = outcome.failure().expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::Permission);
        assert_eq!(failure.source, "profiles");
    }

    #[test]
    fn map_keeps_failure() {
        let outcome: Outcome<u64> =
            Outcome::from_result("analytics", Err(QueryError::Configuration("x".into())), 0);
        let mapped = outcome.map(|v| v + 1);
        let (value, failure) = mapped.into_parts();
        assert_eq!(value, 1);
        assert!(failure.is_some());
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::ready(5u64)).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["value"], 5);
    }
}
