pub mod client;
pub mod messages;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

/// Remaining deadline budget in milliseconds, set by callers.
pub const DEADLINE_HEADER: &str = "x-deadline-ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    DeadlineExceeded,
    Unavailable,
    Internal,
    Unknown,
}

impl RpcCode {
    pub fn http_status(self) -> StatusCode {
        match self {
            RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
            RpcCode::NotFound => StatusCode::NOT_FOUND,
            RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            RpcCode::Internal | RpcCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn from_http_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => RpcCode::InvalidArgument,
            StatusCode::NOT_FOUND => RpcCode::NotFound,
            StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => RpcCode::DeadlineExceeded,
            StatusCode::SERVICE_UNAVAILABLE => RpcCode::Unavailable,
            StatusCode::INTERNAL_SERVER_ERROR => RpcCode::Internal,
            _ => RpcCode::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RpcCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Internal, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(RpcCode::DeadlineExceeded, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unknown, message)
    }

    /// Prefixes context onto an upstream error while preserving its code.
    pub fn wrap(prefix: &str, upstream: RpcError) -> Self {
        RpcError {
            code: upstream.code,
            message: format!("{prefix}: {}", upstream.message),
        }
    }
}

impl actix_web::ResponseError for RpcError {
    fn status_code(&self) -> StatusCode {
        self.code.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Deadline budget a callee should honor: the caller-provided header when
/// present and sane, the local default otherwise.
pub fn inherited_deadline(req: &HttpRequest, fallback: Duration) -> Duration {
    let Some(value) = req.headers().get(DEADLINE_HEADER) else {
        return fallback;
    };

    value
        .to_str()
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .map(|inherited| inherited.min(fallback))
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn codes_round_trip_through_http_statuses() {
        for code in [
            RpcCode::InvalidArgument,
            RpcCode::NotFound,
            RpcCode::DeadlineExceeded,
            RpcCode::Unavailable,
            RpcCode::Internal,
        ] {
            assert_eq!(RpcCode::from_http_status(code.http_status()), code);
        }
    }

    #[test]
    fn wrap_preserves_the_upstream_code() {
        let upstream = RpcError::deadline_exceeded("router timed out");
        let wrapped = RpcError::wrap("cannot get bids", upstream);

        assert_eq!(wrapped.code, RpcCode::DeadlineExceeded);
        assert!(wrapped.message.contains("cannot get bids"));
        assert!(wrapped.message.contains("router timed out"));
    }

    #[test]
    fn inherited_deadline_is_clamped_to_the_fallback() {
        let fallback = Duration::from_millis(100);

        let req = TestRequest::default()
            .insert_header((DEADLINE_HEADER, "40"))
            .to_http_request();
        assert_eq!(inherited_deadline(&req, fallback), Duration::from_millis(40));

        let req = TestRequest::default()
            .insert_header((DEADLINE_HEADER, "500"))
            .to_http_request();
        assert_eq!(inherited_deadline(&req, fallback), fallback);

        let req = TestRequest::default()
            .insert_header((DEADLINE_HEADER, "junk"))
            .to_http_request();
        assert_eq!(inherited_deadline(&req, fallback), fallback);

        let req = TestRequest::default().to_http_request();
        assert_eq!(inherited_deadline(&req, fallback), fallback);
    }
}
