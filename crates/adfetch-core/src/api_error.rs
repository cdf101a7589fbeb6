//! Classified remote failures.
//!
//! Every failure coming back from the ad platform is sorted into one of four
//! kinds before any retry decision is made:
//!
//! | Kind | Retried | Delay |
//! |------|---------|-------|
//! | [`ApiErrorKind::RateLimited`] | yes | exponential |
//! | [`ApiErrorKind::Transient`] | yes | fixed |
//! | [`ApiErrorKind::Unclassified`] | yes, like `Transient` | fixed |
//! | [`ApiErrorKind::Permanent`] | no | - |

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Failure classification used to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    RateLimited,
    Transient,
    Permanent,
    Unclassified,
}

impl ApiErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Unclassified => "unclassified",
        }
    }
}

impl Display for ApiErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform error codes that signal throttling (app, user, account and
/// business-use-case limits).
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];
const BUSINESS_RATE_LIMIT_CODES: std::ops::RangeInclusive<i64> = 80_000..=80_014;
/// Platform error codes that signal a temporary server-side failure.
const TRANSIENT_CODES: &[i64] = &[1, 2, 1487, 1661];

/// Maps a platform error code to a failure kind.
pub fn classify_code(code: i64) -> ApiErrorKind {
    if RATE_LIMIT_CODES.contains(&code) || BUSINESS_RATE_LIMIT_CODES.contains(&code) {
        ApiErrorKind::RateLimited
    } else if TRANSIENT_CODES.contains(&code) {
        ApiErrorKind::Transient
    } else {
        ApiErrorKind::Permanent
    }
}

/// Maps an HTTP status without a platform error body to a failure kind.
pub fn classify_status(status: u16) -> ApiErrorKind {
    match status {
        429 => ApiErrorKind::RateLimited,
        408 | 500..=599 => ApiErrorKind::Transient,
        400..=499 => ApiErrorKind::Permanent,
        _ => ApiErrorKind::Unclassified,
    }
}

/// Structured, classified failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ApiErrorKind,
    code: Option<i64>,
    message: String,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Builds an error from a platform error code, classifying it.
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            kind: classify_code(code),
            code: Some(code),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Permanent, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unclassified, message)
    }

    pub fn not_found(id: &str) -> Self {
        Self {
            kind: ApiErrorKind::Permanent,
            code: Some(803),
            message: format!("resource '{id}' does not exist"),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub const fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub const fn code(&self) -> Option<i64> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Server-provided hint for how long to wait, if any.
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn retryable(&self) -> bool {
        !matches!(self.kind, ApiErrorKind::Permanent)
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.code, Some(803))
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (api.{}, code {code})", self.message, self.kind),
            None => write!(f, "{} (api.{})", self.message, self.kind),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::permanent(error.to_string())
    }
}
