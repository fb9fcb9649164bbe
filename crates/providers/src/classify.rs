//! Error-string classifier.
//!
//! Providers surface failures as free-form strings (HTTP bodies, SDK
//! messages).  The classifier pattern-matches them into a small set of
//! kinds that drive the retry and failover policy.  Context overflow is a
//! separate predicate because it triggers compaction rather than retry.

use ma_domain::error::Error;

/// Failure kinds recognized by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimit,
    Auth,
    Timeout,
    Billing,
    Format,
    Unknown,
}

impl ErrorKind {
    /// Whether this kind should count against a provider when deciding to
    /// fail over.  Timeouts are excluded: they are fatal to the run but
    /// say little about the provider itself.
    pub fn failover_worthy(&self) -> bool {
        !matches!(self, ErrorKind::Timeout)
    }
}

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "429",
    "too many requests",
    "overloaded",
];

const AUTH_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid api key",
    "invalid x-api-key",
    "authentication",
];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "etimedout", "deadline exceeded"];

const BILLING_PATTERNS: &[&str] = &[
    "402",
    "billing",
    "quota exceeded",
    "insufficient credit",
    "payment required",
];

const FORMAT_PATTERNS: &[&str] = &[
    "invalid request",
    "invalid_request_error",
    "malformed",
    "schema",
];

const CONTEXT_OVERFLOW_PATTERNS: &[&str] = &[
    "request too large",
    "context length exceeded",
    "prompt is too long",
    "maximum context",
];

/// Classify a free-form error message by case-insensitive substring match.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(RATE_LIMIT_PATTERNS) {
        ErrorKind::RateLimit
    } else if matches(AUTH_PATTERNS) {
        ErrorKind::Auth
    } else if matches(TIMEOUT_PATTERNS) {
        ErrorKind::Timeout
    } else if matches(BILLING_PATTERNS) {
        ErrorKind::Billing
    } else if matches(FORMAT_PATTERNS) {
        ErrorKind::Format
    } else {
        ErrorKind::Unknown
    }
}

/// Separate predicate for context-window overflow.  Also matches the
/// `413` + "too large" combination some gateways produce.
pub fn is_context_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    if CONTEXT_OVERFLOW_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower.contains("413") && lower.contains("too large")
}

/// Classifier applied to the domain error type.
pub fn classify(err: &Error) -> ErrorKind {
    match err {
        Error::Timeout(_) => ErrorKind::Timeout,
        Error::Auth(_) => ErrorKind::Auth,
        other => classify_error(&other.to_string()),
    }
}

/// Context-overflow predicate applied to the domain error type.
pub fn error_is_context_overflow(err: &Error) -> bool {
    matches!(err, Error::ContextOverflow(_)) || is_context_overflow(&err.to_string())
}
