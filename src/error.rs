//! Error handling for kraken-rfb
//!
//! Defines the failure taxonomy of the report pipeline and establishes a
//! unified Result type using anyhow for context chaining and propagation.
//! Each component raises a `ReportError` at the root of the chain; callers
//! add context (which transaction, which date, which API call) on the way up.

use chrono::NaiveDate;
use thiserror::Error;

/// Failure kinds of a report run. Every kind maps to its own exit status.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by {service}: {detail}")]
    RateLimited { service: String, detail: String },

    #[error("no {base}/{quote} rate available for {date}: {reason}")]
    RateUnavailable {
        date: NaiveDate,
        base: String,
        quote: String,
        reason: String,
    },

    #[error("unsupported transaction kind '{kind}' (transaction {reference} on {date})")]
    UnsupportedTransactionKind {
        kind: String,
        reference: String,
        date: NaiveDate,
    },

    #[error("format validation error: {0}")]
    FormatValidation(String),

    #[error("invalid response from {service}: {detail}")]
    InvalidResponse { service: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Process exit status for this failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::Config(_) => 2,
            ReportError::Authentication(_) => 10,
            ReportError::Network(_) => 11,
            ReportError::RateLimited { .. } => 12,
            ReportError::RateUnavailable { .. } => 13,
            ReportError::UnsupportedTransactionKind { .. } => 14,
            ReportError::FormatValidation(_) => 15,
            ReportError::InvalidResponse { .. } => 16,
            ReportError::Io(_) => 17,
        }
    }

    pub fn rate_unavailable(
        date: NaiveDate,
        base: &str,
        quote: &str,
        reason: impl Into<String>,
    ) -> Self {
        ReportError::RateUnavailable {
            date,
            base: base.to_string(),
            quote: quote.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_response(service: &str, detail: impl Into<String>) -> Self {
        ReportError::InvalidResponse {
            service: service.to_string(),
            detail: detail.into(),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_transport(service: &str, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            ReportError::invalid_response(service, err.to_string())
        } else {
            ReportError::Network(format!("{}: {}", service, err))
        }
    }

    /// Classify a non-success HTTP status returned by `service`
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{} - {}", status, body.trim())
        };
        match status.as_u16() {
            401 | 403 => ReportError::Authentication(format!("{}: {}", service, detail)),
            429 => ReportError::RateLimited {
                service: service.to_string(),
                detail,
            },
            _ => ReportError::Network(format!("{}: {}", service, detail)),
        }
    }
}

/// Result type alias for report operations
pub type Result<T> = anyhow::Result<T>;

/// Find the first `ReportError` in an error chain
pub fn report_error(err: &anyhow::Error) -> Option<&ReportError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ReportError>())
}

/// Exit status for any error that reached `main`
pub fn exit_code(err: &anyhow::Error) -> i32 {
    report_error(err).map_or(1, ReportError::exit_code)
}
