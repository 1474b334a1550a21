//! Alpaca adapter errors and their mapping onto the core's port errors.

use reqwest::StatusCode;
use thiserror::Error;

use meanrev_core::ports::{BrokerError, MarketDataError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlpacaError {
    #[error("authentication failed (HTTP {status}): {message}")]
    AuthenticationFailed { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unprocessable request: {0}")]
    Unprocessable(String),

    #[error("rate limited")]
    RateLimited,

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl AlpacaError {
    /// Classify a non-success response.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        let code = status.as_u16();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AlpacaError::AuthenticationFailed { status: code, message }
            }
            StatusCode::NOT_FOUND => AlpacaError::NotFound(message),
            StatusCode::UNPROCESSABLE_ENTITY => AlpacaError::Unprocessable(message),
            StatusCode::TOO_MANY_REQUESTS => AlpacaError::RateLimited,
            s if s.is_server_error() => AlpacaError::Server { status: code, message },
            _ => AlpacaError::Http { status: code, message },
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        AlpacaError::Network(err.to_string())
    }
}

impl From<AlpacaError> for BrokerError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::AuthenticationFailed { .. } => BrokerError::Unauthenticated(err.to_string()),
            AlpacaError::NotFound(msg) => BrokerError::NotFound(msg),
            AlpacaError::Unprocessable(msg) => BrokerError::Rejected(msg),
            AlpacaError::RateLimited => BrokerError::RateLimited,
            AlpacaError::JsonParse(msg) => BrokerError::Malformed(msg),
            AlpacaError::Server { .. }
            | AlpacaError::Http { .. }
            | AlpacaError::Network(_)
            | AlpacaError::Client(_) => BrokerError::Unavailable(err.to_string()),
        }
    }
}

/// Market data has no notion of authentication or rejection; both surface
/// as the provider being unavailable.
pub fn into_market_data_error(err: AlpacaError, ticker: &str) -> MarketDataError {
    match err {
        AlpacaError::NotFound(_) => MarketDataError::NotFound {
            ticker: ticker.to_string(),
        },
        AlpacaError::RateLimited => MarketDataError::RateLimited,
        AlpacaError::JsonParse(msg) => MarketDataError::Malformed(msg),
        other => MarketDataError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let m = || "boom".to_string();
        assert!(matches!(
            AlpacaError::from_status(StatusCode::UNAUTHORIZED, m()),
            AlpacaError::AuthenticationFailed { status: 401, .. }
        ));
        assert!(matches!(
            AlpacaError::from_status(StatusCode::FORBIDDEN, m()),
            AlpacaError::AuthenticationFailed { status: 403, .. }
        ));
        assert_eq!(
            AlpacaError::from_status(StatusCode::NOT_FOUND, m()),
            AlpacaError::NotFound("boom".into())
        );
        assert_eq!(
            AlpacaError::from_status(StatusCode::UNPROCESSABLE_ENTITY, m()),
            AlpacaError::Unprocessable("boom".into())
        );
        assert_eq!(
            AlpacaError::from_status(StatusCode::TOO_MANY_REQUESTS, m()),
            AlpacaError::RateLimited
        );
        assert!(matches!(
            AlpacaError::from_status(StatusCode::BAD_GATEWAY, m()),
            AlpacaError::Server { status: 502, .. }
        ));
        assert!(matches!(
            AlpacaError::from_status(StatusCode::BAD_REQUEST, m()),
            AlpacaError::Http { status: 400, .. }
        ));
    }

    #[test]
    fn broker_error_mapping() {
        let auth: BrokerError = AlpacaError::AuthenticationFailed {
            status: 401,
            message: "bad key".into(),
        }
        .into();
        assert!(auth.is_unauthenticated());

        let rejected: BrokerError = AlpacaError::Unprocessable("insufficient qty".into()).into();
        assert_eq!(rejected, BrokerError::Rejected("insufficient qty".into()));

        let down: BrokerError = AlpacaError::Network("connection refused".into()).into();
        assert!(matches!(down, BrokerError::Unavailable(_)));

        let bad: BrokerError = AlpacaError::JsonParse("eof".into()).into();
        assert!(matches!(bad, BrokerError::Malformed(_)));
    }

    #[test]
    fn market_data_error_mapping() {
        assert_eq!(
            into_market_data_error(AlpacaError::NotFound("x".into()), "AAPL"),
            MarketDataError::NotFound {
                ticker: "AAPL".into()
            }
        );
        assert_eq!(
            into_market_data_error(AlpacaError::RateLimited, "AAPL"),
            MarketDataError::RateLimited
        );
        assert!(matches!(
            into_market_data_error(
                AlpacaError::Server {
                    status: 503,
                    message: String::new()
                },
                "AAPL"
            ),
            MarketDataError::Unavailable(_)
        ));
    }
}
