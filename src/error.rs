use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Errors raised while authenticating, traversing the mailbox, or reporting
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned a non-success status not covered below
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed (secrets, consent, or an unusable stored credential)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - server asked us to wait `retry_after` seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// IO error (token file, config file, report output)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GmailError {
    /// Check if the error is transient and the request could succeed if repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded { .. }
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header is either delay-seconds ("120") or an HTTP-date
/// ("Wed, 21 Oct 2015 07:28:00 GMT"). Missing, invalid, or past values
/// fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|when| when.duration_since(std::time::SystemTime::now()).ok())
        .map(|wait| wait.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    // Expired or revoked grants surface as 401 from the API
                    401 => GmailError::AuthError(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => {
                GmailError::AuthError(format!("No access token available: {}", err))
            }
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let rate_limit = GmailError::RateLimitExceeded { retry_after: 5 };
        assert!(rate_limit.is_transient());
        assert!(!rate_limit.is_permanent());

        let server_error = GmailError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let network_error = GmailError::NetworkError("Connection timeout".to_string());
        assert!(network_error.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(GmailError::BadRequest("Invalid page token".to_string()).is_permanent());
        assert!(GmailError::MessageNotFound("msg123".to_string()).is_permanent());
        assert!(GmailError::Forbidden("Access denied".to_string()).is_permanent());
        assert!(GmailError::AuthError("consent denied".to_string()).is_permanent());
        assert!(GmailError::ConfigError("bad".to_string()).is_permanent());
    }

    #[test]
    fn test_error_display() {
        let error = GmailError::RateLimitExceeded { retry_after: 10 };
        let display = format!("{}", error);
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let auth_error = GmailError::AuthError("Invalid token".to_string());
        assert!(auth_error.to_string().contains("Authentication failed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "token.json");
        let error: GmailError = io.into();
        assert!(matches!(error, GmailError::IoError(_)));
        assert!(error.is_permanent());
    }

    #[test]
    fn test_parse_retry_after_header_integer() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("120"),
        );

        assert_eq!(parse_retry_after_header(&response), 120);
    }

    #[test]
    fn test_parse_retry_after_header_missing() {
        let response = hyper::Response::builder().status(429).body(()).unwrap();
        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_invalid() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("invalid"),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        let future_time = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(future_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        let retry_after = parse_retry_after_header(&response);
        // HTTP-dates have one second resolution
        assert!(
            (58..=61).contains(&retry_after),
            "Expected ~60, got {}",
            retry_after
        );
    }

    #[test]
    fn test_parse_retry_after_header_past_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        let past_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(past_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }
}
