use std::fmt;

/// Classified provider error — tells the caller *why* the LLM call failed
/// so the turn can report a stable error code to the client.
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Seconds to wait before retrying (from 429 Retry-After header or body).
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403 — bad API key or permissions.
    Auth,
    /// 402 — billing/quota exhausted.
    Billing,
    /// 429 — rate limited; check retry_after_secs.
    RateLimit,
    /// 404 or "model not found" — bad model name.
    NotFound,
    /// 408, request timeout, or provider took too long.
    Timeout,
    /// Connection refused, DNS failure, reset, etc.
    Network,
    /// 500/502/503/504 — provider-side outage.
    ServerError,
    /// Anything else.
    Unknown,
}

impl ProviderError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            402 => ProviderErrorKind::Billing,
            404 => ProviderErrorKind::NotFound,
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimit,
            500 | 502 | 503 | 504 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Unknown,
        };

        let retry_after_secs = if kind == ProviderErrorKind::RateLimit {
            extract_retry_after(body)
        } else {
            None
        };

        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
            retry_after_secs,
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Network
        };
        Self {
            kind,
            status: None,
            message: err.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            status: None,
            message: format!("no response from model within {}s", secs),
            retry_after_secs: None,
        }
    }

    /// Stable machine-readable code carried on the turn's error frame.
    pub fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Auth => "upstream_auth",
            ProviderErrorKind::Billing => "upstream_billing",
            ProviderErrorKind::RateLimit => "upstream_rate_limited",
            ProviderErrorKind::NotFound => "upstream_model_not_found",
            ProviderErrorKind::Timeout => "upstream_timeout",
            ProviderErrorKind::Network | ProviderErrorKind::ServerError => "upstream_unavailable",
            ProviderErrorKind::Unknown => "upstream_error",
        }
    }

    /// User-facing summary suitable for an error frame message.
    pub fn user_message(&self) -> String {
        match self.kind {
            ProviderErrorKind::Auth => {
                "LLM API authentication failed. Check your API key.".to_string()
            }
            ProviderErrorKind::Billing => {
                "LLM API billing error — your account quota may be exhausted.".to_string()
            }
            ProviderErrorKind::RateLimit => {
                if let Some(secs) = self.retry_after_secs {
                    format!("Rate limited by the model provider. Try again in {}s.", secs)
                } else {
                    "Rate limited by the model provider. Try again shortly.".to_string()
                }
            }
            ProviderErrorKind::NotFound => {
                "Model not found. Check the configured model name.".to_string()
            }
            ProviderErrorKind::Timeout => "LLM request timed out.".to_string(),
            ProviderErrorKind::Network => {
                "Cannot reach the LLM provider (network error).".to_string()
            }
            ProviderErrorKind::ServerError => {
                "The LLM provider is experiencing issues (server error).".to_string()
            }
            ProviderErrorKind::Unknown => format!("LLM error: {}", self.message),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "Provider error ({}, {:?}): {}", status, self.kind, self.message)
        } else {
            write!(f, "Provider error ({:?}): {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

/// Try to parse retry_after from a JSON response body.
/// Handles: {"error": {"retry_after": 5}} and {"retry_after": 5}
fn extract_retry_after(body: &str) -> Option<u64> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v["error"]["retry_after"]
        .as_u64()
        .or_else(|| v["retry_after"].as_u64())
        .or_else(|| {
            // Some providers use a float
            v["error"]["retry_after"]
                .as_f64()
                .or_else(|| v["retry_after"].as_f64())
                .map(|f| f.ceil() as u64)
        })
}

fn truncate_body(body: &str) -> String {
    if body.len() > 300 {
        format!("{}...", crate::providers::truncate_utf8(body, 300))
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(401, "").kind, ProviderErrorKind::Auth);
        assert_eq!(ProviderError::from_status(402, "").kind, ProviderErrorKind::Billing);
        assert_eq!(ProviderError::from_status(404, "").kind, ProviderErrorKind::NotFound);
        assert_eq!(ProviderError::from_status(429, "").kind, ProviderErrorKind::RateLimit);
        assert_eq!(ProviderError::from_status(503, "").kind, ProviderErrorKind::ServerError);
        assert_eq!(ProviderError::from_status(418, "").kind, ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ProviderError::from_status(401, "").code(), "upstream_auth");
        assert_eq!(ProviderError::from_status(429, "").code(), "upstream_rate_limited");
        assert_eq!(ProviderError::from_status(404, "").code(), "upstream_model_not_found");
        assert_eq!(ProviderError::from_status(500, "").code(), "upstream_unavailable");
        assert_eq!(ProviderError::timeout(120).code(), "upstream_timeout");
    }

    #[test]
    fn test_retry_after_extracted_from_body() {
        let err = ProviderError::from_status(429, r#"{"error": {"retry_after": 7}}"#);
        assert_eq!(err.retry_after_secs, Some(7));
        let err = ProviderError::from_status(429, r#"{"retry_after": 2.5}"#);
        assert_eq!(err.retry_after_secs, Some(3));
    }

    #[test]
    fn test_long_bodies_truncated() {
        let body = "x".repeat(1000);
        let err = ProviderError::from_status(500, &body);
        assert!(err.message.len() < 400);
        assert!(err.message.ends_with("..."));
    }

    #[test]
    fn test_multibyte_bodies_truncated_on_char_boundary() {
        // 1 + 150*3 = 451 bytes; byte 300 lands inside a '€'.
        let body = format!("a{}", "€".repeat(150));
        let err = ProviderError::from_status(500, &body);
        assert!(err.message.ends_with("..."));
        assert!(err.message.len() <= 303);
        assert!(err.message.starts_with("a€"));
    }
}
