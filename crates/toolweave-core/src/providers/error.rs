//! Provider error types

use thiserror::Error;

/// Errors raised while talking to a model
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key is required for {provider}")]
    MissingApiKey { provider: String },

    #[error("{provider} API error ({status}): {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    /// A scripted or injected failure
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify a failure reported by the genai client.
    ///
    /// genai flattens HTTP failures into its own error text, so the status
    /// is recovered from the message when present.
    pub fn from_genai(provider: impl Into<String>, error: &genai::Error) -> Self {
        let provider = provider.into();
        let message = error.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("429") || lowered.contains("rate limit") {
            Self::rate_limited(provider, message)
        } else if lowered.contains("401") || lowered.contains("api key") {
            Self::api_error(provider, 401, message)
        } else {
            Self::api_error(provider, 500, message)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ProviderError::api_error("openai", 503, "unavailable");
        assert_eq!(err.to_string(), "openai API error (503): unavailable");
        assert!(!err.is_cancelled());
        assert!(ProviderError::Cancelled.is_cancelled());
    }
}
