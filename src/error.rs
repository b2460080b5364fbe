use std::time::Duration;

use thiserror::Error;

/// Custom error types for better error handling
#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("Timeout: Request took longer than {0} seconds")]
    Timeout(u64),
    #[error("Giving up on {url} after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ScraperError>,
    },
    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Invalid recipe: {0}")]
    Recipe(String),
    #[error("Login failed: {0}")]
    Login(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Output channel closed before the crawl finished")]
    OutputClosed,
}

impl ScraperError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            // A connection dropped mid-body surfaces as a body or decode error.
            ScraperError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            ScraperError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            ScraperError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScraperError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T, E = ScraperError> = std::result::Result<T, E>;
