use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse toml: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelayError {
    /// Upstream HTTP status when the provider answered with a non-2xx response.
    pub fn api_status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.api_status() == Some(reqwest::StatusCode::UNAUTHORIZED)
    }

    /// A description safe to hand back to callers: never includes the
    /// provider's response body.
    pub fn public_message(&self) -> String {
        match self {
            Self::Api { status, .. } => {
                format!("Request failed with status code {}", status.as_u16())
            }
            Self::Http(err) if err.is_timeout() => "provider request timed out".to_string(),
            Self::Http(err) if err.is_connect() => "failed to connect to provider".to_string(),
            Self::Http(err) => match err.status() {
                Some(status) => format!("Request failed with status code {}", status.as_u16()),
                None => "provider request failed".to_string(),
            },
            Self::Json(_) | Self::InvalidResponse(_) => {
                "provider returned an invalid response".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
