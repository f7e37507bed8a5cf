use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Check error: {0}")]
    Check(#[from] CheckError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Failures acquiring or releasing provider sessions. All of these are cycle-wide.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("timeout of {timeout_ms}ms exceeded opening sessions")]
    Timeout { timeout_ms: u64 },

    #[error("failed to launch session host: {0}")]
    Launch(String),

    #[error("failed to open session for provider {provider}: {message}")]
    Open { provider: String, message: String },

    #[error("failed to close session: {0}")]
    Close(String),
}

/// Outcome of a single failed fetch attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Timeout: no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{kind}: {message}")]
    Transport { kind: String, message: String },

    #[error("{code} {text}")]
    Status { code: u16, text: String },

    #[error("SessionLost: {0}")]
    SessionLost(String),
}

impl FetchError {
    pub fn transport(kind: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Transport {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Only a dropped session is fatal to the check pass; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::SessionLost(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("session for provider {provider} was lost: {message}")]
    SessionLost { provider: String, message: String },
}

/// Errors reported by the SMS provider.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{operation} rejected with status {status}: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("lookup of {phone} failed: {source}")]
    Lookup {
        phone: String,
        #[source]
        source: GatewayError,
    },

    #[error("pricing for country {country_code} failed: {source}")]
    Pricing {
        country_code: String,
        #[source]
        source: GatewayError,
    },

    #[error("no mobile price for {phone} (country {country_code}, carrier {mcc}/{mnc})")]
    PriceUnavailable {
        phone: String,
        country_code: String,
        mcc: String,
        mnc: String,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
