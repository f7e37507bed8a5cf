//! Provider sessions: one communication channel per provider, opened for a check pass and
//! released afterwards no matter how the pass ended.

pub mod chrome;
pub mod http;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

use crate::plugins::manager::StockProviderRef;
use crate::plugins::traits::StockProvider;
use crate::utils::error::{FetchError, SessionError};

pub use chrome::ChromeLauncher;
pub use http::HttpLauncher;

/// A completed page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl PageResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reason phrase for a status code, empty when unknown.
pub fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

/// A provider-scoped channel used to load product pages.
#[async_trait]
pub trait Session: Send + Sync {
    /// Load a page. Cancellation is the caller's job: dropping the future abandons the load.
    async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError>;

    async fn close(&self) -> Result<(), SessionError>;
}

/// The parent resource sessions are opened from (a browser process, an HTTP client).
#[async_trait]
pub trait SessionHost: Send + Sync {
    async fn open_session(&self, provider: &dyn StockProvider) -> Result<Arc<dyn Session>, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn SessionHost>, SessionError>;
}

pub struct SessionManager {
    launcher: Arc<dyn SessionLauncher>,
    setup_timeout: Duration,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn SessionLauncher>, setup_timeout: Duration) -> Self {
        Self {
            launcher,
            setup_timeout,
        }
    }

    /// Launch the host and open one session per provider, all within a single shared deadline.
    ///
    /// On timeout or any open failure everything opened so far is closed, the host included,
    /// before the error is returned.
    pub async fn acquire_all(&self, providers: &[StockProviderRef]) -> Result<SessionSet, SessionError> {
        let deadline = Instant::now() + self.setup_timeout;
        let timeout_error = SessionError::Timeout {
            timeout_ms: self.setup_timeout.as_millis() as u64,
        };

        tracing::info!("Opening sessions for {} providers", providers.len());
        let host = match timeout_at(deadline, self.launcher.launch()).await {
            Ok(host) => host?,
            Err(_) => return Err(timeout_error),
        };

        let mut set = SessionSet {
            host,
            sessions: HashMap::new(),
        };

        for provider in providers {
            let failure = match timeout_at(deadline, set.host.open_session(provider.as_ref())).await {
                Ok(Ok(session)) => {
                    set.sessions.insert(provider.id().to_string(), session);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => timeout_error.clone(),
            };

            tracing::error!("Could not open session for {}: {}", provider.id(), failure);
            set.release_all().await;
            return Err(failure);
        }

        Ok(set)
    }
}

/// Open sessions keyed by provider id, plus the host that owns them.
pub struct SessionSet {
    host: Box<dyn SessionHost>,
    sessions: HashMap<String, Arc<dyn Session>>,
}

impl SessionSet {
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.get(provider_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session, then the host. Failures are logged and skipped; returns how many
    /// closes failed.
    pub async fn release_all(self) -> usize {
        let mut failures = 0;

        for (provider_id, session) in self.sessions {
            if let Err(e) = session.close().await {
                failures += 1;
                tracing::warn!("Error closing session for {}: {}", provider_id, e);
            }
        }

        if let Err(e) = self.host.close().await {
            failures += 1;
            tracing::warn!("Error closing session host: {}", e);
        }

        tracing::info!("Released provider sessions");
        failures
    }
}
