use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use super::{PageResponse, Session, SessionHost, SessionLauncher, status_text};
use crate::plugins::traits::StockProvider;
use crate::utils::error::{FetchError, SessionError};

/// Plain HTTP backend: one shared client, a browser-like header set per provider.
pub struct HttpLauncher {
    user_agent: String,
    request_timeout: Duration,
}

impl HttpLauncher {
    pub fn new(user_agent: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl SessionLauncher for HttpLauncher {
    async fn launch(&self) -> Result<Box<dyn SessionHost>, SessionError> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        Ok(Box::new(HttpHost {
            client,
            user_agent: self.user_agent.clone(),
        }))
    }
}

pub struct HttpHost {
    client: Client,
    user_agent: String,
}

/// Headers a desktop browser would send navigating to a product page from the retailer's site.
pub fn browser_headers(user_agent: &str, referer: &str) -> Result<HeaderMap, header::InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-AU,en;q=0.9"));
    headers.insert(header::REFERER, HeaderValue::from_str(referer)?);
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    Ok(headers)
}

#[async_trait]
impl SessionHost for HttpHost {
    async fn open_session(&self, provider: &dyn StockProvider) -> Result<Arc<dyn Session>, SessionError> {
        let headers = browser_headers(&self.user_agent, provider.base_url()).map_err(|e| SessionError::Open {
            provider: provider.id().to_string(),
            message: e.to_string(),
        })?;

        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            headers,
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

pub struct HttpSession {
    client: Client,
    headers: HeaderMap,
}

fn request_error(error: reqwest::Error) -> FetchError {
    let kind = if error.is_timeout() {
        "TimeoutError"
    } else if error.is_connect() {
        "ConnectError"
    } else if error.is_redirect() {
        "RedirectError"
    } else if error.is_body() || error.is_decode() {
        "BodyError"
    } else {
        "RequestError"
    };
    FetchError::transport(kind, error.to_string())
}

#[async_trait]
impl Session for HttpSession {
    async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;

        Ok(PageResponse {
            status,
            status_text: status_text(status),
            body,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}
