use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{PageResponse, Session, SessionHost, SessionLauncher, status_text};
use crate::config::SessionConfig;
use crate::plugins::traits::StockProvider;
use crate::utils::error::{FetchError, SessionError};

// Navigation entry of the current document; missing on about:blank and on some error pages.
const RESPONSE_STATUS_SCRIPT: &str =
    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0";

/// Launches one headless Chrome process per check pass.
pub struct ChromeLauncher {
    config: SessionConfig,
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(config: SessionConfig, navigation_timeout: Duration) -> Self {
        Self {
            config,
            navigation_timeout,
        }
    }
}

fn launch_browser(config: &SessionConfig) -> Result<Browser, SessionError> {
    let args: Vec<&OsStr> = config.chrome_args.iter().map(OsStr::new).collect();

    let mut launch_options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .args(args)
        .build()
        .map_err(|e| SessionError::Launch(format!("Failed to create launch options: {}", e)))?;

    if let Some(chrome_path) = &config.chrome_path {
        launch_options.path = Some(PathBuf::from(chrome_path));
    }

    Browser::new(launch_options).map_err(|e| SessionError::Launch(e.to_string()))
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn SessionHost>, SessionError> {
        let config = self.config.clone();
        let browser = tokio::task::spawn_blocking(move || launch_browser(&config))
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))??;

        tracing::debug!("Launched headless Chrome");
        Ok(Box::new(ChromeHost {
            browser: Mutex::new(Some(browser)),
            user_agent: self.config.user_agent.clone(),
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

pub struct ChromeHost {
    // Taken on close; dropping the browser kills the process.
    browser: Mutex<Option<Browser>>,
    user_agent: String,
    navigation_timeout: Duration,
}

impl ChromeHost {
    fn browser(&self) -> Result<Browser, SessionError> {
        self.browser
            .lock()
            .map_err(|_| SessionError::Launch("browser lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| SessionError::Launch("browser already closed".to_string()))
    }
}

#[async_trait]
impl SessionHost for ChromeHost {
    async fn open_session(&self, provider: &dyn StockProvider) -> Result<Arc<dyn Session>, SessionError> {
        let browser = self.browser()?;
        let user_agent = self.user_agent.clone();
        let navigation_timeout = self.navigation_timeout;
        let provider_id = provider.id().to_string();

        let open_error = |message: String| SessionError::Open {
            provider: provider_id.clone(),
            message,
        };

        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(navigation_timeout);
            tab.set_user_agent(&user_agent, None, None)?;
            Ok(tab)
        })
        .await
        .map_err(|e| open_error(e.to_string()))?
        .map_err(|e| open_error(format!("{:#}", e)))?;

        tracing::debug!("Opened Chrome tab for {}", provider_id);
        Ok(Arc::new(ChromeSession::new(tab, navigation_timeout)))
    }

    async fn close(&self) -> Result<(), SessionError> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| SessionError::Close("browser lock poisoned".to_string()))?
            .take();

        if let Some(browser) = browser {
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| SessionError::Close(e.to_string()))?;
        }
        Ok(())
    }
}

/// One browser tab bound to a provider.
///
/// The tab is driven through blocking calls, so a fetch owns it until its blocking work has
/// really ended, even when the caller gave up on the fetch earlier.
pub struct ChromeSession {
    tab: Arc<Tab>,
    busy: Arc<tokio::sync::Mutex<()>>,
    budget: Duration,
}

impl ChromeSession {
    fn new(tab: Arc<Tab>, attempt_timeout: Duration) -> Self {
        Self {
            tab,
            busy: Arc::new(tokio::sync::Mutex::new(())),
            // Leaves the caller's attempt timeout room to see the cleanup finish.
            budget: attempt_timeout * 4 / 5,
        }
    }
}

/// Time left before `deadline`, or a timeout once it has passed.
fn remaining(deadline: Instant, budget: Duration) -> Result<Duration, FetchError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(FetchError::Timeout {
            timeout_ms: budget.as_millis() as u64,
        })
    } else {
        Ok(left)
    }
}

/// Runs `on_cancel` on a blocking thread when dropped while armed.
struct CancelOnDrop<C: FnOnce() + Send + 'static>(Option<C>);

impl<C: FnOnce() + Send + 'static> CancelOnDrop<C> {
    fn disarm(&mut self) -> Option<C> {
        self.0.take()
    }
}

impl<C: FnOnce() + Send + 'static> Drop for CancelOnDrop<C> {
    fn drop(&mut self) {
        if let Some(on_cancel) = self.0.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn_blocking(on_cancel);
            }
        }
    }
}

/// Run blocking tab `work` against a shared deadline `budget` from now.
///
/// `busy` is held until `work` returns, so an abandoned fetch keeps later fetches off the tab
/// until it is done. On overrun `on_cancel` interrupts the tab and the work is awaited before
/// the timeout is reported; if the caller drops the future instead, `on_cancel` still runs.
async fn run_bounded<T, W, C>(
    busy: &Arc<tokio::sync::Mutex<()>>,
    budget: Duration,
    work: W,
    on_cancel: C,
) -> Result<T, FetchError>
where
    T: Send + 'static,
    W: FnOnce(Instant) -> Result<T, FetchError> + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let permit = Arc::clone(busy).lock_owned().await;
    let deadline = Instant::now() + budget;
    let mut handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work(deadline)
    });
    let mut cancel = CancelOnDrop(Some(on_cancel));

    match tokio::time::timeout(budget, &mut handle).await {
        Ok(joined) => {
            cancel.disarm();
            joined.map_err(|e| FetchError::SessionLost(e.to_string()))?
        }
        Err(_) => {
            if let Some(on_cancel) = cancel.disarm() {
                let _ = tokio::task::spawn_blocking(on_cancel).await;
            }
            let _ = handle.await;
            Err(FetchError::Timeout {
                timeout_ms: budget.as_millis() as u64,
            })
        }
    }
}

fn navigation_error(error: anyhow::Error) -> FetchError {
    let message = error.to_string();
    if message.contains("connection is closed") || message.contains("No target with given id") {
        FetchError::SessionLost(message)
    } else if message.to_lowercase().contains("timed out") {
        FetchError::transport("NavigationTimeout", message)
    } else {
        FetchError::transport("NavigationError", message)
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        let tab = Arc::clone(&self.tab);
        let interrupted = Arc::clone(&self.tab);
        let url = url.to_string();
        let budget = self.budget;

        let work = move |deadline: Instant| -> Result<(u16, String), FetchError> {
            // Every blocking call gets only what is left of the shared deadline.
            tab.set_default_timeout(remaining(deadline, budget)?);
            tab.navigate_to(&url).map_err(navigation_error)?;
            tab.set_default_timeout(remaining(deadline, budget)?);
            tab.wait_until_navigated().map_err(navigation_error)?;

            tab.set_default_timeout(remaining(deadline, budget)?);
            let body = tab.get_content().map_err(navigation_error)?;
            let status = tab
                .evaluate(RESPONSE_STATUS_SCRIPT, false)
                .map_err(navigation_error)?
                .value
                .and_then(|value| value.as_u64())
                .and_then(|value| u16::try_from(value).ok())
                .filter(|status| *status != 0)
                .unwrap_or(200);

            Ok((status, body))
        };
        let on_cancel = move || {
            if let Err(e) = interrupted.stop_loading() {
                tracing::debug!("Could not stop page load: {}", e);
            }
        };

        let (status, body) = run_bounded(&self.busy, budget, work, on_cancel).await?;

        Ok(PageResponse {
            status,
            status_text: status_text(status),
            body,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        // Wait out any abandoned fetch still driving the tab.
        let _idle = self.busy.lock().await;
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.close(true))
            .await
            .map_err(|e| SessionError::Close(e.to_string()))?
            .map_err(|e| SessionError::Close(e.to_string()))?;
        Ok(())
    }
}
