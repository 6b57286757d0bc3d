//! Chromium-backed implementation of [`PageDriver`] via the DevTools
//! protocol.

use super::{DriverProvider, PageDriver};
use crate::errors::BotError;
use crate::model::RunConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Fixed window size; the target page lays out its service grid for roughly
/// this geometry.
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 700;

pub struct ChromeDriver {
    // Taken exactly once by `close`; `None` afterwards makes teardown a no-op.
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
}

impl ChromeDriver {
    /// Launch a fresh browser with notification/popup suppression and open
    /// one page. Any failure here is `DriverInit`: fatal for the session,
    /// reported rather than retried.
    pub async fn launch(cfg: &RunConfig) -> Result<Self, BotError> {
        let executable = match cfg.browser_path.clone() {
            Some(p) => p,
            None => find_chrome().ok_or_else(|| {
                BotError::DriverInit(
                    "Chrome/Chromium not found; install it or pass --browser".into(),
                )
            })?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .arg("--disable-notifications")
            .arg("--disable-popup-blocking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !cfg.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| BotError::DriverInit(format!("bad browser config: {e}")))?;

        info!(executable = %executable.display(), headless = cfg.headless, "launching browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BotError::DriverInit(e.to_string()))?;

        // The handler is the CDP message pump; the connection stalls unless
        // it is polled for the lifetime of the browser.
        let handler_task = tokio::spawn(async move {
            while let Some(res) = handler.next().await {
                if let Err(e) = res {
                    debug!("cdp handler: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BotError::DriverInit(e.to_string()))?;

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
        })
    }

    fn interaction(e: impl std::fmt::Display) -> BotError {
        BotError::Interaction(e.to_string())
    }

    /// JSON-quote a selector for embedding in an evaluated expression.
    fn quoted(selector: &str) -> Result<String, BotError> {
        serde_json::to_string(selector).map_err(Self::interaction)
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), BotError> {
        debug!(url, "navigate");
        self.page.goto(url).await.map_err(Self::interaction)?;
        // Best effort: the page may have finished loading already.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn refresh(&self) -> Result<(), BotError> {
        debug!("refresh");
        self.page.reload().await.map_err(Self::interaction)?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool, BotError> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn is_enabled(&self, selector: &str) -> Result<bool, BotError> {
        let q = Self::quoted(selector)?;
        let expr = format!(
            "(() => {{ const el = document.querySelector({q}); \
             if (!el) return null; \
             return !el.disabled && !el.classList.contains('disabled'); }})()"
        );
        let res = self.page.evaluate(expr).await.map_err(Self::interaction)?;
        match res.value().and_then(|v| v.as_bool()) {
            Some(enabled) => Ok(enabled),
            None => Err(BotError::missing(selector)),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BotError> {
        debug!(selector, "click");
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BotError::missing(selector))?;
        el.click().await.map_err(Self::interaction)?;
        Ok(())
    }

    async fn clear_and_type(&self, selector: &str, text: &str) -> Result<(), BotError> {
        debug!(selector, "clear_and_type");
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BotError::missing(selector))?;
        el.click().await.map_err(Self::interaction)?;
        let q = Self::quoted(selector)?;
        let expr =
            format!("(() => {{ const el = document.querySelector({q}); if (el) el.value = ''; }})()");
        self.page.evaluate(expr).await.map_err(Self::interaction)?;
        el.type_str(text).await.map_err(Self::interaction)?;
        Ok(())
    }

    async fn read_text(&self, selector: &str) -> Result<String, BotError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BotError::missing(selector))?;
        let text = el.inner_text().await.map_err(Self::interaction)?;
        Ok(text.unwrap_or_default())
    }

    async fn close(&self) -> Result<(), BotError> {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            debug!("closing browser");
            if let Err(e) = browser.close().await {
                warn!("browser close: {e}");
            }
            let _ = browser.wait().await;
            self.handler_task.abort();
        }
        Ok(())
    }
}

/// Locate a Chrome/Chromium binary: `$PATH` first, then the usual install
/// locations.
fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(p) = which::which(name) {
            return Some(p);
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Launches real Chrome sessions for the orchestrator.
pub struct ChromeProvider;

#[async_trait]
impl DriverProvider for ChromeProvider {
    async fn launch(&self, cfg: &RunConfig) -> Result<Arc<dyn PageDriver>, BotError> {
        Ok(Arc::new(ChromeDriver::launch(cfg).await?))
    }
}
