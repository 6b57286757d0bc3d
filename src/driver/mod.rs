//! Browser driver collaborator.
//!
//! The engine never talks to a browser directly; it goes through the
//! [`PageDriver`] trait so the page-interaction surface stays swappable and
//! testable. Element lookups return explicit results: "maybe this control
//! exists" is ordinary branching for the caller, never exception-driven
//! control flow.

mod chrome;

pub use chrome::{ChromeDriver, ChromeProvider};

use crate::errors::BotError;
use crate::model::RunConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Minimal page capability surface required by the engine.
///
/// All calls may fail transiently; the cycle executor maps those faults into
/// cycle outcomes, the outer loop decides retry policy.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BotError>;

    /// Full page reload, used to clear accumulated stale state.
    async fn refresh(&self) -> Result<(), BotError>;

    /// Whether a selector currently matches anything on the page.
    async fn exists(&self, selector: &str) -> Result<bool, BotError>;

    /// Whether the matched element is enabled. `ElementMissing` if absent.
    async fn is_enabled(&self, selector: &str) -> Result<bool, BotError>;

    async fn click(&self, selector: &str) -> Result<(), BotError>;

    /// Clear the matched input and type `text` into it.
    async fn clear_and_type(&self, selector: &str, text: &str) -> Result<(), BotError>;

    /// Visible text of the matched element. `ElementMissing` if absent.
    async fn read_text(&self, selector: &str) -> Result<String, BotError>;

    /// Tear the browser down. Idempotent: closing twice, or a driver that
    /// already failed, is a no-op.
    async fn close(&self) -> Result<(), BotError>;
}

/// Factory for session drivers, so the orchestrator can be exercised in
/// tests without a real browser.
#[async_trait]
pub trait DriverProvider: Send + Sync {
    async fn launch(&self, cfg: &RunConfig) -> Result<Arc<dyn PageDriver>, BotError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub(crate) struct FakeElement {
        pub enabled: bool,
        pub text: String,
    }

    /// Scripted in-memory page: selector -> element state.
    #[derive(Default)]
    pub(crate) struct FakeDriver {
        elements: Mutex<HashMap<String, FakeElement>>,
        pub clicks: Mutex<Vec<String>>,
        pub typed: Mutex<Vec<(String, String)>>,
        pub navigations: Mutex<Vec<String>>,
        pub refreshes: AtomicU32,
        pub closes: AtomicU32,
    }

    impl FakeDriver {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn put(&self, selector: &str, enabled: bool, text: &str) {
            self.elements.lock().unwrap().insert(
                selector.to_string(),
                FakeElement {
                    enabled,
                    text: text.to_string(),
                },
            );
        }

        pub fn remove(&self, selector: &str) {
            self.elements.lock().unwrap().remove(selector);
        }

        pub fn refresh_count(&self) -> u32 {
            self.refreshes.load(Ordering::Relaxed)
        }

        pub fn close_count(&self) -> u32 {
            self.closes.load(Ordering::Relaxed)
        }

        fn get(&self, selector: &str) -> Option<FakeElement> {
            self.elements.lock().unwrap().get(selector).cloned()
        }
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        async fn navigate(&self, url: &str) -> Result<(), BotError> {
            self.navigations.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn refresh(&self) -> Result<(), BotError> {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn exists(&self, selector: &str) -> Result<bool, BotError> {
            Ok(self.get(selector).is_some())
        }

        async fn is_enabled(&self, selector: &str) -> Result<bool, BotError> {
            self.get(selector)
                .map(|e| e.enabled)
                .ok_or_else(|| BotError::missing(selector))
        }

        async fn click(&self, selector: &str) -> Result<(), BotError> {
            if self.get(selector).is_none() {
                return Err(BotError::missing(selector));
            }
            self.clicks.lock().unwrap().push(selector.to_string());
            Ok(())
        }

        async fn clear_and_type(&self, selector: &str, text: &str) -> Result<(), BotError> {
            if self.get(selector).is_none() {
                return Err(BotError::missing(selector));
            }
            self.typed
                .lock()
                .unwrap()
                .push((selector.to_string(), text.to_string()));
            Ok(())
        }

        async fn read_text(&self, selector: &str) -> Result<String, BotError> {
            self.get(selector)
                .map(|e| e.text)
                .ok_or_else(|| BotError::missing(selector))
        }

        async fn close(&self) -> Result<(), BotError> {
            self.closes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one shared `FakeDriver` and counts launches.
    pub(crate) struct FakeProvider {
        pub driver: Arc<FakeDriver>,
        pub launches: AtomicU32,
        pub fail_launch: AtomicBool,
    }

    impl FakeProvider {
        pub fn new(driver: Arc<FakeDriver>) -> Arc<Self> {
            Arc::new(Self {
                driver,
                launches: AtomicU32::new(0),
                fail_launch: AtomicBool::new(false),
            })
        }

        pub fn launch_count(&self) -> u32 {
            self.launches.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl DriverProvider for FakeProvider {
        async fn launch(&self, _cfg: &RunConfig) -> Result<Arc<dyn PageDriver>, BotError> {
            if self.fail_launch.load(Ordering::Relaxed) {
                return Err(BotError::DriverInit("no browser binary".into()));
            }
            self.launches.fetch_add(1, Ordering::Relaxed);
            Ok(self.driver.clone())
        }
    }
}
