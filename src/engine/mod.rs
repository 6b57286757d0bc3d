//! Bot engine: one session from gate wait to summary.
//!
//! The engine runs as a single spawned task that owns the page driver for
//! the whole run. It reports through the event channel and honors a shared
//! cancel flag; every long wait is decomposed into one-second increments so
//! a stop request interrupts within about a second.

mod cycle;
mod service_loop;

use crate::catalog;
use crate::driver::PageDriver;
use crate::errors::BotError;
use crate::model::{BotEvent, LogLevel, Phase, RunConfig, RunSummary, ServiceStatus};
use anyhow::{Context, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Poll step while waiting for an element to appear.
const ELEMENT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Cancel the session entirely.
    Cancel,
}

pub struct BotEngine {
    cfg: RunConfig,
}

impl BotEngine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    pub async fn run(
        self,
        driver: Arc<dyn PageDriver>,
        event_tx: mpsc::UnboundedSender<BotEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<RunSummary> {
        let cancel = Arc::new(AtomicBool::new(false));

        // Control listener.
        let cancel2 = cancel.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Cancel => {
                        cancel2.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        });

        let res = self.drive(driver.as_ref(), &event_tx, &cancel).await;

        // Dropping the JoinHandle does not stop the task; abort it so it is
        // not left waiting on the control channel after the run ends.
        control_handle.abort();

        res
    }

    async fn drive(
        &self,
        driver: &dyn PageDriver,
        event_tx: &mpsc::UnboundedSender<BotEvent>,
        cancel: &AtomicBool,
    ) -> Result<RunSummary> {
        let cfg = &self.cfg;
        let mut selected = catalog::lookup(cfg.service)?;

        let _ = event_tx.send(BotEvent::PhaseChanged {
            phase: Phase::AwaitingGate,
        });
        log(event_tx, LogLevel::Info, format!("Opening {}", cfg.site_url));
        driver
            .navigate(&cfg.site_url)
            .await
            .context("failed to open target page")?;

        log(
            event_tx,
            LogLevel::Info,
            "Please complete the captcha in the browser window".into(),
        );
        match wait_for_selector(
            driver,
            catalog::GATE_INPUT_SELECTOR,
            cfg.gate_timeout,
            cancel,
        )
        .await
        {
            Ok(true) => log(
                event_tx,
                LogLevel::Info,
                "Captcha input field found. Please complete the captcha.".into(),
            ),
            Ok(false) => return self.finish(event_tx, cancelled_summary(cfg)),
            Err(_) => {
                log(
                    event_tx,
                    LogLevel::Error,
                    "Could not find captcha input. Please try again.".into(),
                );
                return Err(BotError::GateTimeout.into());
            }
        }

        // Poll until a human solves the gate. Bounded interval, cancellation
        // checked every tick, no overall timeout.
        loop {
            if cancel.load(Ordering::Relaxed) {
                return self.finish(event_tx, cancelled_summary(cfg));
            }
            if driver
                .exists(catalog::GATE_READY_SELECTOR)
                .await
                .unwrap_or(false)
            {
                log(
                    event_tx,
                    LogLevel::Info,
                    "Captcha completed successfully".into(),
                );
                break;
            }
            tokio::time::sleep(cfg.gate_poll_interval).await;
        }

        // Double refresh for stability before touching any service.
        for _ in 0..2 {
            if !sleep_cancellable(Duration::from_secs(2), cancel).await {
                return self.finish(event_tx, cancelled_summary(cfg));
            }
            driver.refresh().await.context("post-gate refresh failed")?;
        }

        let _ = event_tx.send(BotEvent::PhaseChanged {
            phase: Phase::Probing,
        });
        for mut svc in catalog::services() {
            svc.status = catalog::probe(driver, &svc).await;
            if svc.id == selected.id {
                selected.status = svc.status;
            }
            let _ = event_tx.send(BotEvent::ServiceProbed {
                id: svc.id,
                title: svc.title,
                status: svc.status,
            });
            log(
                event_tx,
                LogLevel::Info,
                format!("Service {} status: {}", svc.title, svc.status.label()),
            );
        }

        if selected.status != ServiceStatus::Working {
            log(
                event_tx,
                LogLevel::Error,
                format!(
                    "Selected service {} is offline; nothing to do",
                    selected.title
                ),
            );
            return self.finish(event_tx, RunSummary::new(cfg.service, &cfg.video_url));
        }

        let _ = event_tx.send(BotEvent::PhaseChanged {
            phase: Phase::Looping,
        });
        let policy = catalog::policy(cfg.service);
        let summary =
            service_loop::run(driver, cfg, &selected, &policy, event_tx, cancel).await?;

        self.finish(event_tx, summary)
    }

    fn finish(
        &self,
        event_tx: &mpsc::UnboundedSender<BotEvent>,
        summary: RunSummary,
    ) -> Result<RunSummary> {
        let _ = event_tx.send(BotEvent::PhaseChanged {
            phase: Phase::Stopping,
        });
        let _ = event_tx.send(BotEvent::RunCompleted {
            summary: Box::new(summary.clone()),
        });
        Ok(summary)
    }
}

fn cancelled_summary(cfg: &RunConfig) -> RunSummary {
    let mut summary = RunSummary::new(cfg.service, &cfg.video_url);
    summary.cancelled = true;
    summary
}

pub(crate) fn log(
    event_tx: &mpsc::UnboundedSender<BotEvent>,
    level: LogLevel,
    message: String,
) {
    debug!(?level, "{message}");
    let _ = event_tx.send(BotEvent::Log { level, message });
}

/// Sleep in increments of at most one second, checking the cancel flag
/// between increments. Returns false if cancelled before the full duration
/// elapsed.
pub(crate) async fn sleep_cancellable(duration: Duration, cancel: &AtomicBool) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(Duration::from_secs(1));
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    !cancel.load(Ordering::Relaxed)
}

/// Poll for a selector up to `timeout`. `Ok(true)` once present, `Ok(false)`
/// if cancelled first, `ElementMissing` when the timeout elapses. Never an
/// unbounded block.
pub(crate) async fn wait_for_selector(
    driver: &dyn PageDriver,
    selector: &str,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<bool, BotError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if driver.exists(selector).await.unwrap_or(false) {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(BotError::missing(selector));
        }
        tokio::time::sleep(ELEMENT_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::model::ServiceId;

    fn test_config(service: ServiceId) -> RunConfig {
        RunConfig {
            site_url: "https://zefoy.example".into(),
            video_url: "https://www.tiktok.com/@u/video/1".into(),
            service,
            max_attempts: 2,
            element_timeout: Duration::from_secs(15),
            gate_timeout: Duration::from_secs(30),
            gate_poll_interval: Duration::from_secs(1),
            headless: true,
            browser_path: None,
        }
    }

    /// Page state where the gate is already solved and every cycle confirms.
    fn ready_page(driver: &FakeDriver) {
        driver.put(catalog::GATE_INPUT_SELECTOR, true, "");
        driver.put(catalog::GATE_READY_SELECTOR, true, "");
        driver.put(cycle::CONTAINER_SELECTOR, true, "");
        driver.put(cycle::URL_INPUT_SELECTOR, true, "");
        driver.put(cycle::SUBMIT_SELECTOR, true, "");
        driver.put(cycle::CONFIRM_SELECTOR, true, "");
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_runs_to_attempt_budget() {
        let driver = FakeDriver::new();
        ready_page(&driver);

        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let engine = BotEngine::new(test_config(ServiceId::Views));
        let summary = engine.run(driver.clone(), evt_tx, ctrl_rx).await.unwrap();

        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.successes, 2);
        assert!(!summary.cancelled);

        let mut phases = Vec::new();
        while let Ok(ev) = evt_rx.try_recv() {
            if let BotEvent::PhaseChanged { phase } = ev {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                Phase::AwaitingGate,
                Phase::Probing,
                Phase::Looping,
                Phase::Stopping
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_gate_input_terminates_the_run() {
        let driver = FakeDriver::new();
        // No elements at all: the captcha input never shows up.
        let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
        let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let engine = BotEngine::new(test_config(ServiceId::Views));
        let err = engine.run(driver, evt_tx, ctrl_rx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BotError>(),
            Some(BotError::GateTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_selected_service_stops_before_looping() {
        let driver = FakeDriver::new();
        driver.put(catalog::GATE_INPUT_SELECTOR, true, "");
        driver.put(catalog::GATE_READY_SELECTOR, false, "");
        // Views trigger present but disabled; the engine must not submit.
        let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
        let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let engine = BotEngine::new(test_config(ServiceId::Views));
        let summary = engine.run(driver.clone(), evt_tx, ctrl_rx).await.unwrap();
        assert_eq!(summary.attempts, 0);
        assert!(driver.clicks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_cancellable_stops_within_one_increment() {
        let cancel = Arc::new(AtomicBool::new(false));
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                cancel.store(true, Ordering::Relaxed);
            })
        };

        let start = tokio::time::Instant::now();
        let completed = sleep_cancellable(Duration::from_secs(118), &cancel).await;
        canceller.await.unwrap();

        assert!(!completed);
        // 118s wait, cancel at t=2s: out by t=3s.
        assert!(start.elapsed() <= Duration::from_secs(3));
    }
}
