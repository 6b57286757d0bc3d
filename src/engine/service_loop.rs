//! The looping state: repeated cycles for one selected service.
//!
//! Bounded by the attempt budget, throttled by randomized jitter, and
//! punctuated by a full page reload after every N confirmed successes so
//! stale page state cannot pile up across a long run.

use super::{cycle, sleep_cancellable, wait_for_selector};
use crate::driver::PageDriver;
use crate::errors::BotError;
use crate::model::{
    BotEvent, CycleOutcome, LogLevel, RunConfig, RunSummary, Service, WaitPolicy,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Click the service trigger and wait for its submission container.
async fn acquire_container(
    driver: &dyn PageDriver,
    cfg: &RunConfig,
    service: &Service,
    cancel: &AtomicBool,
) -> Result<bool, BotError> {
    if !wait_for_selector(driver, service.trigger_selector, cfg.element_timeout, cancel).await? {
        return Ok(false);
    }
    driver.click(service.trigger_selector).await?;
    wait_for_selector(driver, cycle::CONTAINER_SELECTOR, cfg.element_timeout, cancel).await
}

/// Run cycles for `service` until cancelled or the attempt budget runs out.
pub(crate) async fn run(
    driver: &dyn PageDriver,
    cfg: &RunConfig,
    service: &Service,
    policy: &WaitPolicy,
    event_tx: &mpsc::UnboundedSender<BotEvent>,
    cancel: &AtomicBool,
) -> Result<RunSummary, BotError> {
    let mut summary = RunSummary::new(cfg.service, &cfg.video_url);

    if !acquire_container(driver, cfg, service, cancel).await? {
        summary.cancelled = true;
        return Ok(summary);
    }

    super::log(
        event_tx,
        LogLevel::Info,
        format!("Starting {} service for {}", service.title, cfg.video_url),
    );

    while !cancel.load(Ordering::Relaxed) && summary.attempts < cfg.max_attempts {
        let outcome = cycle::run_cycle(driver, &cfg.video_url, policy, event_tx).await;
        summary.attempts += 1;

        match &outcome {
            CycleOutcome::Confirmed => {
                summary.successes += 1;
                super::log(
                    event_tx,
                    LogLevel::Info,
                    format!(
                        "{} request sent successfully. Success count: {}",
                        service.title, summary.successes
                    ),
                );
            }
            CycleOutcome::MustWait(secs) => {
                summary.waits += 1;
                summary.wait_secs_total += secs;
                super::log(
                    event_tx,
                    LogLevel::Info,
                    format!("Waiting for {secs} seconds before next attempt"),
                );
            }
            CycleOutcome::Unknown => {
                super::log(
                    event_tx,
                    LogLevel::Error,
                    "No confirmation or wait message found".into(),
                );
            }
            CycleOutcome::Error(e) => {
                summary.errors += 1;
                super::log(event_tx, LogLevel::Error, format!("Cycle error: {e}"));
            }
        }
        let _ = event_tx.send(BotEvent::CycleFinished {
            attempt: summary.attempts,
            successes: summary.successes,
            outcome_kind: outcome.kind(),
        });

        // Outcome-specific pauses, each interruptible.
        let paused_through = match &outcome {
            CycleOutcome::Confirmed => true,
            CycleOutcome::MustWait(secs) => {
                sleep_cancellable(Duration::from_secs(*secs), cancel).await
            }
            CycleOutcome::Unknown | CycleOutcome::Error(_) => {
                sleep_cancellable(policy.recovery_delay, cancel).await
            }
        };
        if !paused_through {
            break;
        }

        // Exactly one reload per refresh_every confirmed successes, on the
        // iteration that reached the multiple.
        if matches!(outcome, CycleOutcome::Confirmed)
            && policy.refresh_every > 0
            && summary.successes % policy.refresh_every == 0
        {
            super::log(
                event_tx,
                LogLevel::Info,
                format!("Refreshing page after {} successes", summary.successes),
            );
            driver.refresh().await?;
            if !sleep_cancellable(Duration::from_secs(3), cancel).await {
                break;
            }
            if !acquire_container(driver, cfg, service, cancel).await? {
                break;
            }
        }

        if cancel.load(Ordering::Relaxed) {
            break;
        }

        // Randomized inter-attempt delay: throttles request rate and breaks
        // up detectable regularity.
        let jitter = {
            let mut rng = rand::thread_rng();
            rng.gen_range(policy.jitter_min.as_secs_f64()..=policy.jitter_max.as_secs_f64())
        };
        if !sleep_cancellable(Duration::from_secs_f64(jitter), cancel).await {
            break;
        }
    }

    summary.cancelled = cancel.load(Ordering::Relaxed);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::driver::fake::FakeDriver;
    use crate::model::ServiceId;
    use std::sync::Arc;

    fn test_config(max_attempts: u32) -> RunConfig {
        RunConfig {
            site_url: "https://zefoy.example".into(),
            video_url: "https://www.tiktok.com/@u/video/1".into(),
            service: ServiceId::Views,
            max_attempts,
            element_timeout: Duration::from_secs(15),
            gate_timeout: Duration::from_secs(30),
            gate_poll_interval: Duration::from_secs(1),
            headless: true,
            browser_path: None,
        }
    }

    /// Policy with no clamping, no settle delays and no jitter, so tests
    /// control timing precisely.
    fn bare_policy(refresh_every: u32) -> WaitPolicy {
        WaitPolicy {
            floor_secs: None,
            ceiling_secs: None,
            pre_submit: Duration::ZERO,
            post_submit: Duration::ZERO,
            confirm_delay: Duration::ZERO,
            recovery_delay: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            refresh_every,
        }
    }

    fn looping_page(driver: &FakeDriver, service: &Service) {
        driver.put(service.trigger_selector, true, "");
        driver.put(cycle::CONTAINER_SELECTOR, true, "");
        driver.put(cycle::URL_INPUT_SELECTOR, true, "");
        driver.put(cycle::SUBMIT_SELECTOR, true, "");
    }

    #[tokio::test(start_paused = true)]
    async fn one_reload_per_n_successes() {
        let driver = FakeDriver::new();
        let service = catalog::lookup(ServiceId::Views).unwrap();
        looping_page(&driver, &service);
        driver.put(cycle::CONFIRM_SELECTOR, true, "");

        let cfg = test_config(7);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = AtomicBool::new(false);
        let summary = run(
            driver.as_ref(),
            &cfg,
            &service,
            &bare_policy(3),
            &tx,
            &cancel,
        )
        .await
        .unwrap();

        // 7 confirmed successes with N=3: reloads after #3 and #6 only.
        assert_eq!(summary.successes, 7);
        assert_eq!(driver.refresh_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_count_every_outcome_and_stop_at_budget() {
        let driver = FakeDriver::new();
        let service = catalog::lookup(ServiceId::Views).unwrap();
        looping_page(&driver, &service);
        // Input missing: every cycle ends in an interaction error.
        driver.remove(cycle::URL_INPUT_SELECTOR);

        let cfg = test_config(5);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = AtomicBool::new(false);
        let summary = run(
            driver.as_ref(),
            &cfg,
            &service,
            &bare_policy(10),
            &tx,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(summary.attempts, 5);
        assert_eq!(summary.errors, 5);
        assert_eq!(summary.successes, 0);
        assert!(!summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_long_cooldown() {
        let driver = FakeDriver::new();
        let service = catalog::lookup(ServiceId::Views).unwrap();
        looping_page(&driver, &service);
        driver.put(cycle::WAIT_SPAN_SELECTOR, true, "Please wait 01:58");

        let cfg = test_config(100);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                cancel.store(true, Ordering::Relaxed);
            })
        };

        let start = tokio::time::Instant::now();
        let summary = run(
            driver.as_ref(),
            &cfg,
            &service,
            &bare_policy(10),
            &tx,
            cancel.as_ref(),
        )
        .await
        .unwrap();
        canceller.await.unwrap();

        // The 118-second cooldown is abandoned within one sleep increment.
        assert!(start.elapsed() <= Duration::from_secs(4));
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.waits, 1);
        assert!(summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_outcomes_are_all_counted() {
        let driver = FakeDriver::new();
        let service = catalog::lookup(ServiceId::Views).unwrap();
        looping_page(&driver, &service);
        // No confirm control and no wait span: every cycle is Unknown.

        let cfg = test_config(3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = AtomicBool::new(false);
        let summary = run(
            driver.as_ref(),
            &cfg,
            &service,
            &bare_policy(10),
            &tx,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.successes, 0);

        let mut finished = 0;
        while let Ok(ev) = rx.try_recv() {
            if let BotEvent::CycleFinished { outcome_kind, .. } = ev {
                assert_eq!(outcome_kind, "unknown");
                finished += 1;
            }
        }
        assert_eq!(finished, 3);
    }
}
