//! Session lifecycle controller.
//!
//! Accepts UI commands, keeps at most one session task alive, and emits
//! events back to presentation layers.

use crate::driver::DriverProvider;
use crate::engine::{BotEngine, EngineControl};
use crate::errors::BotError;
use crate::model::{BotEvent, LogLevel, RunConfig, RunSummary};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Start a session; rejected with `AlreadyRunning` while one is active.
    Start,
    /// Cancel the active session; a no-op when none is running.
    Stop,
    /// Stop (if needed) and shut the controller down.
    Quit,
}

/// Internal handle for a live session task.
struct RunCtx {
    ctrl_tx: UnboundedSender<EngineControl>,
    handle: Option<tokio::task::JoinHandle<Result<RunSummary>>>,
}

/// Spawn a session task: launch a driver, run the engine, tear down.
fn start_run(
    cfg: &RunConfig,
    provider: Arc<dyn DriverProvider>,
    event_tx: UnboundedSender<BotEvent>,
) -> RunCtx {
    let cfg = cfg.clone();
    let (ctrl_tx, ctrl_rx) = tokio::sync::mpsc::unbounded_channel::<EngineControl>();
    let handle = tokio::spawn(async move {
        let driver = match provider.launch(&cfg).await {
            Ok(driver) => driver,
            Err(e) => {
                // Fatal for the session; reported, never retried.
                let _ = event_tx.send(BotEvent::Log {
                    level: LogLevel::Error,
                    message: format!("Failed to initialize driver: {e}"),
                });
                return Err(e.into());
            }
        };

        let engine = BotEngine::new(cfg);
        let res = engine.run(driver.clone(), event_tx.clone(), ctrl_rx).await;

        // Teardown runs on every exit path; close() itself is idempotent.
        match driver.close().await {
            Ok(()) => {
                let _ = event_tx.send(BotEvent::Log {
                    level: LogLevel::Info,
                    message: "Browser closed successfully".into(),
                });
            }
            Err(e) => {
                let _ = event_tx.send(BotEvent::Log {
                    level: LogLevel::Error,
                    message: format!("Cleanup failed: {e}"),
                });
            }
        }

        res
    });
    RunCtx {
        ctrl_tx,
        handle: Some(handle),
    }
}

/// Orchestrate sessions based on UI commands and emit events back to
/// presentation layers. Returns when a `Quit` has been honored and any
/// active session has wound down; with `one_shot`, as soon as the first
/// session completes.
pub(crate) async fn run_controller(
    cfg: &RunConfig,
    provider: Arc<dyn DriverProvider>,
    auto_start: bool,
    one_shot: bool,
    event_tx: UnboundedSender<BotEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx = if auto_start {
        Some(start_run(cfg, provider.clone(), event_tx.clone()))
    } else {
        None
    };
    let mut quit_pending = false;
    // Stop watchdog: if a cancel takes too long (a browser call may be in
    // flight), emit a status message to keep UI feedback alive.
    let mut stop_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start) => {
                        if run_ctx.is_some() {
                            let _ = event_tx.send(BotEvent::Log {
                                level: LogLevel::Error,
                                message: BotError::AlreadyRunning.to_string(),
                            });
                        } else {
                            run_ctx = Some(start_run(cfg, provider.clone(), event_tx.clone()));
                        }
                    }
                    Some(UiCommand::Stop) => {
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            let _ = event_tx.send(BotEvent::Log {
                                level: LogLevel::Info,
                                message: "Stopping bot…".into(),
                            });
                            stop_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    }
                    Some(UiCommand::Quit) => {
                        quit_pending = true;
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            stop_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        } else {
                            break;
                        }
                    }
                    None => {
                        quit_pending = true;
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                        } else {
                            break;
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise
            // it can be dropped when another branch is chosen and completion
            // is never observed.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    if let Some(ctx) = &mut run_ctx {
                        ctx.handle.take();
                    }
                    match join_res {
                        Ok(Ok(_summary)) => {
                            // The engine already emitted RunCompleted.
                        }
                        Ok(Err(e)) => {
                            let _ = event_tx.send(BotEvent::Log {
                                level: LogLevel::Error,
                                message: format!("Run failed: {e:#}"),
                            });
                        }
                        Err(e) => {
                            let _ = event_tx.send(BotEvent::Log {
                                level: LogLevel::Error,
                                message: format!("Run task failed: {e}"),
                            });
                        }
                    }
                    run_ctx = None;
                    stop_deadline = None;
                    if quit_pending || one_shot {
                        break;
                    }
                }
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = stop_deadline {
                    if tokio::time::Instant::now() >= deadline && run_ctx.is_some() {
                        let _ = event_tx.send(BotEvent::Log {
                            level: LogLevel::Info,
                            message: "Still stopping…".into(),
                        });
                        stop_deadline = None;
                    }
                }
            }
        }
    }

    Ok(())
}
