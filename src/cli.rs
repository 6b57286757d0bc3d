use crate::driver::ChromeProvider;
use crate::logfile::{self, LogFile};
use crate::model::{BotEvent, LogLevel, RunConfig, RunSummary, ServiceId};
use crate::orchestrator::{run_controller, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for the blocking writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
    /// Persist to the log file only.
    Record(LogLevel, String),
}

/// Spawn a blocking writer for console and log-file output so async tasks
/// never block on IO.
fn spawn_output_writer(
    mut logfile: Option<LogFile>,
) -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
                OutputLine::Record(level, msg) => {
                    if let Some(log) = logfile.as_mut() {
                        log.append(level, &msg);
                    }
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "tikboost",
    version,
    about = "Zefoy-style TikTok boost bot: submit, wait out cooldowns, repeat"
)]
pub struct Cli {
    /// TikTok video URL to boost
    #[arg(long)]
    pub video_url: String,

    /// Boost service to run
    #[arg(long, value_enum, default_value_t = ServiceId::Views)]
    pub service: ServiceId,

    /// Page hosting the boost services
    #[arg(long, default_value = "https://zefoy.com")]
    pub site_url: String,

    /// Give up after this many submission attempts
    #[arg(long, default_value_t = 100)]
    pub max_attempts: u32,

    /// Bounded wait when locating page elements
    #[arg(long, default_value = "15s")]
    pub element_timeout: humantime::Duration,

    /// Bounded wait for the captcha input on the initial page load
    #[arg(long, default_value = "30s")]
    pub gate_timeout: humantime::Duration,

    /// Poll interval while waiting for the captcha gate to clear
    #[arg(long, default_value = "1s")]
    pub gate_poll_interval: humantime::Duration,

    /// Run the browser headless. The captcha still needs a human, so keep
    /// the window visible unless the gate is already cleared for the profile
    #[arg(long)]
    pub headless: bool,

    /// Path to a Chrome/Chromium executable
    #[arg(long)]
    pub browser: Option<std::path::PathBuf>,

    /// Log file path (defaults to the platform data directory)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Do not write a log file
    #[arg(long)]
    pub no_log_file: bool,

    /// Print the final run summary as pretty JSON
    #[arg(long)]
    pub json: bool,
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        site_url: args.site_url.clone(),
        video_url: args.video_url.trim().to_string(),
        service: args.service,
        max_attempts: args.max_attempts,
        element_timeout: Duration::from(args.element_timeout),
        gate_timeout: Duration::from(args.gate_timeout),
        gate_poll_interval: Duration::from(args.gate_poll_interval),
        headless: args.headless,
        browser_path: args.browser.clone(),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.video_url.trim().is_empty() {
        anyhow::bail!("please enter a TikTok video URL");
    }

    let cfg = build_config(&args);

    let logfile = if args.no_log_file {
        None
    } else {
        let path = args.log_file.clone().unwrap_or_else(logfile::default_path);
        Some(LogFile::open(&path).context("failed to open log file")?)
    };
    let (out_tx, out_handle) = spawn_output_writer(logfile);

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<BotEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // First Ctrl-C asks the session to stop; a second one shuts down
    // without waiting for the run to wind up.
    {
        let cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            let mut interrupts = 0u32;
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }
                interrupts += 1;
                let cmd = if interrupts == 1 {
                    UiCommand::Stop
                } else {
                    UiCommand::Quit
                };
                if cmd_tx.send(cmd).is_err() || interrupts > 1 {
                    break;
                }
            }
        });
    }

    let controller = {
        let cfg = cfg.clone();
        let evt_tx = evt_tx.clone();
        tokio::spawn(async move {
            run_controller(&cfg, Arc::new(ChromeProvider), true, true, evt_tx, cmd_rx).await
        })
    };
    // The controller and engine hold the only senders now; the event loop
    // below ends when they are done.
    drop(evt_tx);

    let mut summary: Option<RunSummary> = None;
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            BotEvent::PhaseChanged { phase } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("== {phase:?} ==")));
            }
            BotEvent::Log { level, message } => {
                let stamped = format!("[{}] {}", logfile::timestamp(), message);
                let line = match level {
                    LogLevel::Info => OutputLine::Stdout(stamped),
                    LogLevel::Error => OutputLine::Stderr(stamped),
                };
                let _ = out_tx.send(line);
                let _ = out_tx.send(OutputLine::Record(level, message));
            }
            BotEvent::ServiceProbed { .. } => {
                // Already mirrored as a log line by the engine.
            }
            BotEvent::CycleFinished {
                attempt,
                successes,
                outcome_kind,
            } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "attempt {attempt}: {outcome_kind} (successes: {successes})"
                )));
            }
            BotEvent::RunCompleted { summary: s } => {
                summary = Some(*s);
            }
        }
    }

    // All senders are gone; a session can no longer be live. Surface the
    // controller's own result before printing the summary.
    controller.await.context("controller task failed")??;

    if let Some(summary) = summary {
        if args.json {
            let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&summary)?));
        } else {
            for line in summary_lines(&summary) {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Human-readable closing block for text mode.
fn summary_lines(summary: &RunSummary) -> Vec<String> {
    vec![
        "== Run summary ==".to_string(),
        format!("Service:   {}", summary.service),
        format!("Video:     {}", summary.video_url),
        format!(
            "Attempts:  {}  (successes: {}, errors: {})",
            summary.attempts, summary.successes, summary.errors
        ),
        format!(
            "Cooldowns: {}  ({}s total)",
            summary.waits, summary.wait_secs_total
        ),
        format!(
            "Ended:     {}",
            if summary.cancelled {
                "stopped by user"
            } else {
                "attempt budget reached"
            }
        ),
    ]
}
