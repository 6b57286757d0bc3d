use crate::errors::BotError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Closed set of boost services offered by the target page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    Followers,
    Hearts,
    CommentsHearts,
    Views,
    Shares,
    Favorites,
    LiveStream,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceId::Followers => "followers",
            ServiceId::Hearts => "hearts",
            ServiceId::CommentsHearts => "comments_hearts",
            ServiceId::Views => "views",
            ServiceId::Shares => "shares",
            ServiceId::Favorites => "favorites",
            ServiceId::LiveStream => "live_stream",
        };
        f.write_str(s)
    }
}

/// Availability as resolved by the post-load probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Unknown,
    Working,
    Offline,
}

impl ServiceStatus {
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "[UNKNOWN]",
            ServiceStatus::Working => "[WORKING]",
            ServiceStatus::Offline => "[OFFLINE]",
        }
    }
}

/// One catalog entry: display name plus the page trigger selector.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub title: &'static str,
    pub trigger_selector: &'static str,
    pub status: ServiceStatus,
}

/// Per-service timing policy.
///
/// One table entry per service replaces per-service conditionals scattered
/// through the loop: cooldown floor/ceiling, settle delays around the submit
/// click, the jitter range between attempts, and how often to force a full
/// page reload. Adding a service is a data change, not a code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Never honor a reported cooldown shorter than this (anti-hammering).
    pub floor_secs: Option<u64>,
    /// Cap unnecessarily long reported cooldowns for low-risk services.
    pub ceiling_secs: Option<u64>,
    #[serde(with = "humantime_serde")]
    pub pre_submit: Duration,
    #[serde(with = "humantime_serde")]
    pub post_submit: Duration,
    #[serde(with = "humantime_serde")]
    pub confirm_delay: Duration,
    /// Pause after an Unknown/Error outcome before the next attempt.
    #[serde(with = "humantime_serde")]
    pub recovery_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter_min: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter_max: Duration,
    /// Force a full page reload after every N confirmed successes.
    pub refresh_every: u32,
}

/// Result of one submission attempt.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The page accepted the request and the confirmation control was clicked.
    Confirmed,
    /// The page reported a cooldown; value is the effective wait in seconds
    /// after the service's floor/ceiling policy has been applied.
    MustWait(u64),
    /// Neither a confirmation control nor a wait message was found.
    Unknown,
    /// An interaction fault aborted the cycle.
    Error(BotError),
}

impl CycleOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleOutcome::Confirmed => "confirmed",
            CycleOutcome::MustWait(_) => "must_wait",
            CycleOutcome::Unknown => "unknown",
            CycleOutcome::Error(_) => "error",
        }
    }
}

/// Run phases, in the order a healthy session passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    AwaitingGate,
    Probing,
    Looping,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Error,
}

/// Events emitted by the engine and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum BotEvent {
    PhaseChanged {
        phase: Phase,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    ServiceProbed {
        id: ServiceId,
        title: &'static str,
        status: ServiceStatus,
    },
    CycleFinished {
        attempt: u32,
        successes: u32,
        outcome_kind: &'static str,
    },
    RunCompleted {
        // Box to keep BotEvent small; the summary only travels once per run.
        summary: Box<RunSummary>,
    },
}

/// Everything the engine needs for one session.
///
/// The attempt cap and the timeouts are empirically tuned against the target
/// page; they are configuration, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub site_url: String,
    pub video_url: String,
    pub service: ServiceId,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub element_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub gate_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub gate_poll_interval: Duration,
    pub headless: bool,
    pub browser_path: Option<std::path::PathBuf>,
}

/// Final tally for a completed (or cancelled) session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub timestamp_utc: String,
    pub service: ServiceId,
    pub video_url: String,
    pub attempts: u32,
    pub successes: u32,
    /// Cooldowns honored, and the total seconds the page asked us to wait.
    pub waits: u32,
    pub wait_secs_total: u64,
    pub errors: u32,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(service: ServiceId, video_url: &str) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            service,
            video_url: video_url.to_string(),
            attempts: 0,
            successes: 0,
            waits: 0,
            wait_secs_total: 0,
            errors: 0,
            cancelled: false,
        }
    }
}
