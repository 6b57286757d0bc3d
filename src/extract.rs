//! Wait-time extraction from the page's cooldown message.
//!
//! The page reports cooldowns as "Please wait MM:SS ..." in a status span
//! next to the submit button. No marker means the service is ready to
//! submit; that is the normal case, not an error. A marker with digits
//! that do not parse is a `ParseFailure` and must stay distinguishable
//! from "no wait message".

use crate::errors::BotError;
use crate::model::WaitPolicy;
use regex::Regex;
use std::sync::LazyLock;

const WAIT_MARKER: &str = "Please wait";

static MINUTES_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+):(\d+)").expect("static pattern"));

/// Parse the status text into a total-seconds cooldown.
///
/// `Ok(None)` when the marker is absent; `Err(ParseFailure)` when the marker
/// is present but no well-formed `minutes:seconds` pair follows it.
pub fn extract_wait(text: &str) -> Result<Option<u64>, BotError> {
    if !text.contains(WAIT_MARKER) {
        return Ok(None);
    }
    let caps = MINUTES_SECONDS
        .captures(text)
        .ok_or_else(|| BotError::ParseFailure(text.to_string()))?;
    let minutes: u64 = caps[1]
        .parse()
        .map_err(|_| BotError::ParseFailure(text.to_string()))?;
    let seconds: u64 = caps[2]
        .parse()
        .map_err(|_| BotError::ParseFailure(text.to_string()))?;
    Ok(Some(minutes * 60 + seconds))
}

/// Clamp a reported cooldown through the service's policy: floor first
/// (guards against spurious near-zero waits), then ceiling (caps pointlessly
/// long waits for low-risk services).
pub fn effective_wait(total_secs: u64, policy: &WaitPolicy) -> u64 {
    let mut wait = total_secs;
    if let Some(floor) = policy.floor_secs {
        wait = wait.max(floor);
    }
    if let Some(ceiling) = policy.ceiling_secs {
        wait = wait.min(ceiling);
    }
    wait
}
