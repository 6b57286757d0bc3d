//! Static registry of the boost services the target page offers, plus the
//! per-service timing policy table and the availability probe.

use crate::driver::PageDriver;
use crate::errors::BotError;
use crate::model::{Service, ServiceId, ServiceStatus, WaitPolicy};
use std::time::Duration;

/// Trigger the gate poll looks for once the captcha clears. Any known
/// service button works; views is the one the page always renders.
pub const GATE_READY_SELECTOR: &str = ".t-views-button";

/// The captcha widget's input field, present on the initial page load.
pub const GATE_INPUT_SELECTOR: &str = "input";

/// All cataloged services, statuses unresolved until the first probe.
///
/// `.t-livesteam-button` is not a typo on our side; it is the class name
/// the remote page actually uses.
pub fn services() -> Vec<Service> {
    let entry = |id, title, trigger_selector| Service {
        id,
        title,
        trigger_selector,
        status: ServiceStatus::Unknown,
    };
    vec![
        entry(ServiceId::Followers, "Followers", ".t-followers-button"),
        entry(ServiceId::Hearts, "Hearts", ".t-hearts-button"),
        entry(
            ServiceId::CommentsHearts,
            "Comments Hearts",
            ".t-chearts-button",
        ),
        entry(ServiceId::Views, "Views", ".t-views-button"),
        entry(ServiceId::Shares, "Shares", ".t-shares-button"),
        entry(ServiceId::Favorites, "Favorites", ".t-favorites-button"),
        entry(
            ServiceId::LiveStream,
            "Live Stream [VS+LIKES]",
            ".t-livesteam-button",
        ),
    ]
}

pub fn lookup(id: ServiceId) -> Result<Service, BotError> {
    services()
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| BotError::UnknownService(id.to_string()))
}

/// Timing policy per service. Followers and hearts are the services the page
/// rate-limits hardest, so they get long floors, extra settle time and more
/// frequent refreshes; everything else runs on the fast default.
pub fn policy(id: ServiceId) -> WaitPolicy {
    match id {
        ServiceId::Hearts => WaitPolicy {
            floor_secs: Some(60),
            ceiling_secs: None,
            pre_submit: Duration::from_secs(2),
            post_submit: Duration::from_secs(3),
            confirm_delay: Duration::from_secs(1),
            recovery_delay: Duration::from_secs(2),
            jitter_min: Duration::from_secs(3),
            jitter_max: Duration::from_secs(5),
            refresh_every: 5,
        },
        ServiceId::Followers => WaitPolicy {
            floor_secs: Some(120),
            ceiling_secs: None,
            pre_submit: Duration::from_secs(3),
            post_submit: Duration::from_secs(4),
            confirm_delay: Duration::from_secs(2),
            recovery_delay: Duration::from_secs(2),
            jitter_min: Duration::from_secs(5),
            jitter_max: Duration::from_secs(8),
            refresh_every: 3,
        },
        _ => WaitPolicy {
            floor_secs: None,
            ceiling_secs: Some(30),
            pre_submit: Duration::ZERO,
            post_submit: Duration::from_secs(1),
            confirm_delay: Duration::ZERO,
            recovery_delay: Duration::from_secs(2),
            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_millis(1500),
            refresh_every: 10,
        },
    }
}

/// Resolve a service's availability on the current page: trigger present and
/// enabled means working, present-but-disabled or absent means offline.
/// Reads only; never mutates the page.
pub async fn probe(driver: &dyn PageDriver, service: &Service) -> ServiceStatus {
    match driver.exists(service.trigger_selector).await {
        Ok(true) => match driver.is_enabled(service.trigger_selector).await {
            Ok(true) => ServiceStatus::Working,
            _ => ServiceStatus::Offline,
        },
        _ => ServiceStatus::Offline,
    }
}
