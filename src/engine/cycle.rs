//! One submission cycle: fill the URL, submit, and read the page's answer.
//!
//! Every selector the remote page dictates lives here (and the trigger
//! selectors in the catalog); if the page changes markup, this is the one
//! place to update. All interaction faults are converted into a
//! [`CycleOutcome`] at this boundary; a cycle never takes the loop down.

use crate::driver::PageDriver;
use crate::errors::BotError;
use crate::extract;
use crate::model::{BotEvent, CycleOutcome, LogLevel, WaitPolicy};
use tokio::sync::mpsc;

/// The active submission container (the page hides inactive ones with a
/// `nonec` class).
pub(crate) const CONTAINER_SELECTOR: &str =
    "div.col-sm-5.col-xs-12.p-1.container:not(.nonec)";
pub(crate) const URL_INPUT_SELECTOR: &str =
    "div.col-sm-5.col-xs-12.p-1.container:not(.nonec) input";
pub(crate) const SUBMIT_SELECTOR: &str =
    "div.col-sm-5.col-xs-12.p-1.container:not(.nonec) button.btn.btn-primary";
/// Present only when the request was accepted without a cooldown.
pub(crate) const CONFIRM_SELECTOR: &str =
    "div.col-sm-5.col-xs-12.p-1.container:not(.nonec) button.btn.btn-dark";
pub(crate) const WAIT_SPAN_SELECTOR: &str =
    "div.col-sm-5.col-xs-12.p-1.container:not(.nonec) span.br";

/// Run one cycle for the active container.
pub(crate) async fn run_cycle(
    driver: &dyn PageDriver,
    video_url: &str,
    policy: &WaitPolicy,
    event_tx: &mpsc::UnboundedSender<BotEvent>,
) -> CycleOutcome {
    match run_cycle_inner(driver, video_url, policy, event_tx).await {
        Ok(outcome) => outcome,
        Err(e) => CycleOutcome::Error(e),
    }
}

async fn run_cycle_inner(
    driver: &dyn PageDriver,
    video_url: &str,
    policy: &WaitPolicy,
    event_tx: &mpsc::UnboundedSender<BotEvent>,
) -> Result<CycleOutcome, BotError> {
    driver.clear_and_type(URL_INPUT_SELECTOR, video_url).await?;

    // Some services need extra settle time before the button reacts.
    tokio::time::sleep(policy.pre_submit).await;
    driver.click(SUBMIT_SELECTOR).await?;

    // Give the page time to render either a confirmation control or a wait
    // message.
    tokio::time::sleep(policy.post_submit).await;

    if driver.exists(CONFIRM_SELECTOR).await.unwrap_or(false) {
        tokio::time::sleep(policy.confirm_delay).await;
        driver.click(CONFIRM_SELECTOR).await?;
        return Ok(CycleOutcome::Confirmed);
    }

    let text = match driver.read_text(WAIT_SPAN_SELECTOR).await {
        Ok(text) => text,
        Err(BotError::ElementMissing { .. }) => return Ok(CycleOutcome::Unknown),
        Err(e) => return Err(e),
    };

    match extract::extract_wait(&text) {
        Ok(Some(total)) => Ok(CycleOutcome::MustWait(extract::effective_wait(
            total, policy,
        ))),
        Ok(None) => Ok(CycleOutcome::Unknown),
        Err(e) => {
            super::log(event_tx, LogLevel::Error, format!("{e}"));
            Ok(CycleOutcome::Unknown)
        }
    }
}
