use thiserror::Error;

/// Failure classes surfaced by the bot.
///
/// Per-cycle faults are converted into a `CycleOutcome` at the cycle
/// executor boundary; everything raised during startup or the gate wait
/// propagates and terminates the run through teardown.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    /// An expected page control was absent within the element-search timeout.
    /// Usually transient page state, recovered by retry/refresh.
    #[error("element not found: {selector}")]
    ElementMissing { selector: String },

    /// The browser rejected or botched an interaction (click, type, read).
    #[error("browser interaction failed: {0}")]
    Interaction(String),

    /// A wait-time message was present but its digits did not parse.
    #[error("could not parse wait time from '{0}'")]
    ParseFailure(String),

    /// The browser could not be started at all. Fatal for the session.
    #[error("driver init failed: {0}")]
    DriverInit(String),

    /// A session is already active; a second one is rejected, never queued.
    #[error("a bot session is already running")]
    AlreadyRunning,

    /// Identifier absent from the service catalog.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The captcha input never appeared on the initial page load.
    #[error("captcha gate did not appear within the timeout")]
    GateTimeout,
}

impl BotError {
    pub fn missing(selector: impl Into<String>) -> Self {
        Self::ElementMissing {
            selector: selector.into(),
        }
    }
}
