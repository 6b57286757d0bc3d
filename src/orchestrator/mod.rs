//! Session orchestration.
//!
//! Owns start/stop lifecycle for bot sessions: at most one session is live
//! at a time, stop requests are delivered as cooperative cancellation, and
//! the browser is torn down exactly once per session no matter how the run
//! ends. Presentation layers talk to this module through channels only.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
