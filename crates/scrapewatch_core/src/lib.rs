//! Scrapewatch core: pure job-session state machine and view-model helpers.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::{Effect, Notification};
pub use msg::Msg;
pub use state::{
    JobId, JobOutcome, JobPhase, JobSession, PreviewRow, ProgressCounter, ProgressKind,
    ASSUMED_CANCELLED_MESSAGE, CANCEL_PENDING_DETAIL, DEFAULT_FAILURE_MESSAGE,
};
pub use update::update;
pub use view_model::SessionViewModel;
