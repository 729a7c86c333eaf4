use crate::{JobId, JobOutcome, JobPhase, ProgressCounter};

/// Flat render snapshot of the session, for pull-model presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionViewModel {
    /// Displayed phase; `None` before the first attempt and after an outcome.
    pub phase: Option<JobPhase>,
    pub status_detail: Option<String>,
    pub url_progress: Option<ProgressCounter>,
    pub detail_progress: Option<ProgressCounter>,
    pub job_id: Option<JobId>,
    /// A cancel action may be attempted; it is sent only once a job id is known.
    pub cancel_enabled: bool,
    pub outcome: Option<JobOutcome>,
    pub dirty: bool,
}
