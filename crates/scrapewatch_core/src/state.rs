use std::fmt;

use crate::view_model::SessionViewModel;

pub type JobId = String;

/// Failure message used when a transport error carries no server payload.
pub const DEFAULT_FAILURE_MESSAGE: &str = "The connection to the server failed unexpectedly.";

/// Outcome message for a cancellation the server never explicitly confirmed.
pub const ASSUMED_CANCELLED_MESSAGE: &str =
    "Cancellation requested; the stream ended before the server confirmed it.";

/// Status line shown while a cancellation request is awaiting confirmation.
pub const CANCEL_PENDING_DETAIL: &str =
    "Cancellation requested, waiting for the server to confirm.";

/// Coarse stage of the running job as reflected to the user.
///
/// Variant order defines display precedence: within one attempt the
/// server-driven phase only ever moves towards later variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum JobPhase {
    #[default]
    Connecting,
    Started,
    Collecting,
    CollectingUrls,
    FetchingDetails,
    Cancelling,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self {
            JobPhase::Connecting => "connecting",
            JobPhase::Started => "started",
            JobPhase::Collecting => "collecting",
            JobPhase::CollectingUrls => "collecting urls",
            JobPhase::FetchingDetails => "fetching details",
            JobPhase::Cancelling => "cancelling",
        };
        f.write_str(title)
    }
}

/// Completion counter for one phase of server-side work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressCounter {
    pub current: u64,
    pub total: u64,
}

impl ProgressCounter {
    /// Display ratio clamped to [0, 1]; `None` when the total is unknown.
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.current as f64 / self.total as f64).min(1.0))
    }
}

/// Which of the two work phases a progress counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    UrlCollection,
    DetailFetch,
}

/// One preview table row as ordered column/value pairs.
pub type PreviewRow = Vec<(String, String)>;

/// The single terminal result of one job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        file_name: String,
        preview: Vec<PreviewRow>,
    },
    Cancelled {
        message: String,
    },
    Failed {
        message: String,
    },
}

/// Mutable bookkeeping for one attempt, alive from start until an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct AttemptState {
    job_id: Option<JobId>,
    server_phase: JobPhase,
    status_detail: Option<String>,
    url_progress: Option<ProgressCounter>,
    detail_progress: Option<ProgressCounter>,
    cancel_in_flight: bool,
}

impl AttemptState {
    /// The phase to render: a pending cancellation overlays the server phase
    /// without overwriting it, so a failed cancel request can restore it.
    fn displayed_phase(&self) -> JobPhase {
        if self.cancel_in_flight {
            JobPhase::Cancelling
        } else {
            self.server_phase
        }
    }

    /// Raises the server-phase floor; returns the new displayed phase when
    /// the change is visible. Earlier-phase events never lower the floor.
    fn raise_phase(&mut self, floor: JobPhase) -> Option<JobPhase> {
        let before = self.displayed_phase();
        if floor > self.server_phase {
            self.server_phase = floor;
        }
        let after = self.displayed_phase();
        (after != before).then_some(after)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum SessionState {
    #[default]
    Idle,
    Connecting(AttemptState),
    Active(AttemptState),
    Finished(JobOutcome),
}

/// Job-session aggregate: one attempt's lifecycle state plus a dirty flag
/// for render coalescing. Mutated only through `update`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobSession {
    state: SessionState,
    dirty: bool,
}

impl JobSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SessionViewModel {
        let mut view = SessionViewModel {
            dirty: self.dirty,
            ..SessionViewModel::default()
        };
        match &self.state {
            SessionState::Idle => {}
            SessionState::Connecting(attempt) | SessionState::Active(attempt) => {
                view.phase = Some(attempt.displayed_phase());
                view.status_detail = if attempt.cancel_in_flight {
                    Some(CANCEL_PENDING_DETAIL.to_string())
                } else {
                    attempt.status_detail.clone()
                };
                view.url_progress = attempt.url_progress;
                view.detail_progress = attempt.detail_progress;
                view.job_id = attempt.job_id.clone();
                view.cancel_enabled = !attempt.cancel_in_flight;
            }
            SessionState::Finished(outcome) => {
                view.outcome = Some(outcome.clone());
            }
        }
        view
    }

    /// Returns true when a render is pending and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        let was_dirty = self.dirty;
        self.dirty = false;
        was_dirty
    }

    fn attempt(&self) -> Option<&AttemptState> {
        match &self.state {
            SessionState::Connecting(attempt) | SessionState::Active(attempt) => Some(attempt),
            SessionState::Idle | SessionState::Finished(_) => None,
        }
    }

    fn attempt_mut(&mut self) -> Option<&mut AttemptState> {
        match &mut self.state {
            SessionState::Connecting(attempt) | SessionState::Active(attempt) => Some(attempt),
            SessionState::Idle | SessionState::Finished(_) => None,
        }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.attempt().is_some()
    }

    pub(crate) fn cancel_in_flight(&self) -> bool {
        self.attempt().is_some_and(|attempt| attempt.cancel_in_flight)
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.state = SessionState::Connecting(AttemptState::default());
        self.dirty = true;
    }

    /// Connecting -> Active on the channel-open signal; returns the displayed
    /// phase when the transition happened.
    pub(crate) fn activate(&mut self) -> Option<JobPhase> {
        if let SessionState::Connecting(attempt) = &mut self.state {
            let mut attempt = std::mem::take(attempt);
            attempt.raise_phase(JobPhase::Started);
            let phase = attempt.displayed_phase();
            self.state = SessionState::Active(attempt);
            self.dirty = true;
            return Some(phase);
        }
        None
    }

    /// Records the server-assigned correlation id; last value wins.
    pub(crate) fn assign_job(&mut self, job_id: JobId) {
        if let Some(attempt) = self.attempt_mut() {
            attempt.job_id = Some(job_id);
            self.dirty = true;
        }
    }

    /// Stores the verbatim status text; returns the phase to announce, or
    /// `None` while the cancelling overlay hides server-side phase changes.
    pub(crate) fn apply_status(&mut self, text: &str) -> Option<JobPhase> {
        let attempt = self.attempt_mut()?;
        attempt.status_detail = Some(text.to_string());
        attempt.raise_phase(JobPhase::Collecting);
        let announced = (!attempt.cancel_in_flight).then(|| attempt.displayed_phase());
        self.dirty = true;
        announced
    }

    /// Replaces the counter for `kind`; returns the displayed phase when the
    /// update made it advance.
    pub(crate) fn apply_progress(
        &mut self,
        kind: ProgressKind,
        counter: ProgressCounter,
    ) -> Option<JobPhase> {
        let attempt = self.attempt_mut()?;
        let (floor, slot) = match kind {
            ProgressKind::UrlCollection => (JobPhase::CollectingUrls, &mut attempt.url_progress),
            ProgressKind::DetailFetch => (JobPhase::FetchingDetails, &mut attempt.detail_progress),
        };
        *slot = Some(counter);
        let advanced = attempt.raise_phase(floor);
        self.dirty = true;
        advanced
    }

    /// Arms the cancellation-in-flight flag. Returns the job id to cancel,
    /// or `None` when no id is known yet or a request is already pending.
    pub(crate) fn request_cancel(&mut self) -> Option<JobId> {
        let attempt = self.attempt_mut()?;
        if attempt.cancel_in_flight {
            return None;
        }
        let job_id = attempt.job_id.clone()?;
        attempt.cancel_in_flight = true;
        self.dirty = true;
        Some(job_id)
    }

    /// Disarms the flag after a failed cancel request; returns the restored
    /// displayed phase and status detail.
    pub(crate) fn rollback_cancel(&mut self) -> Option<(JobPhase, Option<String>)> {
        let attempt = self.attempt_mut()?;
        if !attempt.cancel_in_flight {
            return None;
        }
        attempt.cancel_in_flight = false;
        let restored = (attempt.displayed_phase(), attempt.status_detail.clone());
        self.dirty = true;
        Some(restored)
    }

    /// Finalizes the attempt. Terminal states are sticky: once finished,
    /// further finish calls are rejected.
    pub(crate) fn finish(&mut self, outcome: JobOutcome) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.state = SessionState::Finished(outcome);
        self.dirty = true;
        true
    }
}
