#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenChannel { selector: String },
    CloseChannel,
    SendCancel { job_id: crate::JobId },
    Notify(Notification),
}

/// Lifecycle callbacks for the presentation layer. `Succeeded`, `Cancelled`
/// and `Failed` are terminal; the rest are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PhaseChanged {
        phase: crate::JobPhase,
        detail: Option<String>,
    },
    Progress {
        kind: crate::ProgressKind,
        counter: crate::ProgressCounter,
    },
    Succeeded {
        file_name: String,
        preview: Vec<crate::PreviewRow>,
    },
    Cancelled {
        message: String,
    },
    Failed {
        message: String,
    },
    CancelRequestFailed {
        reason: String,
    },
}
