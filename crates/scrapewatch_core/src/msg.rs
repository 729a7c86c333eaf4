#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User started a run for the given area selector.
    StartRequested { selector: String },
    /// User asked to cancel the running job.
    CancelRequested,
    /// The push channel finished its connection handshake.
    ChannelOpened,
    /// The push channel ended without a terminal event.
    ChannelClosed,
    /// Server assigned the correlation id for this attempt.
    JobAssigned { job_id: crate::JobId },
    /// Free-text status update from the server.
    StatusReported { text: String },
    /// Listing-page scan progress.
    UrlProgress(crate::ProgressCounter),
    /// Per-item detail fetch progress.
    DetailProgress(crate::ProgressCounter),
    /// The job finished and produced a downloadable file.
    ResultReady {
        file_name: String,
        preview: Vec<crate::PreviewRow>,
    },
    /// Server confirmed the cancellation.
    CancelConfirmed { message: String },
    /// The channel surfaced a connection-level failure.
    TransportError { message: Option<String> },
    /// The cancellation request itself could not be delivered.
    CancelRequestFailed { reason: String },
}
