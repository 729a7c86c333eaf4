use crate::{
    Effect, JobOutcome, JobPhase, JobSession, Msg, Notification, ProgressCounter, ProgressKind,
    ASSUMED_CANCELLED_MESSAGE, CANCEL_PENDING_DETAIL, DEFAULT_FAILURE_MESSAGE,
};

/// Pure update function: applies a message to the session and returns any effects.
pub fn update(mut session: JobSession, msg: Msg) -> (JobSession, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested { selector } => {
            let mut effects = Vec::with_capacity(3);
            // Supersession: a still-streaming attempt loses its channel first,
            // so at most one channel is ever open.
            if session.is_streaming() {
                effects.push(Effect::CloseChannel);
            }
            session.begin_attempt();
            effects.push(Effect::OpenChannel { selector });
            effects.push(Effect::Notify(Notification::PhaseChanged {
                phase: JobPhase::Connecting,
                detail: None,
            }));
            effects
        }
        Msg::ChannelOpened => match session.activate() {
            Some(phase) => vec![Effect::Notify(Notification::PhaseChanged {
                phase,
                detail: None,
            })],
            None => Vec::new(),
        },
        Msg::JobAssigned { job_id } => {
            session.assign_job(job_id);
            Vec::new()
        }
        Msg::StatusReported { text } => match session.apply_status(&text) {
            Some(phase) => vec![Effect::Notify(Notification::PhaseChanged {
                phase,
                detail: Some(text),
            })],
            None => Vec::new(),
        },
        Msg::UrlProgress(counter) => {
            progress_effects(&mut session, ProgressKind::UrlCollection, counter)
        }
        Msg::DetailProgress(counter) => {
            progress_effects(&mut session, ProgressKind::DetailFetch, counter)
        }
        Msg::ResultReady { file_name, preview } => {
            let outcome = JobOutcome::Succeeded {
                file_name: file_name.clone(),
                preview: preview.clone(),
            };
            if session.finish(outcome) {
                vec![
                    Effect::CloseChannel,
                    Effect::Notify(Notification::Succeeded { file_name, preview }),
                ]
            } else {
                Vec::new()
            }
        }
        Msg::CancelConfirmed { message } => {
            let outcome = JobOutcome::Cancelled {
                message: message.clone(),
            };
            if session.finish(outcome) {
                vec![
                    Effect::CloseChannel,
                    Effect::Notify(Notification::Cancelled { message }),
                ]
            } else {
                Vec::new()
            }
        }
        Msg::TransportError { message } => {
            // Race arbitration: with a cancellation in flight the error is an
            // expected side effect of the server tearing down the stream; the
            // real terminal event is still awaited.
            if session.cancel_in_flight() {
                Vec::new()
            } else {
                let message = message.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                fail(&mut session, message)
            }
        }
        Msg::ChannelClosed => {
            if session.cancel_in_flight() {
                // The stream is exhausted and no confirmation can arrive any
                // more; resolve the pending cancellation instead of stalling.
                let message = ASSUMED_CANCELLED_MESSAGE.to_string();
                if session.finish(JobOutcome::Cancelled {
                    message: message.clone(),
                }) {
                    vec![
                        Effect::CloseChannel,
                        Effect::Notify(Notification::Cancelled { message }),
                    ]
                } else {
                    Vec::new()
                }
            } else {
                fail(&mut session, DEFAULT_FAILURE_MESSAGE.to_string())
            }
        }
        Msg::CancelRequested => match session.request_cancel() {
            Some(job_id) => vec![
                Effect::SendCancel { job_id },
                Effect::Notify(Notification::PhaseChanged {
                    phase: JobPhase::Cancelling,
                    detail: Some(CANCEL_PENDING_DETAIL.to_string()),
                }),
            ],
            None => Vec::new(),
        },
        Msg::CancelRequestFailed { reason } => match session.rollback_cancel() {
            Some((phase, detail)) => vec![
                Effect::Notify(Notification::CancelRequestFailed { reason }),
                Effect::Notify(Notification::PhaseChanged { phase, detail }),
            ],
            None => Vec::new(),
        },
    };

    (session, effects)
}

fn progress_effects(
    session: &mut JobSession,
    kind: ProgressKind,
    counter: ProgressCounter,
) -> Vec<Effect> {
    if !session.is_streaming() {
        return Vec::new();
    }
    let mut effects = Vec::with_capacity(2);
    if let Some(phase) = session.apply_progress(kind, counter) {
        effects.push(Effect::Notify(Notification::PhaseChanged {
            phase,
            detail: None,
        }));
    }
    effects.push(Effect::Notify(Notification::Progress { kind, counter }));
    effects
}

fn fail(session: &mut JobSession, message: String) -> Vec<Effect> {
    let outcome = JobOutcome::Failed {
        message: message.clone(),
    };
    if session.finish(outcome) {
        vec![
            Effect::CloseChannel,
            Effect::Notify(Notification::Failed { message }),
        ]
    } else {
        Vec::new()
    }
}
