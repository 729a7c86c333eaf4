use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use client_logging::{client_debug, client_warn};
use scrapewatch_core::{
    update, Effect, JobPhase, JobSession, Msg, Notification, PreviewRow, ProgressCounter,
    ProgressKind,
};

use crate::cancel::CancelRequester;
use crate::channel::{EventChannel, EventSubscription};
use crate::event::ChannelEvent;
use crate::{CancelError, ChannelError};

/// Lifecycle callbacks pushed to the presentation layer.
///
/// `succeeded`, `cancelled` and `failed` are terminal for one attempt.
/// `cancel_request_failed` is a transient notice after which cancelling may
/// be retried; it defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    fn phase_changed(&self, phase: JobPhase, detail: Option<&str>);
    fn progress(&self, kind: ProgressKind, counter: ProgressCounter);
    fn succeeded(&self, file_name: &str, preview: &[PreviewRow]);
    fn cancelled(&self, message: &str);
    fn failed(&self, message: &str);
    fn cancel_request_failed(&self, _reason: &str) {}
}

enum Command {
    Start { selector: String },
    Cancel,
}

/// Where the current attempt's single subscription lives. The slot is the
/// only owner, so discarding an attempt makes its events unreachable.
enum ChannelSlot {
    Closed,
    Opening(BoxFuture<'static, Result<Box<dyn EventSubscription>, ChannelError>>),
    Open(Box<dyn EventSubscription>),
}

type CancelFuture = BoxFuture<'static, Result<(), CancelError>>;

/// Handle to the driver task that runs job sessions against an event channel
/// and a cancel requester, pushing lifecycle callbacks into the observer.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(
        channel: Arc<dyn EventChannel>,
        requester: Arc<dyn CancelRequester>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(channel, requester, observer, cmd_rx));
        Self { cmd_tx, task }
    }

    /// Starts a new attempt, superseding any running one.
    pub fn start(&self, selector: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Start {
            selector: selector.into(),
        });
    }

    /// Requests cooperative cancellation of the current job.
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(Command::Cancel);
    }

    /// Stops the driver task. A still-running attempt is dropped, not resolved.
    pub async fn shutdown(self) {
        drop(self.cmd_tx);
        let _ = self.task.await;
    }
}

async fn run_loop(
    channel: Arc<dyn EventChannel>,
    requester: Arc<dyn CancelRequester>,
    observer: Arc<dyn SessionObserver>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut session = JobSession::new();
    let mut slot = ChannelSlot::Closed;
    let mut cancel_request: Option<CancelFuture> = None;

    loop {
        let msg = tokio::select! {
            command = cmd_rx.recv() => match command {
                Some(Command::Start { selector }) => Msg::StartRequested { selector },
                Some(Command::Cancel) => Msg::CancelRequested,
                None => break,
            },
            msg = channel_activity(&mut slot) => msg,
            result = cancel_response(&mut cancel_request) => match result {
                Ok(()) => {
                    client_debug!("cancel request delivered; awaiting confirmation");
                    continue;
                }
                Err(err) => Msg::CancelRequestFailed {
                    reason: err.to_string(),
                },
            },
        };

        let suppressible = matches!(msg, Msg::TransportError { .. });
        let (next_session, effects) = update(session, msg);
        session = next_session;
        if suppressible && effects.is_empty() {
            client_debug!("transport error during cancellation, awaiting server confirmation");
        }
        apply_effects(
            effects,
            &channel,
            &requester,
            &observer,
            &mut slot,
            &mut cancel_request,
        );
    }
}

/// Resolves the slot's next message: the open handshake finishing, an event
/// arriving, or the stream ending. Pends forever while the slot is closed so
/// the select loop stays parked on commands.
async fn channel_activity(slot: &mut ChannelSlot) -> Msg {
    match slot {
        ChannelSlot::Closed => std::future::pending::<Msg>().await,
        ChannelSlot::Opening(handshake) => match handshake.as_mut().await {
            Ok(subscription) => {
                *slot = ChannelSlot::Open(subscription);
                Msg::ChannelOpened
            }
            Err(err) => {
                client_warn!("channel open failed: {}", err);
                *slot = ChannelSlot::Closed;
                Msg::TransportError { message: None }
            }
        },
        ChannelSlot::Open(subscription) => match subscription.next().await {
            Some(event) => map_event(event),
            None => {
                *slot = ChannelSlot::Closed;
                Msg::ChannelClosed
            }
        },
    }
}

/// Awaits the in-flight cancel request, if any, consuming it on completion.
async fn cancel_response(request: &mut Option<CancelFuture>) -> Result<(), CancelError> {
    match request {
        Some(pending) => {
            let result = pending.as_mut().await;
            *request = None;
            result
        }
        None => std::future::pending::<Result<(), CancelError>>().await,
    }
}

fn apply_effects(
    effects: Vec<Effect>,
    channel: &Arc<dyn EventChannel>,
    requester: &Arc<dyn CancelRequester>,
    observer: &Arc<dyn SessionObserver>,
    slot: &mut ChannelSlot,
    cancel_request: &mut Option<CancelFuture>,
) {
    for effect in effects {
        match effect {
            Effect::OpenChannel { selector } => {
                let channel = Arc::clone(channel);
                *slot =
                    ChannelSlot::Opening(Box::pin(
                        async move { channel.open(&selector).await },
                    ));
            }
            Effect::CloseChannel => {
                if let ChannelSlot::Open(subscription) = slot {
                    subscription.close();
                }
                *slot = ChannelSlot::Closed;
                // Tearing down the attempt also abandons any cancel request
                // still in flight.
                *cancel_request = None;
            }
            Effect::SendCancel { job_id } => {
                let requester = Arc::clone(requester);
                *cancel_request = Some(Box::pin(async move {
                    requester.request_cancel(&job_id).await
                }));
            }
            Effect::Notify(notification) => notify(observer.as_ref(), notification),
        }
    }
}

fn notify(observer: &dyn SessionObserver, notification: Notification) {
    match notification {
        Notification::PhaseChanged { phase, detail } => {
            observer.phase_changed(phase, detail.as_deref())
        }
        Notification::Progress { kind, counter } => observer.progress(kind, counter),
        Notification::Succeeded { file_name, preview } => {
            observer.succeeded(&file_name, &preview)
        }
        Notification::Cancelled { message } => observer.cancelled(&message),
        Notification::Failed { message } => observer.failed(&message),
        Notification::CancelRequestFailed { reason } => observer.cancel_request_failed(&reason),
    }
}

fn map_event(event: ChannelEvent) -> Msg {
    match event {
        ChannelEvent::JobAssigned { job_id } => Msg::JobAssigned { job_id },
        ChannelEvent::Status { text } => Msg::StatusReported { text },
        ChannelEvent::UrlProgress(counter) => Msg::UrlProgress(counter),
        ChannelEvent::DetailProgress(counter) => Msg::DetailProgress(counter),
        ChannelEvent::Result { file_name, preview } => Msg::ResultReady { file_name, preview },
        ChannelEvent::Cancelled { message } => Msg::CancelConfirmed { message },
        ChannelEvent::TransportError { message } => Msg::TransportError { message },
    }
}
