use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

use scrapewatch_client::{
    CancelError, CancelRequester, ChannelError, ChannelEvent, EventChannel, EventSubscription,
    SessionHandle, SessionObserver,
};
use scrapewatch_core::{
    JobPhase, PreviewRow, ProgressCounter, ProgressKind, ASSUMED_CANCELLED_MESSAGE,
    CANCEL_PENDING_DETAIL, DEFAULT_FAILURE_MESSAGE,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(client_logging::initialize_for_tests);
}

/// Subscription fed from a test-side sender. Closing it makes later sends
/// fail, which is how tests prove the driver tore the attempt down.
struct FakeSubscription {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    closures: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSubscription for FakeSubscription {
    async fn next(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    fn close(&mut self) {
        self.closures.fetch_add(1, Ordering::SeqCst);
        self.rx.close();
    }
}

struct FakeAttempt {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closures: Arc<AtomicUsize>,
}

impl FakeAttempt {
    fn subscription() -> (FakeAttempt, Box<dyn EventSubscription>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closures = Arc::new(AtomicUsize::new(0));
        let attempt = FakeAttempt {
            tx,
            closures: Arc::clone(&closures),
        };
        (attempt, Box::new(FakeSubscription { rx, closures }))
    }

    fn send(&self, event: ChannelEvent) {
        self.tx.send(event).expect("subscription still live");
    }

    fn closures(&self) -> usize {
        self.closures.load(Ordering::SeqCst)
    }
}

/// Channel whose `open` calls pop a pre-scripted outcome.
struct ScriptedChannel {
    script: Mutex<VecDeque<Result<Box<dyn EventSubscription>, ChannelError>>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    fn new(script: Vec<Result<Box<dyn EventSubscription>, ChannelError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            opened: Mutex::new(Vec::new()),
        })
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventChannel for ScriptedChannel {
    async fn open(&self, selector: &str) -> Result<Box<dyn EventSubscription>, ChannelError> {
        self.opened.lock().unwrap().push(selector.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected channel open")
    }
}

enum CancelBehavior {
    Succeed,
    Fail(CancelError),
    Hang,
}

/// Requester that reports each delivered job id on a channel, so tests can
/// await the moment the cancel request actually went out.
struct FakeCancelRequester {
    script: Mutex<VecDeque<CancelBehavior>>,
    calls_tx: mpsc::UnboundedSender<String>,
}

impl FakeCancelRequester {
    fn new(script: Vec<CancelBehavior>) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let requester = Arc::new(Self {
            script: Mutex::new(script.into()),
            calls_tx,
        });
        (requester, calls_rx)
    }
}

#[async_trait]
impl CancelRequester for FakeCancelRequester {
    async fn request_cancel(&self, job_id: &str) -> Result<(), CancelError> {
        let _ = self.calls_tx.send(job_id.to_string());
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected cancel request");
        match behavior {
            CancelBehavior::Succeed => Ok(()),
            CancelBehavior::Fail(err) => Err(err),
            CancelBehavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Phase(JobPhase, Option<String>),
    Progress(ProgressKind, ProgressCounter),
    Succeeded(String, Vec<PreviewRow>),
    Cancelled(String),
    Failed(String),
    CancelRequestFailed(String),
}

struct RecordingObserver {
    tx: mpsc::UnboundedSender<Observed>,
}

impl RecordingObserver {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl SessionObserver for RecordingObserver {
    fn phase_changed(&self, phase: JobPhase, detail: Option<&str>) {
        let _ = self
            .tx
            .send(Observed::Phase(phase, detail.map(str::to_string)));
    }

    fn progress(&self, kind: ProgressKind, counter: ProgressCounter) {
        let _ = self.tx.send(Observed::Progress(kind, counter));
    }

    fn succeeded(&self, file_name: &str, preview: &[PreviewRow]) {
        let _ = self
            .tx
            .send(Observed::Succeeded(file_name.to_string(), preview.to_vec()));
    }

    fn cancelled(&self, message: &str) {
        let _ = self.tx.send(Observed::Cancelled(message.to_string()));
    }

    fn failed(&self, message: &str) {
        let _ = self.tx.send(Observed::Failed(message.to_string()));
    }

    fn cancel_request_failed(&self, reason: &str) {
        let _ = self.tx.send(Observed::CancelRequestFailed(reason.to_string()));
    }
}

async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("observer callback within two seconds")
        .expect("observer channel still open")
}

async fn next_call(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("cancel request within two seconds")
        .expect("requester channel still open")
}

/// Collects callbacks until `stop` matches, returning everything seen
/// including the matching one.
async fn observe_until(
    rx: &mut mpsc::UnboundedReceiver<Observed>,
    stop: impl Fn(&Observed) -> bool,
) -> Vec<Observed> {
    let mut seen = Vec::new();
    loop {
        let observed = next_observed(rx).await;
        let done = stop(&observed);
        seen.push(observed);
        if done {
            return seen;
        }
    }
}

fn counter(current: u64, total: u64) -> ProgressCounter {
    ProgressCounter { current, total }
}

fn phase(phase: JobPhase, detail: Option<&str>) -> Observed {
    Observed::Phase(phase, detail.map(str::to_string))
}

#[tokio::test]
async fn happy_path_streams_callbacks_in_order() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, _calls) = FakeCancelRequester::new(Vec::new());
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel.clone(), requester, observer);

    handle.start("14");
    attempt.send(ChannelEvent::JobAssigned {
        job_id: "abc".to_string(),
    });
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });
    attempt.send(ChannelEvent::UrlProgress(counter(1, 10)));
    attempt.send(ChannelEvent::UrlProgress(counter(10, 10)));
    attempt.send(ChannelEvent::DetailProgress(counter(0, 5)));
    attempt.send(ChannelEvent::DetailProgress(counter(5, 5)));
    attempt.send(ChannelEvent::Result {
        file_name: "x.csv".to_string(),
        preview: vec![vec![("a".to_string(), "1".to_string())]],
    });

    let seen = observe_until(&mut rx, |o| matches!(o, Observed::Succeeded(..))).await;
    assert_eq!(
        seen,
        vec![
            phase(JobPhase::Connecting, None),
            phase(JobPhase::Started, None),
            phase(JobPhase::Collecting, Some("Scanning listing pages.")),
            phase(JobPhase::CollectingUrls, None),
            Observed::Progress(ProgressKind::UrlCollection, counter(1, 10)),
            Observed::Progress(ProgressKind::UrlCollection, counter(10, 10)),
            phase(JobPhase::FetchingDetails, None),
            Observed::Progress(ProgressKind::DetailFetch, counter(0, 5)),
            Observed::Progress(ProgressKind::DetailFetch, counter(5, 5)),
            Observed::Succeeded(
                "x.csv".to_string(),
                vec![vec![("a".to_string(), "1".to_string())]],
            ),
        ]
    );
    assert_eq!(attempt.closures(), 1);
    assert!(attempt
        .tx
        .send(ChannelEvent::Status {
            text: "stale".to_string()
        })
        .is_err());

    assert_eq!(channel.opened(), vec!["14".to_string()]);
    handle.shutdown().await;
}

#[tokio::test]
async fn transport_error_during_cancellation_waits_for_confirmation() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, mut calls) = FakeCancelRequester::new(vec![CancelBehavior::Hang]);
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    attempt.send(ChannelEvent::JobAssigned {
        job_id: "abc".to_string(),
    });
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Collecting, _))).await;

    handle.cancel();
    assert_eq!(
        next_observed(&mut rx).await,
        phase(JobPhase::Cancelling, Some(CANCEL_PENDING_DETAIL)),
    );
    assert_eq!(next_call(&mut calls).await, "abc");

    attempt.send(ChannelEvent::TransportError { message: None });
    attempt.send(ChannelEvent::Cancelled {
        message: "Job stopped by user.".to_string(),
    });

    let seen = observe_until(&mut rx, |o| matches!(o, Observed::Cancelled(_))).await;
    assert_eq!(
        seen,
        vec![Observed::Cancelled("Job stopped by user.".to_string())]
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn stream_end_during_cancellation_is_assumed_cancelled() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, mut calls) = FakeCancelRequester::new(vec![CancelBehavior::Hang]);
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    attempt.send(ChannelEvent::JobAssigned {
        job_id: "abc".to_string(),
    });
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Collecting, _))).await;

    handle.cancel();
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Cancelling, _))).await;
    assert_eq!(next_call(&mut calls).await, "abc");

    drop(attempt);
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Cancelled(ASSUMED_CANCELLED_MESSAGE.to_string()),
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn failed_cancel_request_rolls_back_and_allows_retry() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, mut calls) = FakeCancelRequester::new(vec![
        CancelBehavior::Fail(CancelError::HttpStatus(500)),
        CancelBehavior::Fail(CancelError::HttpStatus(500)),
    ]);
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    attempt.send(ChannelEvent::JobAssigned {
        job_id: "abc".to_string(),
    });
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Collecting, _))).await;

    handle.cancel();
    assert_eq!(
        next_observed(&mut rx).await,
        phase(JobPhase::Cancelling, Some(CANCEL_PENDING_DETAIL)),
    );
    assert_eq!(next_call(&mut calls).await, "abc");
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::CancelRequestFailed("http status 500".to_string()),
    );
    assert_eq!(
        next_observed(&mut rx).await,
        phase(JobPhase::Collecting, Some("Scanning listing pages.")),
    );

    // The rollback re-enabled cancellation; the retry goes out again.
    handle.cancel();
    assert_eq!(
        next_observed(&mut rx).await,
        phase(JobPhase::Cancelling, Some(CANCEL_PENDING_DETAIL)),
    );
    assert_eq!(next_call(&mut calls).await, "abc");
    handle.shutdown().await;
}

#[tokio::test]
async fn cancel_before_job_id_sends_no_request() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, mut calls) = FakeCancelRequester::new(Vec::new());
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Started, _))).await;

    handle.cancel();
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });

    assert_eq!(
        next_observed(&mut rx).await,
        phase(JobPhase::Collecting, Some("Scanning listing pages.")),
    );
    assert!(calls.try_recv().is_err());
    handle.shutdown().await;
}

#[tokio::test]
async fn delivered_cancel_request_keeps_streaming_until_confirmation() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, mut calls) = FakeCancelRequester::new(vec![CancelBehavior::Succeed]);
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    attempt.send(ChannelEvent::JobAssigned {
        job_id: "abc".to_string(),
    });
    attempt.send(ChannelEvent::Status {
        text: "Scanning listing pages.".to_string(),
    });
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Collecting, _))).await;

    handle.cancel();
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Cancelling, _))).await;
    assert_eq!(next_call(&mut calls).await, "abc");

    // Progress keeps flowing while cancellation is pending, without any
    // phase movement away from cancelling.
    attempt.send(ChannelEvent::UrlProgress(counter(3, 10)));
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Progress(ProgressKind::UrlCollection, counter(3, 10)),
    );

    attempt.send(ChannelEvent::Cancelled {
        message: "Job stopped by user.".to_string(),
    });
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Cancelled("Job stopped by user.".to_string()),
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn restart_supersedes_the_previous_attempt() {
    init_logging();
    let (first, first_subscription) = FakeAttempt::subscription();
    let (second, second_subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(first_subscription), Ok(second_subscription)]);
    let (requester, _calls) = FakeCancelRequester::new(Vec::new());
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel.clone(), requester, observer);

    handle.start("1");
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Started, _))).await;

    handle.start("2");
    let seen = observe_until(&mut rx, |o| {
        matches!(o, Observed::Phase(JobPhase::Started, _))
    })
    .await;
    assert_eq!(
        seen,
        vec![
            phase(JobPhase::Connecting, None),
            phase(JobPhase::Started, None),
        ]
    );
    assert_eq!(first.closures(), 1);
    assert!(first
        .tx
        .send(ChannelEvent::Status {
            text: "stale".to_string()
        })
        .is_err());

    second.send(ChannelEvent::Result {
        file_name: "y.csv".to_string(),
        preview: Vec::new(),
    });
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Succeeded("y.csv".to_string(), Vec::new()),
    );
    assert_eq!(first.closures(), 1);
    assert_eq!(channel.opened(), vec!["1".to_string(), "2".to_string()]);
    handle.shutdown().await;
}

#[tokio::test]
async fn failed_open_reports_a_generic_failure() {
    init_logging();
    let channel = ScriptedChannel::new(vec![Err(ChannelError::HttpStatus(502))]);
    let (requester, _calls) = FakeCancelRequester::new(Vec::new());
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    assert_eq!(next_observed(&mut rx).await, phase(JobPhase::Connecting, None));
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Failed(DEFAULT_FAILURE_MESSAGE.to_string()),
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn stream_end_without_terminal_event_fails() {
    init_logging();
    let (attempt, subscription) = FakeAttempt::subscription();
    let channel = ScriptedChannel::new(vec![Ok(subscription)]);
    let (requester, _calls) = FakeCancelRequester::new(Vec::new());
    let (observer, mut rx) = RecordingObserver::new();
    let handle = SessionHandle::spawn(channel, requester, observer);

    handle.start("14");
    observe_until(&mut rx, |o| matches!(o, Observed::Phase(JobPhase::Started, _))).await;

    drop(attempt);
    assert_eq!(
        next_observed(&mut rx).await,
        Observed::Failed(DEFAULT_FAILURE_MESSAGE.to_string()),
    );
    handle.shutdown().await;
}
