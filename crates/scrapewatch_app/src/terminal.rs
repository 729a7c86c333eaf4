//! Terminal presentation of session callbacks.

use std::sync::Arc;

use tokio::sync::mpsc;

use scrapewatch_client::SessionObserver;
use scrapewatch_core::{JobPhase, PreviewRow, ProgressCounter, ProgressKind};

/// How the job ended, forwarded to `main` for the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded,
    Cancelled,
    Failed,
}

/// Prints session callbacks as terminal lines and signals the terminal
/// outcome through a channel.
pub struct TerminalObserver {
    base_url: String,
    done_tx: mpsc::UnboundedSender<SessionOutcome>,
}

impl TerminalObserver {
    pub fn new(base_url: String) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionOutcome>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { base_url, done_tx }), done_rx)
    }

    fn finish(&self, outcome: SessionOutcome) {
        let _ = self.done_tx.send(outcome);
    }
}

impl SessionObserver for TerminalObserver {
    fn phase_changed(&self, phase: JobPhase, detail: Option<&str>) {
        match detail {
            Some(text) => println!("[{}] {}", phase, text),
            None => println!("[{}]", phase),
        }
    }

    fn progress(&self, kind: ProgressKind, counter: ProgressCounter) {
        let label = match kind {
            ProgressKind::UrlCollection => "urls",
            ProgressKind::DetailFetch => "details",
        };
        match counter.ratio() {
            Some(ratio) => println!(
                "  {}: {}/{} ({:.0}%)",
                label,
                counter.current,
                counter.total,
                ratio * 100.0
            ),
            None => println!("  {}: {}/{}", label, counter.current, counter.total),
        }
    }

    fn succeeded(&self, file_name: &str, preview: &[PreviewRow]) {
        println!("Job finished: {}", file_name);
        println!("Download: {}", download_url(&self.base_url, file_name));
        if !preview.is_empty() {
            println!("Preview ({} rows):", preview.len());
            for row in preview {
                let line = row
                    .iter()
                    .map(|(column, value)| format!("{}={}", column, value))
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("  {}", line);
            }
        }
        self.finish(SessionOutcome::Succeeded);
    }

    fn cancelled(&self, message: &str) {
        println!("Job cancelled: {}", message);
        self.finish(SessionOutcome::Cancelled);
    }

    fn failed(&self, message: &str) {
        eprintln!("Job failed: {}", message);
        self.finish(SessionOutcome::Failed);
    }

    fn cancel_request_failed(&self, reason: &str) {
        eprintln!("Cancel request failed ({}); the job is still running.", reason);
    }
}

fn download_url(base_url: &str, file_name: &str) -> String {
    format!("{}/download/{}", base_url.trim_end_matches('/'), file_name)
}
