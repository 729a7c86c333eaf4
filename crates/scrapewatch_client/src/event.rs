use std::collections::BTreeMap;

use client_logging::{client_debug, client_warn};
use scrapewatch_core::{PreviewRow, ProgressCounter};
use serde::Deserialize;
use serde_json::Value;

use crate::sse::SseFrame;

/// Typed server event decoded from one push-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    JobAssigned {
        job_id: String,
    },
    Status {
        text: String,
    },
    UrlProgress(ProgressCounter),
    DetailProgress(ProgressCounter),
    Result {
        file_name: String,
        preview: Vec<PreviewRow>,
    },
    Cancelled {
        message: String,
    },
    /// Connection-level failure signal: a server-announced `error` event, or
    /// a synthetic one for a broken stream.
    TransportError {
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    current: u64,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    file_name: String,
    #[serde(default)]
    preview_data: Option<Vec<BTreeMap<String, Value>>>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

impl ChannelEvent {
    /// Decodes one frame; `None` for event names this client does not know.
    /// A malformed payload for a known name degrades to `TransportError` so
    /// a protocol violation ends the attempt instead of crashing it.
    pub(crate) fn from_frame(frame: &SseFrame) -> Option<ChannelEvent> {
        let event = match frame.event.as_str() {
            "job_id" => ChannelEvent::JobAssigned {
                job_id: frame.data.clone(),
            },
            "message" => ChannelEvent::Status {
                text: frame.data.clone(),
            },
            "url_progress" => match parse_counter(&frame.data) {
                Some(counter) => ChannelEvent::UrlProgress(counter),
                None => malformed("url_progress", &frame.data),
            },
            "progress" => match parse_counter(&frame.data) {
                Some(counter) => ChannelEvent::DetailProgress(counter),
                None => malformed("progress", &frame.data),
            },
            "result" => match serde_json::from_str::<ResultPayload>(&frame.data) {
                Ok(payload) => ChannelEvent::Result {
                    file_name: payload.file_name,
                    preview: preview_rows(payload.preview_data),
                },
                Err(_) => malformed("result", &frame.data),
            },
            "cancelled" => ChannelEvent::Cancelled {
                message: frame.data.clone(),
            },
            "error" => ChannelEvent::TransportError {
                message: extract_error_message(&frame.data),
            },
            other => {
                client_debug!("ignoring unknown event '{}'", other);
                return None;
            }
        };
        Some(event)
    }
}

fn parse_counter(data: &str) -> Option<ProgressCounter> {
    let payload: ProgressPayload = serde_json::from_str(data).ok()?;
    Some(ProgressCounter {
        current: payload.current,
        total: payload.total,
    })
}

fn malformed(event: &str, data: &str) -> ChannelEvent {
    client_warn!("malformed '{}' payload: {}", event, data);
    ChannelEvent::TransportError { message: None }
}

/// Best-effort extraction of the server's error text; anything that is not
/// `{"error": ...}` leaves the generic failure message to apply downstream.
fn extract_error_message(data: &str) -> Option<String> {
    serde_json::from_str::<ErrorPayload>(data)
        .ok()
        .map(|payload| payload.error)
}

/// Flattens preview objects into rows of column/value pairs, columns in
/// sorted order so rendering is deterministic.
fn preview_rows(rows: Option<Vec<BTreeMap<String, Value>>>) -> Vec<PreviewRow> {
    rows.unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(column, value)| (column, cell_text(value)))
                .collect()
        })
        .collect()
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
