//! Scrapewatch client: the push channel, cancellation requester and session
//! driver that sit between the HTTP server and the pure core.

mod cancel;
mod channel;
mod config;
mod error;
mod event;
mod session;
mod sse;

pub use cancel::{CancelRequester, HttpCancelRequester};
pub use channel::{EventChannel, EventSubscription, SseEventChannel};
pub use config::{ClientSettings, DEFAULT_BASE_URL};
pub use error::{CancelError, ChannelError};
pub use event::ChannelEvent;
pub use session::{SessionHandle, SessionObserver};
