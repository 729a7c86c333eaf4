use std::time::Duration;

/// Server address used when no base url is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Connection settings shared by the event channel and the cancel requester.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Server base url; the scrape and cancel endpoints are joined onto it.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Upper bound on one cancel request round trip. The event stream itself
    /// carries no read timeout: a quiet channel stays open until the server
    /// ends it.
    pub cancel_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            cancel_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientSettings {
    pub(crate) fn endpoint(&self, path: &str) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&self.base_url)?.join(path)
    }
}
