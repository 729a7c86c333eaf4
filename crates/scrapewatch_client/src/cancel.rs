use async_trait::async_trait;
use serde::Serialize;

use client_logging::client_debug;

use crate::{CancelError, ClientSettings};

/// One-shot cancellation side channel. Reports delivery of the request, not
/// the fate of the job; confirmation arrives on the event channel.
#[async_trait]
pub trait CancelRequester: Send + Sync {
    async fn request_cancel(&self, job_id: &str) -> Result<(), CancelError>;
}

#[derive(Serialize)]
struct CancelBody<'a> {
    job_id: &'a str,
}

/// Posts the cancellation to the `scrape/cancel` endpoint.
pub struct HttpCancelRequester {
    settings: ClientSettings,
}

impl HttpCancelRequester {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, CancelError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.cancel_timeout)
            .build()
            .map_err(|err| CancelError::Network(err.to_string()))
    }
}

#[async_trait]
impl CancelRequester for HttpCancelRequester {
    async fn request_cancel(&self, job_id: &str) -> Result<(), CancelError> {
        let url = self
            .settings
            .endpoint("scrape/cancel")
            .map_err(|err| CancelError::InvalidUrl(err.to_string()))?;

        let client = self.build_client()?;
        let response = client
            .post(url.as_str())
            .json(&CancelBody { job_id })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CancelError::HttpStatus(status.as_u16()));
        }
        client_debug!("cancel request delivered for job {}", job_id);
        Ok(())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CancelError {
    if err.is_timeout() {
        return CancelError::Timeout(err.to_string());
    }
    CancelError::Network(err.to_string())
}
