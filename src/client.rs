use crate::fetch::{FetchDescriptor, FetchExecutor, FetchPayload, Method, RequestBody};
use crate::{Result, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default reqwest-backed [`FetchExecutor`].
#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    timeout: Duration,
}

impl FetchClient {
    /// Create a new fetch client with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a new fetch client with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self { client, timeout }
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchExecutor for FetchClient {
    async fn execute(&self, descriptor: &FetchDescriptor) -> Result<FetchPayload> {
        let mut request = match descriptor.method {
            Method::Get => self.client.get(&descriptor.url),
            Method::Post => self.client.post(&descriptor.url),
        };

        for (name, value) in &descriptor.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match &descriptor.body {
            Some(RequestBody::Text(text)) => request = request.body(text.clone()),
            Some(RequestBody::Form(form)) => request = request.form(form),
            None => {}
        }

        let response = request.timeout(self.timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.timeout)
            } else {
                SourceError::Network(e)
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(SourceError::Network)?;

        match status.as_u16() {
            200..=299 => Ok(FetchPayload {
                status: status.as_u16(),
                body,
                final_url,
            }),
            // Challenge interstitials ride 403/503; hand the document to the
            // guard instead of failing here.
            403 | 503 => Ok(FetchPayload {
                status: status.as_u16(),
                body,
                final_url,
            }),
            404 => Err(SourceError::NotFound(descriptor.url.clone())),
            401 => Err(SourceError::AuthRequired(descriptor.url.clone())),
            code => Err(SourceError::MalformedResponse(format!(
                "unexpected status {code} for {}",
                descriptor.url
            ))),
        }
    }
}
