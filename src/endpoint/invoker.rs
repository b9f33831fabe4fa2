use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, Request, Url, header::CONTENT_TYPE};

use crate::args::DEFAULT_CONNECT_TIMEOUT;
use crate::error::{AppError, AppResult, HttpError};

use super::signing::apply_sigv4_headers;
use super::{EndpointConfig, InvokeError, Invoker, InvokerFactory, SigV4Credentials};

const MAX_ERROR_MESSAGE_CHARS: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    /// Calls are unbounded when `None`.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpInvokerFactory {
    settings: ClientSettings,
}

impl HttpInvokerFactory {
    #[must_use]
    pub const fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }
}

impl InvokerFactory for HttpInvokerFactory {
    fn build(&self, endpoint: &EndpointConfig) -> AppResult<Arc<dyn Invoker>> {
        Ok(Arc::new(HttpInvoker::new(endpoint, self.settings)?))
    }
}

pub struct HttpInvoker {
    client: Client,
    url: Url,
    content_type: String,
    credentials: Option<SigV4Credentials>,
}

impl HttpInvoker {
    /// # Errors
    ///
    /// Returns an error when credentials are incomplete, the invocation URL
    /// is invalid, or the HTTP client cannot be built.
    pub fn new(endpoint: &EndpointConfig, settings: ClientSettings) -> AppResult<Self> {
        let credentials = endpoint.credentials().map_err(AppError::validation)?;
        let url = endpoint.invocation_url()?;

        let mut client_builder = Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.request_timeout {
            client_builder = client_builder.timeout(timeout);
        }
        let client = client_builder
            .build()
            .map_err(|err| AppError::http(HttpError::BuildClientFailed { source: err }))?;

        tracing::debug!(
            "Invoker ready for {} (signed: {})",
            url,
            credentials.is_some()
        );

        Ok(Self {
            client,
            url,
            content_type: endpoint.content_type().to_owned(),
            credentials,
        })
    }

    fn build_request(&self, payload: &Bytes) -> Result<Request, InvokeError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, self.content_type.as_str())
            .body(payload.clone());
        if let Some(credentials) = self.credentials.as_ref() {
            builder = apply_sigv4_headers(
                builder,
                &self.url,
                &[("content-type", self.content_type.as_str())],
                payload,
                credentials,
            )
            .map_err(|err| InvokeError::Signing { source: err })?;
        }
        builder
            .build()
            .map_err(|err| InvokeError::Signing {
                source: HttpError::BuildRequestFailed { source: err },
            })
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, payload: &Bytes) -> Result<u16, InvokeError> {
        let request = self.build_request(payload)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| InvokeError::Transport { source: err })?;
        let status = response.status();
        if status.is_success() {
            drain_response_body(response)
                .await
                .map_err(|err| InvokeError::Transport { source: err })?;
            return Ok(status.as_u16());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| InvokeError::Transport { source: err })?;
        Err(InvokeError::Endpoint {
            status: status.as_u16(),
            message: endpoint_error_message(&body),
        })
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}

/// Runtime errors arrive as `{"message": ...}` (or `Message`); anything
/// else is reported as raw text.
pub(super) fn endpoint_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = value
            .get("message")
            .or_else(|| value.get("Message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return truncate_chars(message);
        }
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "empty response body".to_owned();
    }
    truncate_chars(trimmed)
}

fn truncate_chars(value: &str) -> String {
    value.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
