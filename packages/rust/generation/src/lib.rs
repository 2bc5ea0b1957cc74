//! Client for the hosted text-generation endpoint.
//!
//! One `POST` per call: bearer-token auth, JSON body `{ prompt, max_tokens }`,
//! and a response whose `result` field is decoded by [`envelope`]. Failures are
//! never retried here; the caller decides what a failed generation means.

mod envelope;

use std::future::Future;
use std::time::{Duration, Instant};

use giftrefresh_shared::{Credentials, GenerationConfig, RefreshError, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

pub use envelope::{EXTRACTORS, Extractor, ResultPayload, extract_text};

use envelope::Envelope;

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("giftrefresh/", env!("CARGO_PKG_VERSION"));

/// Maximum number of body characters kept in an [`RefreshError::Upstream`].
const MAX_ERROR_BODY_CHARS: usize = 2_000;

// ---------------------------------------------------------------------------
// TextGenerator
// ---------------------------------------------------------------------------

/// Anything that turns a prompt into generated text.
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt` within a `max_tokens` budget.
    fn generate(&self, prompt: &str, max_tokens: u32)
    -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// GenerationClient
// ---------------------------------------------------------------------------

/// Request body sent to the endpoint.
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

/// HTTP client bound to one account and model.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: Client,
    endpoint: Url,
    api_token: String,
}

impl GenerationClient {
    /// Build a client from config and already-resolved credentials.
    pub fn new(config: &GenerationConfig, credentials: &Credentials) -> Result<Self> {
        let endpoint = build_endpoint(&config.api_base, &credentials.account_id, &config.model)?;
        let http = build_client(config.timeout_secs)?;

        debug!(%endpoint, timeout_secs = config.timeout_secs, "generation client ready");

        Ok(Self {
            http,
            endpoint,
            api_token: credentials.api_token.clone(),
        })
    }

    /// The fully-resolved endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl TextGenerator for GenerationClient {
    #[instrument(skip_all, fields(prompt_chars = prompt.len(), max_tokens = max_tokens))]
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let start = Instant::now();

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_token)
            .json(&GenerationRequest { prompt, max_tokens })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(RefreshError::Upstream {
                status: status.as_u16(),
                body: clip(&body),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| RefreshError::parse(format!("invalid generation response: {e}")))?;

        if envelope.success == Some(false) {
            let errors = serde_json::to_string(&envelope.errors).unwrap_or_default();
            return Err(RefreshError::Upstream {
                status: status.as_u16(),
                body: clip(&errors),
            });
        }

        let payload = ResultPayload::from(envelope.result);
        let text = extract_text(&payload).ok_or(RefreshError::EmptyResponse)?;

        info!(
            chars = text.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "generation complete"
        );

        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build `<api_base>/accounts/<account>/ai/run/<model...>`.
///
/// Every segment of the slash-delimited model path is percent-encoded on its
/// own, so the slashes between segments survive.
pub fn build_endpoint(api_base: &str, account_id: &str, model: &str) -> Result<Url> {
    let mut url = Url::parse(api_base)
        .map_err(|e| RefreshError::config(format!("invalid api_base '{api_base}': {e}")))?;

    url.path_segments_mut()
        .map_err(|()| RefreshError::config(format!("api_base '{api_base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(["accounts", account_id, "ai", "run"])
        .extend(model.split('/'));

    Ok(url)
}

/// Build a reqwest client with an explicit request timeout.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RefreshError::Network(format!("failed to build HTTP client: {e}")))
}

fn transport_error(e: reqwest::Error) -> RefreshError {
    if e.is_timeout() {
        RefreshError::Network(format!("generation request timed out: {e}"))
    } else {
        RefreshError::Network(format!("generation request failed: {e}"))
    }
}

fn clip(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
