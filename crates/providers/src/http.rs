//! Generic adapter for REST providers that follow the task-id protocol.
//!
//! `POST {submit_url}` with the generation payload returns `{"id": ...}`;
//! `GET {status_url}?id=...` returns `{"status": "Ready" | "Failed" | ...}`
//! with the output under `result` once ready. Any other status is pending.

use artgen_core::generation::{GenerationRequest, OutputDescriptor, STYLE_NONE};
use artgen_core::polling::PollPolicy;
use async_trait::async_trait;
use serde::Deserialize;

use crate::adapter::{PollOutcome, ProviderAdapter, ProviderError, TaskHandle};

/// Default output edge length when the provider omits dimensions.
const DEFAULT_DIMENSION: u32 = 1024;

const DEFAULT_STEPS: u32 = 25;
const DEFAULT_GUIDANCE: f64 = 7.5;

/// How far an image-to-image result may drift from the input.
const IMAGE_STRENGTH: f64 = 0.75;

/// Connection settings for one REST provider.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Registry key, e.g. `"flux"`.
    pub name: String,
    pub submit_url: String,
    pub status_url: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub poll_policy: PollPolicy,
}

impl HttpProviderConfig {
    pub fn new(
        name: impl Into<String>,
        submit_url: impl Into<String>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            submit_url: submit_url.into(),
            status_url: status_url.into(),
            api_key: None,
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

/// Body of a status check.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<StatusResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub sample: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// [`ProviderAdapter`] over a task-id REST API.
pub struct HttpTaskAdapter {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpTaskAdapter {
    /// Each HTTP request is capped at the provider's polling budget.
    pub fn new(config: HttpProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.poll_policy.max_elapsed)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Create an adapter reusing an existing [`reqwest::Client`]
    /// (connection pooling across providers).
    pub fn with_client(client: reqwest::Client, config: HttpProviderConfig) -> Self {
        Self { client, config }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`ProviderError::Api`] carrying status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ProviderAdapter for HttpTaskAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn poll_policy(&self) -> PollPolicy {
        self.config.poll_policy.clone()
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<TaskHandle, ProviderError> {
        tracing::info!(
            provider = %self.config.name,
            model = request.model_id(),
            has_image = request.has_input_image(),
            aspect_ratio = request.aspect_ratio.as_deref().unwrap_or("1:1"),
            "Submitting generation",
        );

        let response = self
            .authorize(self.client.post(&self.config.submit_url))
            .json(&build_submit_body(request))
            .send()
            .await?;
        let body: SubmitResponse = Self::parse_response(response).await?;

        let task_id = body
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Malformed("submit response has no task id".into()))?;

        Ok(TaskHandle::new(task_id)
            .with_meta(serde_json::json!({ "model": request.model_id() })))
    }

    async fn poll(&self, task: &TaskHandle) -> Result<PollOutcome, ProviderError> {
        let response = self
            .authorize(self.client.get(&self.config.status_url))
            .query(&[("id", task.task_id.as_str())])
            .send()
            .await?;
        let body: StatusResponse = Self::parse_response(response).await?;

        let model = task
            .meta
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default();
        interpret_status(body, model)
    }
}

// ---------------------------------------------------------------------------
// Payload mapping
// ---------------------------------------------------------------------------

/// Output dimensions for a supported aspect ratio; square otherwise.
pub fn dimensions_for(aspect_ratio: Option<&str>) -> (u32, u32) {
    match aspect_ratio {
        Some("16:9") => (1344, 768),
        Some("9:16") => (768, 1344),
        Some("4:3") => (1152, 896),
        Some("3:4") => (896, 1152),
        Some("3:2") => (1216, 832),
        Some("2:3") => (832, 1216),
        _ => (DEFAULT_DIMENSION, DEFAULT_DIMENSION),
    }
}

/// Strip a `data:image/...;base64,` prefix, leaving the raw base64.
fn strip_data_url(image: &str) -> &str {
    match image.strip_prefix("data:image/") {
        Some(rest) => rest.split_once(";base64,").map_or(image, |(_, data)| data),
        None => image,
    }
}

/// JSON body for the submit call.
pub fn build_submit_body(request: &GenerationRequest) -> serde_json::Value {
    let prompt = match request.style.as_deref() {
        Some(style) if !style.is_empty() && style != STYLE_NONE => {
            format!("{}, {style} style", request.prompt)
        }
        _ => request.prompt.clone(),
    };
    let (width, height) = dimensions_for(request.aspect_ratio.as_deref());

    let mut body = serde_json::json!({
        "prompt": prompt,
        "model": request.model_id(),
        "width": width,
        "height": height,
        "steps": DEFAULT_STEPS,
        "guidance": DEFAULT_GUIDANCE,
        "num_images": request.batch_size.max(1),
    });
    if let Some(image) = request.input_image.as_deref() {
        body["init_image"] = serde_json::Value::String(strip_data_url(image).to_string());
        body["image_strength"] = serde_json::json!(IMAGE_STRENGTH);
    }
    body
}

/// Map a status body onto a [`PollOutcome`].
pub fn interpret_status(body: StatusResponse, model: &str) -> Result<PollOutcome, ProviderError> {
    match body.status.as_str() {
        "Ready" => {
            let result = body
                .result
                .ok_or_else(|| ProviderError::Malformed("ready task has no result".into()))?;
            let url = result
                .sample
                .ok_or_else(|| ProviderError::Malformed("ready task has no sample".into()))?;
            Ok(PollOutcome::Success(OutputDescriptor {
                url,
                width: result.width.unwrap_or(DEFAULT_DIMENSION),
                height: result.height.unwrap_or(DEFAULT_DIMENSION),
                model: model.to_string(),
            }))
        }
        "Failed" | "Error" | "Content Moderated" | "Request Moderated" => Ok(PollOutcome::Failure(
            body.error.unwrap_or_else(|| body.status.clone()),
        )),
        _ => Ok(PollOutcome::Pending),
    }
}
