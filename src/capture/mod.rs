//! The capture pipeline: validate → encode → infer → extract.
//!
//! One screenshot and one goal in, one structured action plan ("brain") out.
//! All per-request data is owned by the request; the only side effects are
//! the outbound model call(s) and a diagnostic log line on total extraction
//! failure.

pub mod encode;
pub mod extract;
pub mod infer;
pub mod validate;

use std::sync::Arc;

use serde::Serialize;

use crate::config::{vision_model_override, DEFAULT_VISION_MODEL};
use crate::errors::ScoutError;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::CallConfig;

use self::encode::to_data_url;
use self::extract::extract_plan;
use self::infer::{VisionClient, CAPTURE_STEP_BUDGET};
use self::validate::{validate, RawCaptureForm, ValidationOutcome};

/// Metadata echoed back to the caller about what was accepted.
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedMeta {
    pub filename: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: usize,
    pub goal: String,
}

/// The response envelope. Constructed only here; handlers just serialize it.
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<ReceivedMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brain: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureResponse {
    fn success(received: ReceivedMeta, brain: serde_json::Value) -> Self {
        Self {
            ok: true,
            received: Some(received),
            brain: Some(brain),
            error: None,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            received: None,
            brain: None,
            error: Some(error.into()),
        }
    }
}

/// Entry point used by the HTTP handler: resolves the vision model from the
/// registry (honoring the request-time env override), then runs the pipeline.
pub async fn run(registry: &ProviderRegistry, form: RawCaptureForm) -> (u16, CaptureResponse) {
    if !registry.binding_configured() {
        return (503, CaptureResponse::failure("AI binding not configured."));
    }

    let (provider, mut cfg) = match registry.call_config_for_role("vision", CAPTURE_STEP_BUDGET) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "vision role resolution failed");
            return (503, CaptureResponse::failure("AI binding not configured."));
        }
    };

    if let Some(model) = vision_model_override() {
        cfg.model = model;
    } else if cfg.model.is_empty() {
        cfg.model = DEFAULT_VISION_MODEL.to_string();
    }
    // The capture call is one-shot structured output, never streamed.
    cfg.stream = false;

    run_with_provider(provider, cfg, form).await
}

/// The pipeline proper, parameterized over the provider so tests can drive
/// it with a fake model client.
pub async fn run_with_provider(
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
    form: RawCaptureForm,
) -> (u16, CaptureResponse) {
    let request = match validate(form) {
        ValidationOutcome::Accepted(request) => request,
        ValidationOutcome::Rejected(rejection) => {
            tracing::debug!(reason = rejection.reason, status = rejection.status, "capture rejected");
            return (rejection.status, CaptureResponse::failure(rejection.reason));
        }
    };

    let received = ReceivedMeta {
        filename: request.image.filename.clone(),
        content_type: request.image.content_type.clone(),
        size: request.image.bytes.len(),
        goal: request.goal.clone(),
    };

    let data_url = to_data_url(&request.image.content_type, &request.image.bytes);

    tracing::info!(
        goal = %received.goal,
        filename = %received.filename,
        size = received.size,
        model = %cfg.model,
        "running capture pipeline"
    );

    let client = VisionClient::new(provider, cfg);
    match extract_plan(&client, &request.goal, &data_url).await {
        Ok(brain) => (200, CaptureResponse::success(received, brain)),
        Err(ScoutError::ModelOutput(msg)) => (502, CaptureResponse::failure(msg)),
        Err(e) => {
            tracing::error!(error = %e, "capture model call failed");
            (502, CaptureResponse::failure("Upstream model call failed."))
        }
    }
}
