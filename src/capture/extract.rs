use crate::capture::infer::{VisionClient, STRICT_JSON_DIRECTIVE, VISION_SYSTEM_PROMPT};
use crate::errors::{ScoutError, ScoutResult};

/// Hard ceiling on model calls per capture request. Exactly one retry: the
/// worst case is two calls, auditable here rather than in control flow.
const MAX_EXTRACT_ATTEMPTS: usize = 2;

/// How much of an unparseable model reply is logged for diagnosis.
const RAW_LOG_PREFIX: usize = 200;

/// The two attempts the extractor may make, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Base instruction as-is.
    Initial,
    /// Instruction strengthened with an explicit JSON-only directive.
    StrictRetry,
}

const ATTEMPTS: [Attempt; MAX_EXTRACT_ATTEMPTS] = [Attempt::Initial, Attempt::StrictRetry];

impl Attempt {
    fn system_prompt(self) -> String {
        match self {
            Attempt::Initial => VISION_SYSTEM_PROMPT.to_string(),
            Attempt::StrictRetry => format!("{VISION_SYSTEM_PROMPT}{STRICT_JSON_DIRECTIVE}"),
        }
    }
}

/// Invoke the vision model and parse its output as JSON, re-invoking once
/// with a strengthened instruction on parse failure. The raw output never
/// leaves this function: on terminal failure only a truncated prefix is
/// logged and a generic error is surfaced.
pub async fn extract_plan(
    client: &VisionClient,
    goal: &str,
    data_url: &str,
) -> ScoutResult<serde_json::Value> {
    let mut last_raw = String::new();

    for attempt in ATTEMPTS {
        let raw = client.infer(&attempt.system_prompt(), goal, data_url).await?;

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(plan) => {
                tracing::debug!(?attempt, "model output parsed as JSON");
                return Ok(plan);
            }
            Err(e) => {
                tracing::warn!(?attempt, error = %e, "model output failed to parse");
                last_raw = raw;
            }
        }
    }

    let prefix: String = last_raw.chars().take(RAW_LOG_PREFIX).collect();
    tracing::error!(raw_prefix = %prefix, "extraction failed after retry");
    Err(ScoutError::ModelOutput(
        "Model returned invalid JSON.".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::errors::ScoutResult;
    use crate::llm::provider::LlmProvider;
    use crate::llm::types::{
        CallConfig, ChatMessage, LlmResponse, MessageContent, StreamChunk, ToolDef,
    };

    /// Fake model that replays scripted replies and records the system
    /// prompts it was called with.
    struct ScriptedModel {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            _tools: Vec<ToolDef>,
            _cfg: &CallConfig,
            _sink: Option<mpsc::Sender<StreamChunk>>,
        ) -> ScoutResult<LlmResponse> {
            if let MessageContent::Text(system) = &messages[0].content {
                self.prompts.lock().unwrap().push(system.clone());
            }
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: self.replies[idx.min(self.replies.len() - 1)].to_string(),
                ..Default::default()
            })
        }
    }

    fn client_for(model: Arc<ScriptedModel>) -> VisionClient {
        VisionClient::new(
            model,
            CallConfig {
                model: "fake-vision".into(),
                stream: false,
                temperature: 0.1,
                max_steps: 5,
            },
        )
    }

    #[tokio::test]
    async fn first_attempt_success_makes_one_call() {
        let model = ScriptedModel::new(vec![r#"{"screen_summary":"home"}"#]);
        let client = client_for(model.clone());

        let plan = extract_plan(&client, "Open settings menu", "data:image/png;base64,")
            .await
            .unwrap();
        assert_eq!(plan["screen_summary"], "home");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_then_valid_makes_exactly_two_calls() {
        let model = ScriptedModel::new(vec!["Sure! Here is the plan:", r#"{"confidence":0.9}"#]);
        let client = client_for(model.clone());

        let plan = extract_plan(&client, "Open settings menu", "data:image/png;base64,")
            .await
            .unwrap();
        assert_eq!(plan["confidence"], 0.9);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);

        // The retry carries the strengthened instruction, the first call does not.
        let prompts = model.prompts.lock().unwrap();
        assert!(!prompts[0].contains("parseable JSON only"));
        assert!(prompts[1].contains("parseable JSON only"));
    }

    #[tokio::test]
    async fn double_failure_is_terminal_and_never_leaks_raw_output() {
        let model = ScriptedModel::new(vec!["not json", "still not json"]);
        let client = client_for(model.clone());

        let err = extract_plan(&client, "Open settings menu", "data:image/png;base64,")
            .await
            .unwrap_err();
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        let msg = err.to_string();
        assert!(msg.contains("Model returned invalid JSON."));
        assert!(!msg.contains("still not json"));
    }

    #[tokio::test]
    async fn provider_error_propagates_without_retry() {
        struct FailingModel {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl LlmProvider for FailingModel {
            fn name(&self) -> &str {
                "failing"
            }
            async fn chat(
                &self,
                _messages: Vec<ChatMessage>,
                _tools: Vec<ToolDef>,
                _cfg: &CallConfig,
                _sink: Option<mpsc::Sender<StreamChunk>>,
            ) -> ScoutResult<LlmResponse> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(crate::errors::ScoutError::LlmProvider("boom".into()))
            }
        }

        let model = Arc::new(FailingModel {
            calls: AtomicUsize::new(0),
        });
        let client = VisionClient::new(
            model.clone(),
            CallConfig {
                model: "fake-vision".into(),
                stream: false,
                temperature: 0.1,
                max_steps: 5,
            },
        );

        // Transport failures are not parse failures; the retry is reserved
        // for syntactically invalid output.
        let err = extract_plan(&client, "Open settings menu", "data:image/png;base64,")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
