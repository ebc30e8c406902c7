use std::sync::Arc;

use crate::errors::ScoutResult;
use crate::llm::budget::StepBudget;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, ImageUrl, MessageContent};

/// Step budget for one capture inference. No tools are offered, so a call
/// resolves in a single round; the budget bounds the provider loop anyway.
pub const CAPTURE_STEP_BUDGET: u32 = 5;

/// Base instruction for the vision model. Field completeness is enforced by
/// this contract, not by schema validation of the reply.
pub const VISION_SYSTEM_PROMPT: &str = "\
You are a UI automation planner. You are given a screenshot of a screen and \
a user goal. Analyze the screenshot and respond with a single JSON object \
containing exactly these fields:
- \"screen_summary\": one sentence describing what screen is shown
- \"ui_elements\": an array of at least 6 visible interactive elements, each \
with a short name and location description
- \"steps\": an array of at least 4 concrete UI actions that accomplish the \
goal from this screen
- \"confidence\": a number between 0 and 1
- \"need_new_screenshot\": boolean, true if the plan requires seeing a later \
screen before it can continue
- \"expected_next_screen\": one sentence describing the screen expected after \
the steps run";

/// Appended to the system prompt on the extractor's retry attempt.
pub const STRICT_JSON_DIRECTIVE: &str = "\n\nIMPORTANT: Output parseable JSON \
only. No prose, no markdown fences, no text before or after the JSON object.";

/// Wraps a single vision-capable model invocation. Retry policy lives in the
/// caller (the extractor), never here.
pub struct VisionClient {
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
}

impl VisionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: CallConfig) -> Self {
        Self { provider, cfg }
    }

    /// One multimodal call: system instruction + (image, goal) user turn.
    /// Returns the model's final text output.
    pub async fn infer(
        &self,
        system_prompt: &str,
        goal: &str,
        data_url: &str,
    ) -> ScoutResult<String> {
        let mut budget = StepBudget::new(self.cfg.max_steps);
        // With no tools offered, the first step is also the last.
        budget.consume();

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage {
                role: "user".into(),
                content: MessageContent::Parts(vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url.to_string(),
                        },
                    },
                    ContentPart::Text {
                        text: format!("Goal: {goal}"),
                    },
                ]),
                tool_call_id: None,
                tool_calls: None,
            },
        ];

        let response = self
            .provider
            .chat(messages, Vec::new(), &self.cfg, None)
            .await?;

        tracing::debug!(
            model = %self.cfg.model,
            steps_used = budget.used(),
            content_len = response.content.len(),
            "vision inference complete"
        );

        Ok(response.content)
    }
}
