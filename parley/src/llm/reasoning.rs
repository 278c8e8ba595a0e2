use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::llm::prompts;
use crate::llm::provider::{CompletionOptions, LlmProvider};
use crate::pipeline::Stage;

/// "Given a prompt, return a structured decision." The pipeline's only view of the model.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn decide(&self, stage: Stage, prompt: &str) -> Result<Value>;
}

/// Reasoner backed by an OpenAI-compatible chat model.
pub struct LlmReasoner {
    provider: LlmProvider,
    options: CompletionOptions,
}

impl LlmReasoner {
    pub fn new(provider: LlmProvider) -> Self {
        let temperature = provider
            .config()
            .and_then(|config| config.temperature)
            .or(Some(0.0));
        Self {
            provider,
            options: CompletionOptions {
                temperature,
                ..Default::default()
            },
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}

#[async_trait]
impl ReasoningCapability for LlmReasoner {
    async fn decide(&self, stage: Stage, prompt: &str) -> Result<Value> {
        let content = self
            .provider
            .complete(prompt, Some(prompts::system_prompt(stage)), Some(&self.options))
            .await?;
        parse_decision_text(&content)
    }
}

/// Parses model output as JSON, tolerating a surrounding markdown code fence or prose.
pub fn parse_decision_text(content: &str) -> Result<Value> {
    let trimmed = strip_code_fence(content.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    // Fall back to the outermost object in the text.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }
    let preview: String = content.chars().take(100).collect();
    tracing::warn!(
        response_len = content.len(),
        response_preview = %preview,
        "Decision is not JSON"
    );
    Err(ParleyError::InvalidDecision(
        "the reasoning step did not return JSON".to_string(),
    ))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Asks the reasoner for a decision and parses it into `T` within `timeout`.
pub async fn decide_as<T: DeserializeOwned>(
    reasoner: &dyn ReasoningCapability,
    stage: Stage,
    prompt: &str,
    timeout: Duration,
) -> Result<T> {
    let value = tokio::time::timeout(timeout, reasoner.decide(stage, prompt))
        .await
        .map_err(|_| ParleyError::ReasoningTimeout(timeout.as_secs()))??;

    serde_json::from_value(value).map_err(|error| {
        tracing::warn!(stage = %stage, error = %error, "Decision has the wrong shape");
        ParleyError::InvalidDecision(format!("{stage} decision was malformed: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Fixed(Value);

    #[async_trait]
    impl ReasoningCapability for Fixed {
        async fn decide(&self, _stage: Stage, _prompt: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningCapability for Slow {
        async fn decide(&self, _stage: Stage, _prompt: &str) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Route {
        route: String,
    }

    #[test]
    fn test_fenced_json_is_accepted() {
        let value = parse_decision_text("```json\n{\"route\": \"existing\"}\n```").unwrap();
        assert_eq!(value, json!({"route": "existing"}));
    }

    #[test]
    fn test_prose_around_json_is_tolerated() {
        let value = parse_decision_text("Sure! {\"kind\": \"delete\"} Hope that helps").unwrap();
        assert_eq!(value, json!({"kind": "delete"}));
    }

    #[test]
    fn test_non_json_is_an_invalid_decision() {
        assert!(matches!(
            parse_decision_text("I could not decide"),
            Err(ParleyError::InvalidDecision(_))
        ));
    }

    #[tokio::test]
    async fn test_decide_as_parses_shape() {
        let reasoner = Fixed(json!({"route": "create"}));
        let route: Route = decide_as(&reasoner, Stage::RouteCollection, "p", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(route.route, "create");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_an_invalid_decision() {
        let reasoner = Fixed(json!({"unexpected": true}));
        let result: Result<Route> =
            decide_as(&reasoner, Stage::RouteCollection, "p", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ParleyError::InvalidDecision(_))));
    }

    #[tokio::test]
    async fn test_slow_reasoner_times_out() {
        let result: Result<Route> =
            decide_as(&Slow, Stage::Preprocess, "p", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ParleyError::ReasoningTimeout(_))));
    }

    #[test]
    fn test_reasoner_defaults_to_deterministic_sampling() {
        let reasoner = LlmReasoner::new(LlmProvider::unavailable("none"));
        assert_eq!(reasoner.options.temperature, Some(0.0));
        assert!(!reasoner.is_available());
    }
}
