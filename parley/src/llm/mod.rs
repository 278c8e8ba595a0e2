mod api;
pub mod prompts;
mod provider;
mod reasoning;

pub use api::LlmApiClient;
pub use provider::{CompletionOptions, LlmBackend, LlmProvider};
pub use reasoning::{decide_as, parse_decision_text, LlmReasoner, ReasoningCapability};
