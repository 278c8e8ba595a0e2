use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::context::ContextManager;
use crate::error::{ErrorClass, ParleyError, Result};
use crate::lock::{DistributedMutex, LockKey};
use crate::models::{InboundMessage, Reply, TurnOutcome, TurnStatus};
use crate::pipeline::{Pipeline, PipelineResult, TurnContext};

const BUSY_REPLY: &str =
    "I'm still working on your previous message. Please try again in a moment.";
const FAILURE_REPLY: &str = "Something went wrong while handling that. Please try again.";

/// Owns a turn end to end: lock, history, pipeline, persistence, release.
#[derive(Clone)]
pub struct MessageService {
    context: ContextManager,
    lock: DistributedMutex,
    pipeline: Pipeline,
    config: PipelineConfig,
    shutdown: CancellationToken,
}

impl MessageService {
    pub fn new(
        context: ContextManager,
        lock: DistributedMutex,
        pipeline: Pipeline,
        config: PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            context,
            lock,
            pipeline,
            config,
            shutdown,
        }
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Handles one inbound message. Messages for the same conversation are serialized
    /// by the distributed lock; a lock timeout answers `busy` without running anything.
    pub async fn handle(&self, message: InboundMessage) -> Result<TurnOutcome> {
        let span = tracing::info_span!(
            "turn",
            user_id = %message.user_id,
            conversation_id = %message.conversation_id
        );
        self.handle_locked(message).instrument(span).await
    }

    async fn handle_locked(&self, message: InboundMessage) -> Result<TurnOutcome> {
        let key = LockKey::new(&message.user_id, &message.conversation_id);
        let guard = match self.lock.acquire(&key).await {
            Ok(guard) => guard,
            Err(ParleyError::LockTimeout(resource)) => {
                tracing::warn!(resource = %resource, "Conversation is busy");
                return Ok(TurnOutcome {
                    conversation_id: message.conversation_id,
                    status: TurnStatus::Busy,
                    reply: Reply::markdown(BUSY_REPLY),
                });
            }
            Err(error) => return Err(error),
        };

        let turn_timeout = Duration::from_secs(self.config.turn_timeout_secs);
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(ParleyError::Internal("server is shutting down".to_string()))
            }
            lost = guard.keep_alive() => Err(lost),
            outcome = tokio::time::timeout(turn_timeout, self.run_turn(&message)) => {
                outcome.unwrap_or_else(|_| {
                    Err(ParleyError::ReasoningTimeout(self.config.turn_timeout_secs))
                })
            }
        };

        let (status, reply) = match result {
            Ok(PipelineResult { status, reply, .. }) => (status, reply),
            Err(ParleyError::LockLost(resource)) => {
                // Another turn may own the conversation now; leave its history alone.
                tracing::warn!(resource = %resource, "Turn abandoned after losing the lock");
                return Ok(TurnOutcome {
                    conversation_id: message.conversation_id,
                    status: TurnStatus::Busy,
                    reply: Reply::markdown(BUSY_REPLY),
                });
            }
            Err(error) => error_reply(&error),
        };

        if let Err(error) = self
            .context
            .append_exchange(
                &message.user_id,
                &message.conversation_id,
                &message.text,
                &reply.to_text(),
            )
            .await
        {
            tracing::error!(error = %error, "Failed to record the exchange");
        }

        if !guard.release().await {
            tracing::warn!("Lock expired before the turn finished");
        }

        Ok(TurnOutcome {
            conversation_id: message.conversation_id,
            status,
            reply,
        })
    }

    async fn run_turn(&self, message: &InboundMessage) -> Result<PipelineResult> {
        self.context
            .ensure_conversation(&message.user_id, &message.conversation_id, &message.text)
            .await?;
        let history = self
            .context
            .recent_window(
                &message.user_id,
                &message.conversation_id,
                self.config.history_window,
            )
            .await?;

        let seq = self
            .context
            .next_seq(&message.user_id, &message.conversation_id)
            .await?;

        let ctx = TurnContext::new(message.clone(), history, self.context.clone(), Utc::now())
            .at_seq(seq);
        self.pipeline.run(&ctx).await
    }
}

/// Maps an error that escaped the pipeline to the reply its class calls for.
pub fn error_reply(error: &ParleyError) -> (TurnStatus, Reply) {
    match error.class() {
        ErrorClass::Conversational => {
            let text = match error {
                ParleyError::UnresolvedReference(surface) => {
                    format!("I'm not sure what \"{surface}\" refers to. Which one do you mean?")
                }
                _ => "Sorry, I didn't quite follow. Could you say that another way?".to_string(),
            };
            tracing::info!(error = %error, "Turn needs clarification");
            (TurnStatus::Clarification, Reply::markdown(text))
        }
        ErrorClass::Validation => (
            TurnStatus::Clarification,
            Reply::markdown(format!("I couldn't do that. {error}")),
        ),
        ErrorClass::NotFound => (TurnStatus::Clarification, Reply::markdown(error.to_string())),
        ErrorClass::Concurrency => (TurnStatus::Busy, Reply::markdown(BUSY_REPLY)),
        ErrorClass::Infrastructure => {
            tracing::error!(error = %error, "Turn failed");
            (TurnStatus::Error, Reply::markdown(FAILURE_REPLY))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueReason;

    #[test]
    fn error_classes_map_to_statuses() {
        let (status, reply) = error_reply(&ParleyError::InvalidDecision("bad json".into()));
        assert_eq!(status, TurnStatus::Clarification);
        assert!(!reply.to_text().contains("bad json"));

        let (status, reply) = error_reply(&ParleyError::validation("amount", IssueReason::Missing));
        assert_eq!(status, TurnStatus::Clarification);
        assert!(reply.to_text().contains("amount"));

        let (status, _) = error_reply(&ParleyError::LockTimeout("k".into()));
        assert_eq!(status, TurnStatus::Busy);

        let (status, reply) = error_reply(&ParleyError::Internal("disk on fire".into()));
        assert_eq!(status, TurnStatus::Error);
        assert_eq!(reply.to_text(), FAILURE_REPLY);
    }

    #[test]
    fn unresolved_reference_names_the_phrase() {
        let (_, reply) = error_reply(&ParleyError::UnresolvedReference("that one".into()));
        assert!(reply.to_text().contains("\"that one\""));
    }
}
