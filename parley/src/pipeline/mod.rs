//! Turn interpretation as an explicit state machine:
//! Preprocess → RouteCollection → RouteDocument → DecideAction → Execute.
//!
//! Every stage returns [`StageOutcome`]. `Exit` ends the turn with a reply and no
//! store mutation; `Err` is fatal. Only Execute writes, and resolutions reach the
//! cache only after it succeeds.

pub mod decisions;
pub mod format;
mod stages;

pub use stages::{Action, Preprocessed, ResolvedMention, RoutedCollection, SchemaPlan, Targets};

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::context::{last_in, ContextManager, ResolvedValue, LAST_KEY};
use crate::error::{ErrorClass, ParleyError, Result};
use crate::llm::{decide_as, ReasoningCapability};
use crate::models::{ConversationTurn, InboundMessage, Reply, TurnStatus};
use crate::services::DocumentService;
use crate::temporal::ResolveContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    RouteCollection,
    RouteDocument,
    DecideAction,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocess => write!(f, "preprocess"),
            Self::RouteCollection => write!(f, "route_collection"),
            Self::RouteDocument => write!(f, "route_document"),
            Self::DecideAction => write!(f, "decide_action"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Chit-chat or help, answered without touching the store.
    Conversational,
    /// More than one collection fits.
    Ambiguous,
    /// A back-reference had nothing to point at.
    UnresolvedReference,
    NotFound,
    /// The request would produce invalid data.
    Invalid,
}

impl ExitReason {
    pub fn status(&self) -> TurnStatus {
        match self {
            ExitReason::Conversational => TurnStatus::Ok,
            _ => TurnStatus::Clarification,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarlyExit {
    pub reason: ExitReason,
    pub reply: Reply,
}

impl EarlyExit {
    pub fn new(reason: ExitReason, text: impl Into<String>) -> Self {
        Self {
            reason,
            reply: Reply::markdown(text),
        }
    }

    /// Store errors a user can act on become exits; anything else stays an error.
    pub fn from_domain_error(error: &ParleyError) -> Option<Self> {
        match error.class() {
            ErrorClass::Validation => Some(Self::new(
                ExitReason::Invalid,
                format!("I couldn't do that. {error}"),
            )),
            ErrorClass::NotFound => Some(Self::new(ExitReason::NotFound, error.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Advance(T),
    Exit(EarlyExit),
}

impl<T> StageOutcome<T> {
    pub fn exit(reason: ExitReason, text: impl Into<String>) -> Self {
        StageOutcome::Exit(EarlyExit::new(reason, text))
    }
}

/// Turns a domain failure into an exit and passes the rest through.
pub(crate) fn exit_on_domain_error<T>(
    result: Result<T>,
) -> Result<std::result::Result<T, EarlyExit>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(error) => match EarlyExit::from_domain_error(&error) {
            Some(exit) => Ok(Err(exit)),
            None => Err(error),
        },
    }
}

/// Everything a stage may read about the turn in progress.
#[derive(Clone)]
pub struct TurnContext {
    pub message: InboundMessage,
    pub history: Vec<ConversationTurn>,
    pub context: ContextManager,
    pub now: DateTime<Utc>,
    /// Sequence number the inbound message will be stored under.
    pub seq: i64,
    /// Resolutions made this turn, cached only once the turn completes.
    pending: Arc<Mutex<Vec<(String, ResolvedValue)>>>,
}

impl TurnContext {
    pub fn new(
        message: InboundMessage,
        history: Vec<ConversationTurn>,
        context: ContextManager,
        now: DateTime<Utc>,
    ) -> Self {
        let seq = history.last().map(|turn| turn.seq + 1).unwrap_or(1);
        Self {
            message,
            history,
            context,
            now,
            seq,
            pending: Arc::default(),
        }
    }

    /// Overrides the sequence number guessed from the history window.
    pub fn at_seq(mut self, seq: i64) -> Self {
        self.seq = seq;
        self
    }

    /// Queues a resolution for the cache.
    pub fn remember(&self, expression: &str, value: ResolvedValue) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((expression.to_string(), value));
    }

    /// Queues `document_id` as the last document touched, overall and in `collection`.
    pub fn remember_touched(&self, collection: &str, document_id: &str) {
        let value = ResolvedValue::Document {
            collection: collection.to_string(),
            id: document_id.to_string(),
        };
        self.remember(&last_in(collection), value.clone());
        self.remember(LAST_KEY, value);
    }

    /// Writes the queued resolutions to the cache in the order they were made.
    pub fn commit_resolutions(&self) -> usize {
        let pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (expression, value) in &pending {
            self.context.cache_resolution(
                self.user_id(),
                self.conversation_id(),
                expression,
                value.clone(),
                self.seq,
            );
        }
        pending.len()
    }

    pub fn user_id(&self) -> &str {
        &self.message.user_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.message.conversation_id
    }

    pub fn resolve_context(&self) -> ResolveContext {
        ResolveContext {
            time_zone: self.message.time_zone,
            first_day_of_week: self.message.first_day_of_week,
            now: self.now,
        }
    }

    pub fn local_now(&self) -> String {
        self.now
            .with_timezone(&self.message.time_zone)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub status: TurnStatus,
    pub reply: Reply,
    /// Set when a stage ended the turn early.
    pub exited_at: Option<Stage>,
}

impl PipelineResult {
    fn completed(reply: Reply) -> Self {
        Self {
            status: TurnStatus::Ok,
            reply,
            exited_at: None,
        }
    }

    fn exited(stage: Stage, exit: EarlyExit) -> Self {
        Self {
            status: exit.reason.status(),
            reply: exit.reply,
            exited_at: Some(stage),
        }
    }
}

macro_rules! advance {
    ($stage:expr, $outcome:expr) => {
        match $outcome? {
            StageOutcome::Advance(output) => output,
            StageOutcome::Exit(exit) => {
                tracing::info!(stage = %$stage, reason = ?exit.reason, "Turn exited early");
                return Ok(PipelineResult::exited($stage, exit));
            }
        }
    };
}

#[derive(Clone)]
pub struct Pipeline {
    reasoner: Arc<dyn ReasoningCapability>,
    documents: DocumentService,
    stage_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        reasoner: Arc<dyn ReasoningCapability>,
        documents: DocumentService,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            reasoner,
            documents,
            stage_timeout,
        }
    }

    pub fn documents(&self) -> &DocumentService {
        &self.documents
    }

    pub(crate) async fn decide<T: DeserializeOwned>(
        &self,
        stage: Stage,
        prompt: &str,
    ) -> Result<T> {
        decide_as(self.reasoner.as_ref(), stage, prompt, self.stage_timeout).await
    }

    /// Runs the stages in order. No stage is retried.
    pub async fn run(&self, ctx: &TurnContext) -> Result<PipelineResult> {
        let span = |stage: Stage| {
            tracing::info_span!(
                "stage",
                stage = %stage,
                user_id = %ctx.user_id(),
                conversation_id = %ctx.conversation_id()
            )
        };

        let preprocessed = advance!(
            Stage::Preprocess,
            self.preprocess(ctx).instrument(span(Stage::Preprocess)).await
        );
        let routed = advance!(
            Stage::RouteCollection,
            self.route_collection(&preprocessed, ctx)
                .instrument(span(Stage::RouteCollection))
                .await
        );
        let targets = advance!(
            Stage::RouteDocument,
            self.route_document(&preprocessed, &routed, ctx)
                .instrument(span(Stage::RouteDocument))
                .await
        );
        let action = advance!(
            Stage::DecideAction,
            self.decide_action(&preprocessed, &routed, &targets, ctx)
                .instrument(span(Stage::DecideAction))
                .await
        );
        let reply = advance!(
            Stage::Execute,
            self.execute(routed, action, ctx)
                .instrument(span(Stage::Execute))
                .await
        );

        let cached = ctx.commit_resolutions();
        tracing::debug!(cached, "Turn completed");
        Ok(PipelineResult::completed(reply))
    }
}
