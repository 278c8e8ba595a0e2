use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::llm::prompts;
use crate::models::{AggregateRequest, Filter, Operator, QueryRequest};
use crate::pipeline::decisions::ActionDecision;
use crate::pipeline::{
    exit_on_domain_error, ExitReason, Pipeline, Stage, StageOutcome, TurnContext,
};
use crate::query::{check_aggregate, check_sort, compile_filter};
use crate::schema;

use super::{Action, Preprocessed, RoutedCollection, Targets};

impl Pipeline {
    /// Chooses the operation and validates its payload against the routed schema.
    pub(crate) async fn decide_action(
        &self,
        input: &Preprocessed,
        routed: &RoutedCollection,
        targets: &Targets,
        ctx: &TurnContext,
    ) -> Result<StageOutcome<Action>> {
        let mode = match targets {
            Targets::New => "new entries",
            Targets::Documents(_) => "the entries listed below",
            Targets::Collection(_) => "the whole collection, filtered",
        };
        let prompt = prompts::decide_action_prompt(
            &input.text,
            &ctx.history,
            &routed.schema,
            mode,
            targets.documents(),
            &ctx.local_now(),
        );
        let decision: ActionDecision = self.decide(Stage::DecideAction, &prompt).await?;
        let outcome = match check_action(decision, routed, targets) {
            // New entries are checked as one batch against what is already stored.
            Ok(StageOutcome::Advance(Action::Create(raws))) => self
                .documents()
                .check_batch(&routed.schema, &raws, ctx.now)
                .await
                .map(|_| StageOutcome::Advance(Action::Create(raws))),
            other => other,
        };

        match exit_on_domain_error(outcome)? {
            Ok(StageOutcome::Advance(action)) => {
                tracing::debug!(
                    collection = %routed.schema.name,
                    action = action_name(&action),
                    "Action decided"
                );
                Ok(StageOutcome::Advance(action))
            }
            Ok(exit) => Ok(exit),
            Err(exit) => Ok(StageOutcome::Exit(exit)),
        }
    }
}

fn check_action(
    decision: ActionDecision,
    routed: &RoutedCollection,
    targets: &Targets,
) -> Result<StageOutcome<Action>> {
    let schema = &routed.schema;

    match decision {
        ActionDecision::Create { documents } => {
            if documents.is_empty() {
                return Err(ParleyError::InvalidDecision(
                    "nothing to create was given".to_string(),
                ));
            }
            Ok(StageOutcome::Advance(Action::Create(documents)))
        }
        ActionDecision::Read { sort, limit, skip } => {
            check_sort(schema, &sort)?;
            let request = QueryRequest {
                filter: scope_filter(targets),
                sort,
                skip,
                limit,
            };
            compile_filter(schema, &request.filter)?;
            Ok(StageOutcome::Advance(Action::Read(request)))
        }
        ActionDecision::Update { values } => {
            if values.is_empty() {
                return Err(ParleyError::InvalidDecision(
                    "the update did not name any values".to_string(),
                ));
            }
            let Some(ids) = resolved_ids(targets) else {
                return Ok(which_entries(&schema.name, "update"));
            };
            schema::validate_partial(schema, &values)?;
            Ok(StageOutcome::Advance(Action::Update { ids, values }))
        }
        ActionDecision::Delete => {
            let Some(ids) = resolved_ids(targets) else {
                return Ok(which_entries(&schema.name, "delete"));
            };
            Ok(StageOutcome::Advance(Action::Delete { ids }))
        }
        ActionDecision::Aggregate { group_by, metrics } => {
            let mut request = AggregateRequest {
                filter: scope_filter(targets),
                group_by,
                metrics,
            };
            request.metrics = check_aggregate(schema, &request)?;
            compile_filter(schema, &request.filter)?;
            Ok(StageOutcome::Advance(Action::Aggregate(request)))
        }
    }
}

/// Restricts reads and aggregates to what RouteDocument resolved.
fn scope_filter(targets: &Targets) -> Filter {
    match targets {
        Targets::New => Filter::new(),
        Targets::Collection(filter) => filter.clone(),
        Targets::Documents(documents) => Filter::new().and(
            "id",
            Operator::In,
            Value::from(
                documents
                    .iter()
                    .map(|doc| Value::from(doc.id.clone()))
                    .collect::<Vec<_>>(),
            ),
        ),
    }
}

fn resolved_ids(targets: &Targets) -> Option<Vec<String>> {
    let documents = targets.documents();
    if documents.is_empty() {
        return None;
    }
    Some(documents.iter().map(|doc| doc.id.clone()).collect())
}

fn which_entries(collection: &str, verb: &str) -> StageOutcome<Action> {
    StageOutcome::exit(
        ExitReason::NotFound,
        format!("Which entries in {collection} should I {verb}?"),
    )
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Create(_) => "create",
        Action::Read(_) => "read",
        Action::Update { .. } => "update",
        Action::Delete { .. } => "delete",
        Action::Aggregate(_) => "aggregate",
    }
}
