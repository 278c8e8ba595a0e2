use crate::error::{ParleyError, Result};
use crate::llm::prompts;
use crate::models::{Document, Filter, QueryRequest, MAX_QUERY_LIMIT};
use crate::pipeline::decisions::DocumentTarget;
use crate::pipeline::{exit_on_domain_error, ExitReason, Pipeline, Stage, StageOutcome, TurnContext};
use crate::query::compile_filter;

use super::{Preprocessed, RoutedCollection, SchemaPlan, Targets};

impl Pipeline {
    /// Resolves which documents the message is about. Skipped for a new collection.
    pub(crate) async fn route_document(
        &self,
        input: &Preprocessed,
        routed: &RoutedCollection,
        ctx: &TurnContext,
    ) -> Result<StageOutcome<Targets>> {
        if matches!(routed.plan, SchemaPlan::Create(_)) {
            return Ok(StageOutcome::Advance(Targets::New));
        }
        let schema = &routed.schema;

        let mut referenced = Vec::new();
        for id in input.referenced_ids(&schema.name) {
            match self.documents().get(ctx.user_id(), &schema.name, &id).await {
                Ok(doc) => referenced.push(doc),
                Err(ParleyError::NotFound(_)) => {
                    tracing::debug!(document_id = %id, "Referenced document no longer exists");
                }
                Err(error) => return Err(error),
            }
        }

        let prompt = prompts::route_document_prompt(&input.text, &ctx.history, schema, &referenced);
        let target: DocumentTarget = self.decide(Stage::RouteDocument, &prompt).await?;

        match target {
            DocumentTarget::New => Ok(StageOutcome::Advance(Targets::New)),
            DocumentTarget::Collection { filter } => {
                if let Err(exit) = exit_on_domain_error(compile_filter(schema, &filter))? {
                    return Ok(StageOutcome::Exit(exit));
                }
                Ok(StageOutcome::Advance(Targets::Collection(filter)))
            }
            DocumentTarget::Existing {
                document_ids,
                filter,
            } => {
                if document_ids.is_empty() && filter.is_empty() {
                    if referenced.is_empty() {
                        return Ok(StageOutcome::exit(
                            ExitReason::NotFound,
                            format!("I couldn't tell which entry in {} you mean.", schema.name),
                        ));
                    }
                    return Ok(StageOutcome::Advance(Targets::Documents(referenced)));
                }
                self.resolve_existing(&schema.name, &document_ids, &filter, ctx)
                    .await
            }
        }
    }

    async fn resolve_existing(
        &self,
        collection: &str,
        ids: &[String],
        filter: &Filter,
        ctx: &TurnContext,
    ) -> Result<StageOutcome<Targets>> {
        let mut found: Vec<Document> = Vec::new();

        for id in ids {
            match exit_on_domain_error(self.documents().get(ctx.user_id(), collection, id).await)? {
                Ok(doc) => push_unique(&mut found, doc),
                Err(_) => {
                    return Ok(StageOutcome::exit(
                        ExitReason::NotFound,
                        format!(
                            "I couldn't find that entry in {collection}. It may have been removed."
                        ),
                    ));
                }
            }
        }

        if !filter.is_empty() {
            let request = QueryRequest::filtered(filter.clone()).with_limit(MAX_QUERY_LIMIT);
            let page = match exit_on_domain_error(
                self.documents().query(ctx.user_id(), collection, &request).await,
            )? {
                Ok(page) => page,
                Err(exit) => return Ok(StageOutcome::Exit(exit)),
            };
            if ids.is_empty() {
                found = page.documents;
            } else {
                // Both given: the filter narrows the listed ids.
                found.retain(|doc| page.documents.iter().any(|hit| hit.id == doc.id));
            }
        }

        if found.is_empty() {
            return Ok(StageOutcome::exit(
                ExitReason::NotFound,
                format!("No matching entries in {collection}."),
            ));
        }
        tracing::debug!(collection, matched = found.len(), "Documents resolved");
        Ok(StageOutcome::Advance(Targets::Documents(found)))
    }
}

fn push_unique(found: &mut Vec<Document>, doc: Document) {
    if !found.iter().any(|existing| existing.id == doc.id) {
        found.push(doc);
    }
}
