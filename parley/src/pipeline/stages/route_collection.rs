use crate::error::{ParleyError, Result};
use crate::llm::prompts;
use crate::models::{collection_name_key, CollectionSchema, NewCollection};
use crate::pipeline::decisions::CollectionRoute;
use crate::pipeline::{exit_on_domain_error, ExitReason, Pipeline, Stage, StageOutcome, TurnContext};
use crate::schema::check_extension;

use super::{Preprocessed, RoutedCollection, SchemaPlan};

impl Pipeline {
    /// Picks the collection the message is about, or plans a new one. Nothing is written.
    pub(crate) async fn route_collection(
        &self,
        input: &Preprocessed,
        ctx: &TurnContext,
    ) -> Result<StageOutcome<RoutedCollection>> {
        let schemas = self.documents().list_collections(ctx.user_id()).await?;
        let prompt = prompts::route_collection_prompt(&input.text, &ctx.history, &schemas);
        let route: CollectionRoute = self.decide(Stage::RouteCollection, &prompt).await?;

        match route {
            CollectionRoute::Existing {
                collection,
                add_fields,
            } => {
                let schema = find_listed(&schemas, &collection).ok_or_else(|| {
                    ParleyError::InvalidDecision(format!(
                        "'{collection}' is not one of the user's collections"
                    ))
                })?;
                route_existing(schema.clone(), &add_fields)
            }
            CollectionRoute::Create {
                name,
                description,
                fields,
            } => {
                if let Some(schema) = find_listed(&schemas, &name) {
                    tracing::debug!(
                        collection = %schema.name,
                        "Planned collection already exists, rerouting"
                    );
                    return Ok(StageOutcome::Advance(RoutedCollection {
                        schema: schema.clone(),
                        plan: SchemaPlan::Existing,
                    }));
                }
                let proposal = NewCollection {
                    name,
                    description,
                    fields,
                };
                let prepared = match self
                    .documents()
                    .registry()
                    .prepare(ctx.user_id(), &proposal)
                    .await
                {
                    Err(ParleyError::SchemaConflict(taken)) => {
                        let schema = self.documents().get_collection(ctx.user_id(), &taken).await?;
                        return Ok(StageOutcome::Advance(RoutedCollection {
                            schema,
                            plan: SchemaPlan::Existing,
                        }));
                    }
                    other => match exit_on_domain_error(other)? {
                        Ok(prepared) => prepared,
                        Err(exit) => return Ok(StageOutcome::Exit(exit)),
                    },
                };

                tracing::info!(
                    collection = %prepared.name,
                    fields = prepared.fields.len(),
                    "Planning new collection"
                );
                let schema = CollectionSchema {
                    id: String::new(),
                    user_id: ctx.user_id().to_string(),
                    name: prepared.name.clone(),
                    description: prepared.description.clone(),
                    fields: prepared.fields.clone(),
                    created_at: ctx.now,
                    updated_at: ctx.now,
                };
                Ok(StageOutcome::Advance(RoutedCollection {
                    schema,
                    plan: SchemaPlan::Create(prepared),
                }))
            }
            CollectionRoute::Ambiguous {
                candidates,
                question,
            } => {
                let mut text = question;
                if !candidates.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(
                        &candidates
                            .iter()
                            .map(|candidate| format!("- {candidate}"))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    );
                }
                Ok(StageOutcome::exit(ExitReason::Ambiguous, text))
            }
            CollectionRoute::Conversational { reply } => {
                Ok(StageOutcome::exit(ExitReason::Conversational, reply))
            }
        }
    }
}

fn find_listed<'a>(schemas: &'a [CollectionSchema], name: &str) -> Option<&'a CollectionSchema> {
    let key = collection_name_key(name);
    schemas
        .iter()
        .find(|schema| collection_name_key(&schema.name) == key)
}

fn route_existing(
    schema: CollectionSchema,
    add_fields: &[crate::models::FieldDefinition],
) -> Result<StageOutcome<RoutedCollection>> {
    if add_fields.is_empty() {
        return Ok(StageOutcome::Advance(RoutedCollection {
            schema,
            plan: SchemaPlan::Existing,
        }));
    }

    let added = match exit_on_domain_error(check_extension(&schema, add_fields))? {
        Ok(added) => added,
        Err(exit) => return Ok(StageOutcome::Exit(exit)),
    };
    tracing::info!(collection = %schema.name, added = added.len(), "Planning schema extension");

    let mut extended = schema;
    extended.fields.extend(added.iter().cloned());
    Ok(StageOutcome::Advance(RoutedCollection {
        schema: extended,
        plan: SchemaPlan::Extend(added),
    }))
}
