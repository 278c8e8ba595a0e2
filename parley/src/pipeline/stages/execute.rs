use crate::error::Result;
use crate::models::{CollectionSchema, FieldDefinition, Reply, UiElement};
use crate::pipeline::{exit_on_domain_error, format, Pipeline, StageOutcome, TurnContext};

use super::{Action, RoutedCollection, SchemaPlan};

/// Schema change made this turn, undone when the operation after it fails.
enum Applied {
    Nothing,
    Created,
    Extended(Vec<FieldDefinition>),
}

impl Pipeline {
    /// Applies the schema plan, runs the operation and formats the result. A failed
    /// operation leaves the store as it was before the turn.
    pub(crate) async fn execute(
        &self,
        routed: RoutedCollection,
        action: Action,
        ctx: &TurnContext,
    ) -> Result<StageOutcome<Reply>> {
        match exit_on_domain_error(self.apply(routed, action, ctx).await)? {
            Ok(reply) => Ok(StageOutcome::Advance(reply)),
            Err(exit) => Ok(StageOutcome::Exit(exit)),
        }
    }

    async fn apply(
        &self,
        routed: RoutedCollection,
        action: Action,
        ctx: &TurnContext,
    ) -> Result<Reply> {
        let user_id = ctx.user_id();
        let documents = self.documents();

        let (schema, applied, note) = match routed.plan {
            SchemaPlan::Existing => (routed.schema, Applied::Nothing, None),
            SchemaPlan::Create(proposal) => {
                let schema = documents.create_collection(user_id, &proposal).await?;
                tracing::info!(user_id, collection = %schema.name, "Collection created");
                let note = format::collection_created(&schema);
                (schema, Applied::Created, Some(note))
            }
            SchemaPlan::Extend(added) => {
                let schema = documents
                    .extend_collection(user_id, &routed.schema.name, &added)
                    .await?;
                tracing::info!(
                    user_id,
                    collection = %schema.name,
                    added = added.len(),
                    "Collection extended"
                );
                let note = format::collection_extended(&schema, &added);
                (schema, Applied::Extended(added), Some(note))
            }
        };

        let mut reply = match self.run_action(&schema, action, ctx).await {
            Ok(reply) => reply,
            Err(error) => {
                self.undo(ctx, &schema, applied).await;
                return Err(error);
            }
        };
        if let Some(note) = note {
            reply.elements.insert(0, UiElement::markdown(note));
        }
        Ok(reply)
    }

    async fn undo(&self, ctx: &TurnContext, schema: &CollectionSchema, applied: Applied) {
        let user_id = ctx.user_id();
        let collection = schema.name.as_str();
        let undone = match applied {
            Applied::Nothing => return,
            Applied::Created => self
                .documents()
                .delete_collection(user_id, collection)
                .await,
            Applied::Extended(added) => self
                .documents()
                .revert_extension(user_id, schema, &added)
                .await
                .map(|_| ()),
        };
        match undone {
            Ok(()) => tracing::info!(user_id, collection, "Schema change undone"),
            Err(error) => {
                tracing::error!(
                    user_id,
                    collection,
                    error = %error,
                    "Failed to undo schema change"
                );
            }
        }
    }

    async fn run_action(
        &self,
        schema: &CollectionSchema,
        action: Action,
        ctx: &TurnContext,
    ) -> Result<Reply> {
        let user_id = ctx.user_id();
        let collection = schema.name.as_str();
        let documents = self.documents();

        match action {
            Action::Create(raws) => {
                let created = if raws.len() == 1 {
                    vec![documents.insert(user_id, collection, &raws[0]).await?]
                } else {
                    documents.insert_many(user_id, collection, &raws).await?
                };
                if let Some(last) = created.last() {
                    ctx.remember_touched(collection, &last.id);
                }
                Ok(format::created_reply(schema, &created))
            }
            Action::Read(request) => {
                let page = documents.query(user_id, collection, &request).await?;
                if let Some(last) = page.documents.last() {
                    ctx.remember_touched(collection, &last.id);
                }
                format::documents_reply(schema, &page)
            }
            Action::Update { ids, values } => {
                let updated = documents
                    .update_all(user_id, collection, &ids, &values)
                    .await?;
                if let Some(last) = updated.last() {
                    ctx.remember_touched(collection, &last.id);
                }
                Ok(format::updated_reply(schema, &updated))
            }
            Action::Delete { ids } => {
                let deleted = documents.delete_all(user_id, collection, &ids).await?;
                let labels: Vec<String> = deleted
                    .iter()
                    .map(|doc| format::document_label(schema, doc))
                    .collect();
                tracing::info!(user_id, collection, deleted = labels.len(), "Documents deleted");
                Ok(format::deleted_reply(schema, &labels))
            }
            Action::Aggregate(request) => {
                let rows = documents.aggregate(user_id, collection, &request).await?;
                format::aggregate_reply(schema, &request, &rows)
            }
        }
    }
}
