mod decide_action;
mod execute;
mod preprocess;
mod route_collection;
mod route_document;

use serde_json::{Map, Value};

use crate::context::ResolvedValue;
use crate::models::{
    collection_name_key, AggregateRequest, CollectionSchema, Document, FieldDefinition, Filter,
    NewCollection, QueryRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMention {
    pub surface: String,
    pub value: ResolvedValue,
}

/// Output of Preprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    /// Message text with resolved values annotated inline.
    pub text: String,
    pub mentions: Vec<ResolvedMention>,
}

impl Preprocessed {
    /// Ids of documents of `collection` that the message referred back to.
    pub fn referenced_ids(&self, collection: &str) -> Vec<String> {
        let key = collection_name_key(collection);
        let mut ids: Vec<String> = Vec::new();
        for mention in &self.mentions {
            if let ResolvedValue::Document { collection, id } = &mention.value {
                if collection_name_key(collection) == key && !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}

/// What Execute has to do to the schema before running the operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaPlan {
    Existing,
    Extend(Vec<FieldDefinition>),
    Create(NewCollection),
}

/// Output of RouteCollection. `schema` already reflects a pending create or extend.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedCollection {
    pub schema: CollectionSchema,
    pub plan: SchemaPlan,
}

/// Output of RouteDocument.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    New,
    Documents(Vec<Document>),
    Collection(Filter),
}

impl Targets {
    pub fn documents(&self) -> &[Document] {
        match self {
            Targets::Documents(documents) => documents,
            _ => &[],
        }
    }
}

/// Output of DecideAction: a validated operation ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create(Vec<Map<String, Value>>),
    Read(QueryRequest),
    Update {
        ids: Vec<String>,
        values: Map<String, Value>,
    },
    Delete {
        ids: Vec<String>,
    },
    Aggregate(AggregateRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_ids_match_collection_case_insensitively() {
        let document = |collection: &str, id: &str| ResolvedMention {
            surface: "it".into(),
            value: ResolvedValue::Document {
                collection: collection.into(),
                id: id.into(),
            },
        };
        let preprocessed = Preprocessed {
            text: "mark it done".into(),
            mentions: vec![
                document("Tasks", "t1"),
                document("Groceries", "g1"),
                document("tasks", "t1"),
            ],
        };
        assert_eq!(preprocessed.referenced_ids("TASKS"), vec!["t1".to_string()]);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    use crate::config::DatabaseConfig;
    use crate::context::{ContextManager, ResolutionCache};
    use crate::db::{Database, DatabaseBackend, LibSqlBackend};
    use crate::error::{ParleyError, Result};
    use crate::llm::ReasoningCapability;
    use crate::models::InboundMessage;
    use crate::pipeline::{Pipeline, Stage, TurnContext};
    use crate::services::DocumentService;

    /// Answers each call with the next queued decision.
    #[derive(Default)]
    pub struct ScriptedReasoner {
        script: Mutex<VecDeque<Value>>,
        calls: AtomicUsize,
    }

    impl ScriptedReasoner {
        pub fn push(&self, decision: Value) {
            self.script.lock().unwrap().push_back(decision);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReasoningCapability for ScriptedReasoner {
        async fn decide(&self, stage: Stage, _prompt: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ParleyError::Internal(format!("no scripted decision for {stage}")))
        }
    }

    pub struct Harness {
        pub pipeline: Pipeline,
        pub documents: DocumentService,
        pub context: ContextManager,
        pub reasoner: Arc<ScriptedReasoner>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        pub async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("pipeline.db");
            let config = DatabaseConfig::local(path.display().to_string());
            let db: Arc<dyn DatabaseBackend> =
                Arc::new(LibSqlBackend::new(Database::new(&config).await.unwrap()));
            let documents = DocumentService::new(db.clone());
            let context = ContextManager::new(db, ResolutionCache::new(64), 10);
            let reasoner = Arc::new(ScriptedReasoner::default());
            let timeout = Duration::from_secs(5);
            let pipeline = Pipeline::new(reasoner.clone(), documents.clone(), timeout);
            Self {
                pipeline,
                documents,
                context,
                reasoner,
                _dir: dir,
            }
        }

        pub fn turn(&self, message: InboundMessage, now: DateTime<Utc>) -> TurnContext {
            TurnContext::new(message, Vec::new(), self.context.clone(), now)
        }
    }
}
