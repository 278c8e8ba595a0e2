//! Shapes of the decisions the reasoner returns at each stage.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{FieldDefinition, Filter, MetricSpec, SortKey};
use crate::temporal::Reference;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessDecision {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub references: Vec<Mention>,
}

/// One reference found in the message, with the words it was expressed in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mention {
    pub surface: String,
    pub reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum CollectionRoute {
    Existing {
        collection: String,
        #[serde(default)]
        add_fields: Vec<FieldDefinition>,
    },
    Create {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        fields: Vec<FieldDefinition>,
    },
    Ambiguous {
        #[serde(default)]
        candidates: Vec<String>,
        question: String,
    },
    Conversational {
        reply: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum DocumentTarget {
    New,
    Existing {
        #[serde(default)]
        document_ids: Vec<String>,
        #[serde(default)]
        filter: Filter,
    },
    Collection {
        #[serde(default)]
        filter: Filter,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDecision {
    Create {
        #[serde(default)]
        documents: Vec<Map<String, Value>>,
    },
    Read {
        #[serde(default)]
        sort: Vec<SortKey>,
        #[serde(default)]
        limit: Option<u64>,
        #[serde(default)]
        skip: u64,
    },
    Update {
        #[serde(default)]
        values: Map<String, Value>,
    },
    Delete,
    Aggregate {
        #[serde(default)]
        group_by: Vec<String>,
        #[serde(default)]
        metrics: Vec<MetricSpec>,
    },
}
