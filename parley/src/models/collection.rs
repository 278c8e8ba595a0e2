use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FieldDefinition;

/// Schema of one user's collection. Field order is preserved as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }
}

/// Lookup key for collection names, which are unique per user regardless of case.
pub fn collection_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A collection the pipeline wants to create once the turn executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
}
