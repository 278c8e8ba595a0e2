use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::FieldValue;

pub type FieldMap = BTreeMap<String, FieldValue>;

/// Names reserved for system fields. User schemas cannot declare them.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub collection_id: String,
    pub fields: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(user_id: &str, collection_id: &str, fields: FieldMap) -> Self {
        let now = Utc::now();
        Self {
            id: nanoid::nanoid!(),
            user_id: user_id.to_string(),
            collection_id: collection_id.to_string(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Value of a schema field or one of the system fields.
    pub fn value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(FieldValue::String(self.id.clone())),
            "created_at" => Some(FieldValue::Datetime(self.created_at)),
            "updated_at" => Some(FieldValue::Datetime(self.updated_at)),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Flat JSON object: system fields plus every stored field as plain JSON.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::from(self.id.clone()));
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        object.insert(
            "created_at".to_string(),
            Value::from(self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        object.insert(
            "updated_at".to_string(),
            Value::from(self.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    /// Matches before skip/limit were applied.
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_fields_are_readable_as_values() {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String("Write report".into()));
        let doc = Document::new("user-a", "col-1", fields);

        assert_eq!(doc.value("id"), Some(FieldValue::String(doc.id.clone())));
        assert_eq!(
            doc.value("created_at"),
            Some(FieldValue::Datetime(doc.created_at))
        );
        assert_eq!(
            doc.value("title"),
            Some(FieldValue::String("Write report".into()))
        );
        assert_eq!(doc.value("missing"), None);
    }

    #[test]
    fn json_rendering_is_flat() {
        let mut fields = FieldMap::new();
        fields.insert("completed".to_string(), FieldValue::Boolean(false));
        let doc = Document::new("user-a", "col-1", fields);
        let json = doc.to_json();

        assert_eq!(json["completed"], Value::from(false));
        assert_eq!(json["id"], Value::from(doc.id.clone()));
        assert!(json["created_at"].is_string());
    }
}
