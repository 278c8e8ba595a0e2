use std::cmp::Ordering;

use crate::error::{ParleyError, Result};
use crate::models::{CollectionSchema, Document, FieldValue, SortKey, SortOrder};

use super::filter::resolve_field;

pub fn check_sort(schema: &CollectionSchema, keys: &[SortKey]) -> Result<()> {
    for key in keys {
        if resolve_field(schema, &key.field).is_none() {
            return Err(ParleyError::InvalidFilter(format!(
                "cannot sort by '{}': not a field of {}",
                key.field, schema.name
            )));
        }
    }
    Ok(())
}

/// Sorts by the given keys (default `created_at` ascending). Documents missing a key
/// sort after those that have it, whatever the direction. `id` breaks ties.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    let default_keys = [SortKey::asc("created_at")];
    let keys = if keys.is_empty() { &default_keys[..] } else { keys };

    docs.sort_by(|a, b| {
        for key in keys {
            let ordering = compare_for_sort(
                a.value(&key.field).as_ref(),
                b.value(&key.field).as_ref(),
                key.order,
            );
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    });
}

/// Ordering used by sorting and group ordering.
pub(crate) fn compare_for_sort(
    a: Option<&FieldValue>,
    b: Option<&FieldValue>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = compare_values(a, b);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::String(x), FieldValue::String(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        _ => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDefinition, FieldMap, FieldType};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn doc(id: &str, amount: Option<f64>, name: &str) -> Document {
        let mut fields = FieldMap::new();
        if let Some(amount) = amount {
            fields.insert("amount".into(), FieldValue::Float(amount));
        }
        fields.insert("name".into(), FieldValue::String(name.into()));
        let mut doc = Document::new("user-a", "c1", fields);
        doc.id = id.to_string();
        doc
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let mut docs = vec![
            doc("a", None, "x"),
            doc("b", Some(2.0), "x"),
            doc("c", Some(5.0), "x"),
        ];

        sort_documents(&mut docs, &[SortKey::asc("amount")]);
        assert_eq!(ids(&docs), vec!["b", "c", "a"]);

        sort_documents(&mut docs, &[SortKey::desc("amount")]);
        assert_eq!(ids(&docs), vec!["c", "b", "a"]);
    }

    #[test]
    fn ties_break_on_id() {
        let mut docs = vec![doc("z", Some(1.0), "x"), doc("m", Some(1.0), "x")];
        sort_documents(&mut docs, &[SortKey::asc("amount")]);
        assert_eq!(ids(&docs), vec!["m", "z"]);
    }

    #[test]
    fn strings_sort_case_insensitively() {
        let mut docs = vec![doc("1", None, "banana"), doc("2", None, "Apple")];
        sort_documents(&mut docs, &[SortKey::asc("name")]);
        assert_eq!(ids(&docs), vec!["2", "1"]);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let schema = CollectionSchema {
            id: "c1".into(),
            user_id: "user-a".into(),
            name: "Expenses".into(),
            description: None,
            fields: vec![FieldDefinition::new("amount", FieldType::Float)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let keys = [SortKey::asc("amount"), SortKey::desc("created_at")];
        assert!(check_sort(&schema, &keys).is_ok());
        assert!(check_sort(&schema, &[SortKey::asc("price")]).is_err());
    }
}
