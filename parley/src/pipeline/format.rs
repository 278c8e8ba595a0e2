//! Turns store results into reply elements.

use serde_json::Value;

use crate::error::Result;
use crate::models::{
    AggregateRequest, AggregateRow, ChartDataset, ChartType, CheckboxItem, CollectionSchema,
    Document, DocumentPage, FieldDefinition, FieldType, FieldValue, Reply, UiElement,
};

/// Short human label: the first STRING field with a value, else the id.
pub fn document_label(schema: &CollectionSchema, doc: &Document) -> String {
    schema
        .fields
        .iter()
        .filter(|field| field.field_type == FieldType::String)
        .find_map(|field| match doc.fields.get(&field.name) {
            Some(FieldValue::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_else(|| doc.id.clone())
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "entry"
    } else {
        "entries"
    }
}

fn label_list(schema: &CollectionSchema, documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| format!("**{}**", document_label(schema, doc)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn collection_created(schema: &CollectionSchema) -> String {
    let fields = schema.field_names().join(", ");
    format!("Created a new collection **{}** with fields: {fields}.", schema.name)
}

pub fn collection_extended(schema: &CollectionSchema, added: &[FieldDefinition]) -> String {
    let names = added
        .iter()
        .map(|field| field.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Added {names} to **{}**.", schema.name)
}

pub fn created_reply(schema: &CollectionSchema, documents: &[Document]) -> Reply {
    Reply::markdown(format!(
        "Added {} {} to {}: {}.",
        documents.len(),
        plural(documents.len()),
        schema.name,
        label_list(schema, documents)
    ))
}

pub fn updated_reply(schema: &CollectionSchema, documents: &[Document]) -> Reply {
    Reply::markdown(format!(
        "Updated {} {} in {}: {}.",
        documents.len(),
        plural(documents.len()),
        schema.name,
        label_list(schema, documents)
    ))
}

pub fn deleted_reply(schema: &CollectionSchema, labels: &[String]) -> Reply {
    let shown = labels
        .iter()
        .map(|label| format!("**{label}**"))
        .collect::<Vec<_>>()
        .join(", ");
    Reply::markdown(format!(
        "Deleted {} {} from {}: {shown}.",
        labels.len(),
        plural(labels.len()),
        schema.name
    ))
}

/// Checklist when the collection is a title plus a done flag, a table otherwise.
pub fn documents_reply(schema: &CollectionSchema, page: &DocumentPage) -> Result<Reply> {
    if page.documents.is_empty() {
        return Ok(Reply::markdown(format!("No entries in {}.", schema.name)));
    }

    let mut reply = Reply::default();
    if (page.documents.len() as u64) < page.total {
        reply.push(UiElement::markdown(format!(
            "Showing {} of {} entries in {}.",
            page.documents.len(),
            page.total,
            schema.name
        )));
    }

    match checklist_field(schema) {
        Some(flag) => {
            let items = page
                .documents
                .iter()
                .map(|doc| CheckboxItem {
                    label: document_label(schema, doc),
                    checked: doc
                        .fields
                        .get(flag)
                        .and_then(FieldValue::as_bool)
                        .unwrap_or(false),
                })
                .collect();
            reply.push(UiElement::checkbox(items));
        }
        None => {
            let headers: Vec<String> =
                schema.fields.iter().map(|field| field.name.clone()).collect();
            let rows = page
                .documents
                .iter()
                .map(|doc| {
                    headers
                        .iter()
                        .map(|name| {
                            doc.fields.get(name).map(FieldValue::to_json).unwrap_or(Value::Null)
                        })
                        .collect()
                })
                .collect();
            reply.push(UiElement::table(headers, rows)?);
        }
    }
    Ok(reply)
}

fn checklist_field(schema: &CollectionSchema) -> Option<&str> {
    let has_label = schema
        .fields
        .iter()
        .any(|field| field.field_type == FieldType::String);
    if !has_label {
        return None;
    }
    schema
        .fields
        .iter()
        .find(|field| field.field_type == FieldType::Boolean)
        .map(|field| field.name.as_str())
}

/// Table of groups with their metrics, plus a bar chart for one metric over groups.
pub fn aggregate_reply(
    schema: &CollectionSchema,
    request: &AggregateRequest,
    rows: &[AggregateRow],
) -> Result<Reply> {
    if rows.is_empty() {
        return Ok(Reply::markdown(format!("No entries in {} to summarize.", schema.name)));
    }

    let aliases: Vec<String> = request.metrics.iter().map(|metric| metric.alias()).collect();
    let mut headers = request.group_by.clone();
    headers.extend(aliases.iter().cloned());

    let table_rows = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<Value> = request
                .group_by
                .iter()
                .map(|key| row.group.get(key).cloned().unwrap_or(Value::Null))
                .collect();
            cells.extend(
                aliases
                    .iter()
                    .map(|alias| row.metrics.get(alias).cloned().unwrap_or(Value::Null)),
            );
            cells
        })
        .collect();

    let mut reply = Reply::new(vec![UiElement::table(headers, table_rows)?]);

    if let ([key], [alias]) = (request.group_by.as_slice(), aliases.as_slice()) {
        let labels = rows
            .iter()
            .map(|row| group_label(row.group.get(key)))
            .collect();
        let data = rows
            .iter()
            .map(|row| row.metrics.get(alias).and_then(Value::as_f64).unwrap_or(0.0))
            .collect();
        reply.push(UiElement::chart(
            ChartType::Bar,
            labels,
            vec![ChartDataset {
                label: alias.clone(),
                data,
            }],
        )?);
    }
    Ok(reply)
}

fn group_label(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(none)".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMap, Metric, MetricSpec};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema(fields: Vec<FieldDefinition>) -> CollectionSchema {
        CollectionSchema {
            id: "col".into(),
            user_id: "u".into(),
            name: "Tasks".into(),
            description: None,
            fields,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn doc(fields: &[(&str, FieldValue)]) -> Document {
        let map: FieldMap = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Document::new("u", "col", map)
    }

    #[test]
    fn tasks_render_as_checklist() {
        let tasks = schema(vec![
            FieldDefinition::new("title", FieldType::String),
            FieldDefinition::new("completed", FieldType::Boolean),
        ]);
        let page = DocumentPage {
            documents: vec![
                doc(&[
                    ("title", FieldValue::String("Write report".into())),
                    ("completed", FieldValue::Boolean(true)),
                ]),
                doc(&[("title", FieldValue::String("Buy milk".into()))]),
            ],
            total: 2,
        };
        let reply = documents_reply(&tasks, &page).unwrap();
        assert_eq!(reply.to_text(), "- [x] Write report\n- [ ] Buy milk");
    }

    #[test]
    fn other_collections_render_as_table_with_paging_note() {
        let books = schema(vec![
            FieldDefinition::new("title", FieldType::String),
            FieldDefinition::new("pages", FieldType::Integer),
        ]);
        let page = DocumentPage {
            documents: vec![doc(&[("title", FieldValue::String("Dune".into()))])],
            total: 3,
        };
        let reply = documents_reply(&books, &page).unwrap();
        assert_eq!(reply.elements.len(), 2);
        assert_eq!(
            reply.to_text(),
            "Showing 1 of 3 entries in Tasks.\n\n| title | pages |\n|---|---|\n| Dune |  |"
        );
    }

    #[test]
    fn empty_page_says_so() {
        let page = DocumentPage {
            documents: Vec::new(),
            total: 0,
        };
        let reply = documents_reply(&schema(Vec::new()), &page).unwrap();
        assert_eq!(reply.to_text(), "No entries in Tasks.");
    }

    #[test]
    fn grouped_metric_adds_bar_chart() {
        let expenses = schema(vec![
            FieldDefinition::new("category", FieldType::Select).with_options(["food", "rent"]),
            FieldDefinition::new("amount", FieldType::Float),
        ]);
        let request = AggregateRequest {
            group_by: vec!["category".into()],
            metrics: vec![MetricSpec::over(Metric::Sum, "amount")],
            ..AggregateRequest::default()
        };
        let row = |category: &str, sum: f64| AggregateRow {
            group: BTreeMap::from([("category".to_string(), json!(category))]),
            metrics: BTreeMap::from([("sum_amount".to_string(), json!(sum))]),
        };
        let rows = [row("food", 30.5), row("rent", 900.0)];
        let reply = aggregate_reply(&expenses, &request, &rows).unwrap();

        assert_eq!(reply.elements.len(), 2);
        assert_eq!(
            reply.elements[1],
            UiElement::Chart {
                chart_type: ChartType::Bar,
                labels: vec!["food".into(), "rent".into()],
                datasets: vec![ChartDataset {
                    label: "sum_amount".into(),
                    data: vec![30.5, 900.0],
                }],
            }
        );
    }

    #[test]
    fn label_falls_back_to_id() {
        let counters = schema(vec![FieldDefinition::new("value", FieldType::Integer)]);
        let entry = doc(&[("value", FieldValue::Integer(3))]);
        assert_eq!(document_label(&counters, &entry), entry.id);
    }
}
