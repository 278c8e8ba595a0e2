//! Prompt templates for the reasoning stages.
//!
//! Each stage gets a fixed system prompt describing the JSON decision it must return,
//! and a user prompt assembled from the turn. Templates use plain `format!()`.

use crate::models::{CollectionSchema, ConversationTurn, Document, FieldDefinition};
use crate::pipeline::Stage;

/// The decision contract for one stage.
pub fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Preprocess => PREPROCESS_SYSTEM,
        Stage::RouteCollection => ROUTE_COLLECTION_SYSTEM,
        Stage::RouteDocument => ROUTE_DOCUMENT_SYSTEM,
        Stage::DecideAction | Stage::Execute => DECIDE_ACTION_SYSTEM,
    }
}

const PREPROCESS_SYSTEM: &str = r#"You prepare messages for a personal data assistant.
Find every mention of a date or time and every back-reference to something said earlier.
Do not compute dates yourself; describe them.

Respond with JSON only:
{
  "text": "<the message, spelling fixed, meaning unchanged>",
  "references": [
    {"surface": "<exact words in text>", "reference": <reference>}
  ]
}

A reference is one of:
- {"kind": "temporal", "tag": <tag>} where tag is one of "now", "today", "tomorrow",
  "yesterday", "this_week", "next_week", "last_week", "this_month", "next_month",
  "last_month", "this_year", "next_year", "last_year", "this_weekend",
  {"in_days": N}, {"days_ago": N}, {"next": "Mon".."Sun"}, {"last": "Mon".."Sun"}
- {"kind": "expression", "start": <date>, "end": <date or omitted>} for anything else,
  where a date is {"offset": {"years", "months", "weeks", "days", "hours", "minutes"},
  "boundary": "start_of_day" | "end_of_day" | "start_of_week" | "end_of_week" |
  "start_of_month" | "end_of_month" | "start_of_year" | "end_of_year",
  "snap": {"target": {"weekday": "Fri"} | {"month": 1..12}, "modifier": "last" | "this" | "next"}}
  and every key is optional
- {"kind": "anaphora", "surface": "<words>", "collection_hint": "<collection or omitted>"}
  for "it", "that one", "the last task" and similar

Return an empty references list when there are none."#;

const ROUTE_COLLECTION_SYSTEM: &str = r#"You decide which collection of the user's data a message is about.

Respond with JSON only, one of:
- {"route": "existing", "collection": "<name from the list>", "add_fields": [<field>]}
  add_fields only when the message needs fields the collection lacks; otherwise omit it.
- {"route": "create", "name": "<plural noun>", "description": "<one line>", "fields": [<field>]}
  only when no listed collection fits.
- {"route": "ambiguous", "candidates": ["<name>", ...], "question": "<question for the user>"}
- {"route": "conversational", "reply": "<answer>"} for greetings, help and questions
  that need no stored data.

A field is {"name": "<snake_case>", "field_type": "STRING" | "INTEGER" | "FLOAT" | "BOOLEAN" |
"DATETIME" | "SELECT" | "MULTI_SELECT", "required": bool, "options": [...] (SELECT and
MULTI_SELECT only), "default": {"kind": "static", "value": {"type": "<field type in snake_case>", "value": ...}}
or {"kind": "now"}, "description": "<optional>", "unique": bool}.
Fields added to an existing collection must be optional or have a default."#;

const ROUTE_DOCUMENT_SYSTEM: &str = r#"You decide which entries of a collection a message is about.

Respond with JSON only, one of:
- {"target": "new"} when the message adds entries.
- {"target": "existing", "document_ids": ["<id>", ...], "filter": <filter>} for specific
  entries; give ids you were shown, a filter, or both.
- {"target": "collection", "filter": <filter>} for questions over many entries
  (lists, counts, totals).

A filter is {"conditions": [{"field": "<name>", "op": "eq" | "ne" | "gt" | "gte" | "lt" |
"lte" | "in" | "contains", "value": <json>}]}; conditions are combined with AND and the
filter may be omitted. Fields "id", "created_at" and "updated_at" are always available."#;

const DECIDE_ACTION_SYSTEM: &str = r#"You decide the single operation to perform.

Respond with JSON only, one of:
- {"kind": "create", "documents": [{"<field>": <value>, ...}, ...]} one object per entry.
- {"kind": "read", "sort": [{"field": "<name>", "order": "asc" | "desc"}], "limit": N, "skip": N}
- {"kind": "update", "values": {"<field>": <value or null to clear>}}
- {"kind": "delete"}
- {"kind": "aggregate", "group_by": ["<field>"], "metrics": [{"op": "count" | "sum" | "avg" |
  "min" | "max", "field": "<name, omitted for count>", "alias": "<optional>"}]}

Use the exact field names of the collection. SELECT values must be one of the options.
Dates are ISO 8601."#;

/// Renders the recent turns as `[role]: content` lines, oldest first.
pub fn format_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return "(no earlier messages)".to_string();
    }
    history
        .iter()
        .map(|turn| format!("[{}]: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per field: `- name (TYPE, required, unique) options: a, b: description`.
pub fn format_fields(fields: &[FieldDefinition]) -> String {
    fields
        .iter()
        .map(|field| {
            let mut flags = vec![field.field_type.to_string()];
            if field.required {
                flags.push("required".to_string());
            }
            if field.unique {
                flags.push("unique".to_string());
            }
            let mut line = format!("- {} ({})", field.name, flags.join(", "));
            if !field.options.is_empty() {
                line.push_str(&format!(" options: {}", field.options.join(", ")));
            }
            if let Some(description) = &field.description {
                line.push_str(&format!(": {description}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_collections(schemas: &[CollectionSchema]) -> String {
    if schemas.is_empty() {
        return "(the user has no collections yet)".to_string();
    }
    schemas
        .iter()
        .map(|schema| {
            let description = schema
                .description
                .as_deref()
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            format!(
                "## {}{}\n{}",
                schema.name,
                description,
                format_fields(&schema.fields)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "(none)".to_string();
    }
    documents
        .iter()
        .map(|doc| doc.to_json().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generate the Preprocess prompt.
///
/// # Arguments
/// * `text` - The normalized message
/// * `history` - Recent turns of the conversation
/// * `local_now` - The current time in the user's zone, RFC 3339
///
/// # Example
/// ```
/// use parley::llm::prompts::preprocess_prompt;
///
/// let prompt = preprocess_prompt("remind me tomorrow", &[], "2026-10-14T09:00:00+02:00");
/// assert!(prompt.contains("remind me tomorrow"));
/// ```
pub fn preprocess_prompt(text: &str, history: &[ConversationTurn], local_now: &str) -> String {
    format!(
        r#"Current local time: {local_now}

Conversation so far:
{history}

Message:
{text}"#,
        history = format_history(history),
    )
}

pub fn route_collection_prompt(
    text: &str,
    history: &[ConversationTurn],
    schemas: &[CollectionSchema],
) -> String {
    format!(
        r#"The user's collections:
{collections}

Conversation so far:
{history}

Message:
{text}"#,
        collections = format_collections(schemas),
        history = format_history(history),
    )
}

/// `referenced` are entries the conversation already pointed at.
pub fn route_document_prompt(
    text: &str,
    history: &[ConversationTurn],
    schema: &CollectionSchema,
    referenced: &[Document],
) -> String {
    format!(
        r#"Collection: {name}
{fields}

Entries referred to earlier:
{referenced}

Conversation so far:
{history}

Message:
{text}"#,
        name = schema.name,
        fields = format_fields(&schema.fields),
        referenced = format_documents(referenced),
        history = format_history(history),
    )
}

/// `targets` are the entries RouteDocument resolved; `mode` says how to read them.
pub fn decide_action_prompt(
    text: &str,
    history: &[ConversationTurn],
    schema: &CollectionSchema,
    mode: &str,
    targets: &[Document],
    local_now: &str,
) -> String {
    format!(
        r#"Current local time: {local_now}

Collection: {name}
{fields}

Target: {mode}
Entries:
{targets}

Conversation so far:
{history}

Message:
{text}"#,
        name = schema.name,
        fields = format_fields(&schema.fields),
        targets = format_documents(targets),
        history = format_history(history),
    )
}
