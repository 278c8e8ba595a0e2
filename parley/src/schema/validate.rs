//! Field-definition checks and document validation.
//!
//! Everything here is pure: no storage access, and the current instant is passed in
//! so defaults computed at write time stay deterministic under test.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{IssueReason, ParleyError, Result, ValidationErrors};
use crate::models::{
    CollectionSchema, DefaultValue, FieldDefinition, FieldMap, FieldType, FieldValue,
    SYSTEM_FIELDS,
};

const MAX_FIELD_NAME_CHARS: usize = 64;

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Fields to set and fields to clear, produced from a partial update payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialUpdate {
    pub set: FieldMap,
    pub unset: Vec<String>,
}

pub fn is_reserved_name(name: &str) -> bool {
    SYSTEM_FIELDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// Checks one definition's invariants and returns it with its static default normalized.
pub fn check_field_definition(field: &FieldDefinition) -> Result<FieldDefinition> {
    let name = field.name.trim();
    if name.is_empty() {
        return Err(ParleyError::InvalidField(
            "field name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_FIELD_NAME_CHARS {
        return Err(ParleyError::InvalidField(format!(
            "field name '{name}' is longer than {MAX_FIELD_NAME_CHARS} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == ' ' || c == '-')
    {
        return Err(ParleyError::InvalidField(format!(
            "field name '{name}' may only contain letters, digits, spaces, '-' and '_'"
        )));
    }
    if is_reserved_name(name) {
        return Err(ParleyError::InvalidField(format!(
            "'{name}' is a reserved field name"
        )));
    }

    let mut normalized = field.clone();
    normalized.name = name.to_string();
    normalized.options = field.options.iter().map(|o| o.trim().to_string()).collect();

    if field.field_type.has_options() {
        if normalized.options.is_empty() {
            return Err(ParleyError::InvalidField(format!(
                "{} field '{name}' must declare at least one option",
                field.field_type
            )));
        }
        let mut seen = HashSet::new();
        for option in &normalized.options {
            if option.is_empty() {
                return Err(ParleyError::InvalidField(format!(
                    "field '{name}' has an empty option"
                )));
            }
            if !seen.insert(option.to_lowercase()) {
                return Err(ParleyError::InvalidField(format!(
                    "field '{name}' declares option '{option}' more than once"
                )));
            }
        }
    } else if !normalized.options.is_empty() {
        return Err(ParleyError::InvalidField(format!(
            "{} field '{name}' cannot declare options",
            field.field_type
        )));
    }

    normalized.default = match &field.default {
        None => None,
        Some(DefaultValue::Now) if field.field_type == FieldType::Datetime => {
            Some(DefaultValue::Now)
        }
        Some(DefaultValue::Now) => {
            return Err(ParleyError::InvalidField(format!(
                "only DATETIME fields can default to the current time ('{name}' is {})",
                field.field_type
            )))
        }
        Some(DefaultValue::Static(value)) => {
            let mut bare = normalized.clone();
            bare.default = None;
            let coerced = coerce_value(&bare, &value.to_json()).map_err(|reason| {
                ParleyError::InvalidField(format!("default for '{name}' {reason}"))
            })?;
            Some(DefaultValue::Static(coerced))
        }
    };

    Ok(normalized)
}

/// Checks a whole field list, including name uniqueness across it.
pub fn check_field_definitions(fields: &[FieldDefinition]) -> Result<Vec<FieldDefinition>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(fields.len());
    for field in fields {
        let checked = check_field_definition(field)?;
        if !seen.insert(checked.name.to_lowercase()) {
            return Err(ParleyError::InvalidField(format!(
                "field '{}' is declared more than once",
                checked.name
            )));
        }
        normalized.push(checked);
    }
    Ok(normalized)
}

/// Checks fields proposed for an existing schema. New fields must not collide with
/// existing ones and must be optional or carry a default.
pub fn check_extension(
    schema: &CollectionSchema,
    new_fields: &[FieldDefinition],
) -> Result<Vec<FieldDefinition>> {
    let checked = check_field_definitions(new_fields)?;
    for field in &checked {
        if schema
            .fields
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&field.name))
        {
            return Err(ParleyError::InvalidField(format!(
                "collection '{}' already has a field named '{}'",
                schema.name, field.name
            )));
        }
        if field.required && field.default.is_none() {
            return Err(ParleyError::InvalidField(format!(
                "new field '{}' must be optional or have a default so existing entries stay valid",
                field.name
            )));
        }
    }
    Ok(checked)
}

/// Validates a full document against a schema, applying defaults.
///
/// Keys naming system fields are ignored; the store assigns those. `null` counts as
/// absent.
pub fn validate(
    schema: &CollectionSchema,
    mapping: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<FieldMap> {
    validate_fields(&schema.fields, mapping, now)
}

pub fn validate_fields(
    fields: &[FieldDefinition],
    mapping: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<FieldMap> {
    let mut errors = ValidationErrors::default();
    let mut normalized = FieldMap::new();

    for key in mapping.keys() {
        if !is_reserved_name(key) && !fields.iter().any(|field| &field.name == key) {
            errors.push(key.clone(), IssueReason::UnknownField);
        }
    }

    for field in fields {
        match mapping.get(&field.name).filter(|value| !value.is_null()) {
            Some(raw) => match coerce_value(field, raw) {
                Ok(value) => {
                    normalized.insert(field.name.clone(), value);
                }
                Err(reason) => errors.push(field.name.clone(), reason),
            },
            None => {
                if let Some(default) = &field.default {
                    normalized.insert(field.name.clone(), default.resolve(now));
                } else if field.required {
                    errors.push(field.name.clone(), IssueReason::Missing);
                }
            }
        }
    }

    errors.into_result()?;
    Ok(normalized)
}

/// Coerces only the supplied keys. `null` marks a key for removal, which is refused for
/// required fields without a default.
pub fn validate_partial(
    schema: &CollectionSchema,
    partial: &Map<String, Value>,
) -> Result<PartialUpdate> {
    let mut errors = ValidationErrors::default();
    let mut update = PartialUpdate::default();

    for (key, raw) in partial {
        if is_reserved_name(key) {
            continue;
        }
        let Some(field) = schema.field(key) else {
            errors.push(key.clone(), IssueReason::UnknownField);
            continue;
        };
        if raw.is_null() {
            if field.required && field.default.is_none() {
                errors.push(key.clone(), IssueReason::Missing);
            } else {
                update.unset.push(key.clone());
            }
            continue;
        }
        match coerce_value(field, raw) {
            Ok(value) => {
                update.set.insert(key.clone(), value);
            }
            Err(reason) => errors.push(key.clone(), reason),
        }
    }

    errors.into_result()?;
    Ok(update)
}

/// Applies a partial update to stored fields and re-validates the whole result against
/// the current schema.
pub fn merge_update(
    schema: &CollectionSchema,
    existing: &FieldMap,
    partial: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<FieldMap> {
    let update = validate_partial(schema, partial)?;

    let mut merged = existing.clone();
    for key in &update.unset {
        merged.remove(key);
    }
    merged.extend(update.set);

    let mut errors = ValidationErrors::default();
    for key in merged.keys() {
        if schema.field(key).is_none() {
            errors.push(key.clone(), IssueReason::UnknownField);
        }
    }
    for field in &schema.fields {
        match merged.get(&field.name) {
            Some(value) if value.field_type() != field.field_type => errors.push(
                field.name.clone(),
                IssueReason::TypeMismatch {
                    expected: field.field_type,
                    found: value.to_string(),
                },
            ),
            Some(_) => {}
            None => {
                if let Some(default) = &field.default {
                    merged.insert(field.name.clone(), default.resolve(now));
                } else if field.required {
                    errors.push(field.name.clone(), IssueReason::Missing);
                }
            }
        }
    }

    errors.into_result()?;
    Ok(merged)
}

/// Converts a raw JSON value into the field's typed value when the conversion is
/// unambiguous.
pub fn coerce_value(
    field: &FieldDefinition,
    raw: &Value,
) -> std::result::Result<FieldValue, IssueReason> {
    let mismatch = || IssueReason::TypeMismatch {
        expected: field.field_type,
        found: describe_raw(raw),
    };

    match field.field_type {
        FieldType::String => match raw {
            Value::String(text) => Ok(FieldValue::String(text.clone())),
            Value::Number(number) => Ok(FieldValue::String(number.to_string())),
            Value::Bool(flag) => Ok(FieldValue::String(flag.to_string())),
            _ => Err(mismatch()),
        },
        FieldType::Integer => match raw {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().and_then(whole_f64_to_i64))
                .map(FieldValue::Integer)
                .ok_or_else(mismatch),
            Value::String(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(whole_f64_to_i64))
                    .map(FieldValue::Integer)
                    .ok_or_else(mismatch)
            }
            _ => Err(mismatch()),
        },
        FieldType::Float => match raw {
            Value::Number(number) => number
                .as_f64()
                .filter(|value| value.is_finite())
                .map(FieldValue::Float)
                .ok_or_else(mismatch),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(FieldValue::Float)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldType::Boolean => match raw {
            Value::Bool(flag) => Ok(FieldValue::Boolean(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Ok(FieldValue::Boolean(false)),
                Some(1) => Ok(FieldValue::Boolean(true)),
                _ => Err(mismatch()),
            },
            Value::String(text) => match text.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "no" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldType::Datetime => match raw {
            Value::String(text) => parse_datetime(text)
                .map(FieldValue::Datetime)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldType::Select => match raw {
            Value::String(text) => match_option(&field.options, text).map(FieldValue::Select),
            _ => Err(mismatch()),
        },
        FieldType::MultiSelect => {
            let items: Vec<String> = match raw {
                Value::Array(values) => values
                    .iter()
                    .map(|value| value.as_str().map(str::to_string).ok_or_else(mismatch))
                    .collect::<std::result::Result<_, _>>()?,
                Value::String(text) => text
                    .split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
                _ => return Err(mismatch()),
            };
            let mut chosen = HashSet::new();
            for item in &items {
                chosen.insert(match_option(&field.options, item)?);
            }
            let ordered = field
                .options
                .iter()
                .filter(|option| chosen.contains(*option))
                .cloned()
                .collect();
            Ok(FieldValue::MultiSelect(ordered))
        }
    }
}

/// Accepts RFC 3339, a few naive ISO-8601 shapes (read as UTC) and bare dates (midnight UTC).
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn match_option(options: &[String], candidate: &str) -> std::result::Result<String, IssueReason> {
    let candidate = candidate.trim();
    if let Some(exact) = options.iter().find(|option| option.as_str() == candidate) {
        return Ok(exact.clone());
    }
    let mut matches = options
        .iter()
        .filter(|option| option.eq_ignore_ascii_case(candidate));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only.clone()),
        _ => Err(IssueReason::OptionNotAllowed {
            value: candidate.to_string(),
            allowed: options.to_vec(),
        }),
    }
}

fn whole_f64_to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Some(value as i64)
    } else {
        None
    }
}

fn describe_raw(raw: &Value) -> String {
    let text = raw.to_string();
    if text.chars().count() > 40 {
        format!("{}...", text.chars().take(37).collect::<String>())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn tasks_schema() -> CollectionSchema {
        CollectionSchema {
            id: "col-tasks".to_string(),
            user_id: "user-a".to_string(),
            name: "Tasks".to_string(),
            description: None,
            fields: vec![
                FieldDefinition::new("title", FieldType::String).required(),
                FieldDefinition::new("completed", FieldType::Boolean)
                    .with_default(DefaultValue::Static(FieldValue::Boolean(false))),
                FieldDefinition::new("priority", FieldType::Select)
                    .with_options(["low", "medium", "high"]),
                FieldDefinition::new("due", FieldType::Datetime),
                FieldDefinition::new("tags", FieldType::MultiSelect)
                    .with_options(["work", "home", "errand"]),
            ],
            created_at: now(),
            updated_at: now(),
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let doc = validate(&tasks_schema(), &object(json!({"title": "Write report"})), now())
            .unwrap();
        assert_eq!(doc.get("completed"), Some(&FieldValue::Boolean(false)));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = validate(&tasks_schema(), &object(json!({"completed": true})), now())
            .unwrap_err();
        let ParleyError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.issues.len(), 1);
        assert_eq!(errors.issues[0].field, "title");
        assert_eq!(errors.issues[0].reason, IssueReason::Missing);
    }

    #[test]
    fn every_bad_field_is_reported() {
        let err = validate(
            &tasks_schema(),
            &object(json!({"title": "x", "priority": "urgent", "owner": "me"})),
            now(),
        )
        .unwrap_err();
        let ParleyError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = errors.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["owner", "priority"]);
    }

    #[test]
    fn iso_strings_become_datetimes() {
        let doc = validate(
            &tasks_schema(),
            &object(json!({"title": "x", "due": "2026-10-15T09:00:00+02:00"})),
            now(),
        )
        .unwrap();
        assert_eq!(
            doc.get("due"),
            Some(&FieldValue::Datetime(
                Utc.with_ymd_and_hms(2026, 10, 15, 7, 0, 0).unwrap()
            ))
        );
        assert_eq!(
            parse_datetime("2026-10-15"),
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_datetime("2026-10-15 08:30:00"),
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn select_matches_case_insensitively() {
        let doc = validate(
            &tasks_schema(),
            &object(json!({"title": "x", "priority": "HIGH"})),
            now(),
        )
        .unwrap();
        assert_eq!(doc.get("priority"), Some(&FieldValue::Select("high".into())));
    }

    #[test]
    fn multi_select_accepts_comma_lists_in_option_order() {
        let doc = validate(
            &tasks_schema(),
            &object(json!({"title": "x", "tags": "errand, work, work"})),
            now(),
        )
        .unwrap();
        assert_eq!(
            doc.get("tags"),
            Some(&FieldValue::MultiSelect(vec!["work".into(), "errand".into()]))
        );
    }

    #[test]
    fn numbers_are_coerced_where_unambiguous() {
        let int_field = FieldDefinition::new("count", FieldType::Integer);
        assert_eq!(coerce_value(&int_field, &json!("42")), Ok(FieldValue::Integer(42)));
        assert_eq!(coerce_value(&int_field, &json!(3.0)), Ok(FieldValue::Integer(3)));
        assert!(coerce_value(&int_field, &json!(3.5)).is_err());
        assert!(coerce_value(&int_field, &json!(true)).is_err());

        let float_field = FieldDefinition::new("amount", FieldType::Float);
        assert_eq!(coerce_value(&float_field, &json!("12.5")), Ok(FieldValue::Float(12.5)));
        assert!(coerce_value(&float_field, &json!(false)).is_err());

        let bool_field = FieldDefinition::new("done", FieldType::Boolean);
        assert_eq!(coerce_value(&bool_field, &json!("Yes")), Ok(FieldValue::Boolean(true)));
        assert_eq!(coerce_value(&bool_field, &json!(0)), Ok(FieldValue::Boolean(false)));
        assert!(coerce_value(&bool_field, &json!("maybe")).is_err());
    }

    #[test]
    fn null_and_system_keys_are_ignored() {
        let doc = validate(
            &tasks_schema(),
            &object(json!({"title": "x", "due": null, "id": "abc"})),
            now(),
        )
        .unwrap();
        assert!(doc.get("due").is_none());
        assert!(doc.get("id").is_none());
    }

    #[test]
    fn select_without_options_is_invalid() {
        let result = check_field_definition(&FieldDefinition::new("status", FieldType::Select));
        assert!(matches!(result, Err(ParleyError::InvalidField(_))));
    }

    #[test]
    fn static_default_must_satisfy_options() {
        let field = FieldDefinition::new("status", FieldType::Select)
            .with_options(["open", "closed"])
            .with_default(DefaultValue::Static(FieldValue::Select("pending".into())));
        assert!(matches!(
            check_field_definition(&field),
            Err(ParleyError::InvalidField(_))
        ));
    }

    #[test]
    fn static_default_is_normalized() {
        let field = FieldDefinition::new("count", FieldType::Integer)
            .with_default(DefaultValue::Static(FieldValue::String("7".into())));
        let checked = check_field_definition(&field).unwrap();
        assert_eq!(
            checked.default,
            Some(DefaultValue::Static(FieldValue::Integer(7)))
        );
    }

    #[test]
    fn now_default_only_for_datetime() {
        let field =
            FieldDefinition::new("title", FieldType::String).with_default(DefaultValue::Now);
        assert!(check_field_definition(&field).is_err());
        let field =
            FieldDefinition::new("logged_at", FieldType::Datetime).with_default(DefaultValue::Now);
        assert!(check_field_definition(&field).is_ok());
    }

    #[test]
    fn duplicate_and_reserved_names_are_rejected() {
        let duplicate = vec![
            FieldDefinition::new("title", FieldType::String),
            FieldDefinition::new("Title", FieldType::String),
        ];
        assert!(check_field_definitions(&duplicate).is_err());
        assert!(check_field_definition(&FieldDefinition::new("created_at", FieldType::Datetime))
            .is_err());
    }

    #[test]
    fn extension_requires_optional_or_defaulted_fields() {
        let schema = tasks_schema();
        let required = vec![FieldDefinition::new("owner", FieldType::String).required()];
        assert!(check_extension(&schema, &required).is_err());

        let defaulted = vec![FieldDefinition::new("owner", FieldType::String)
            .required()
            .with_default(DefaultValue::Static(FieldValue::String("me".into())))];
        assert!(check_extension(&schema, &defaulted).is_ok());

        let clash = vec![FieldDefinition::new("TITLE", FieldType::String)];
        assert!(check_extension(&schema, &clash).is_err());
    }

    #[test]
    fn old_documents_stay_valid_after_extension() {
        let mut schema = tasks_schema();
        let old_shape = object(json!({"title": "Write report"}));

        let optional = check_extension(&schema, &[FieldDefinition::new("notes", FieldType::String)])
            .unwrap();
        schema.fields.extend(optional);
        assert!(validate(&schema, &old_shape, now()).is_ok());

        let defaulted = check_extension(
            &schema,
            &[FieldDefinition::new("effort", FieldType::Integer)
                .required()
                .with_default(DefaultValue::Static(FieldValue::Integer(1)))],
        )
        .unwrap();
        schema.fields.extend(defaulted);
        let doc = validate(&schema, &old_shape, now()).unwrap();
        assert_eq!(doc.get("effort"), Some(&FieldValue::Integer(1)));
    }

    #[test]
    fn partial_update_coerces_and_unsets() {
        let schema = tasks_schema();
        let update = validate_partial(&schema, &object(json!({"completed": "true", "due": null})))
            .unwrap();
        assert_eq!(update.set.get("completed"), Some(&FieldValue::Boolean(true)));
        assert_eq!(update.unset, vec!["due".to_string()]);

        assert!(validate_partial(&schema, &object(json!({"title": null}))).is_err());
        assert!(validate_partial(&schema, &object(json!({"nope": 1}))).is_err());
    }

    #[test]
    fn merge_update_revalidates_the_result() {
        let schema = tasks_schema();
        let stored = validate(
            &schema,
            &object(json!({"title": "Write report", "completed": true, "priority": "high"})),
            now(),
        )
        .unwrap();

        let merged = merge_update(
            &schema,
            &stored,
            &object(json!({"completed": null, "priority": "LOW"})),
            now(),
        )
        .unwrap();
        assert_eq!(merged.get("completed"), Some(&FieldValue::Boolean(false)));
        assert_eq!(merged.get("priority"), Some(&FieldValue::Select("low".into())));
        assert_eq!(merged.get("title"), stored.get("title"));

        let rejected = merge_update(&schema, &stored, &object(json!({"priority": "urgent"})), now());
        assert!(matches!(rejected, Err(ParleyError::Validation(_))));
    }

    // Property: for generated schemas, validate accepts iff every field is either given
    // a well-typed value, or absent and not required (or defaulted).

    #[derive(Debug, Clone, Copy)]
    enum Supplied {
        Absent,
        Valid,
        Invalid,
    }

    #[derive(Debug, Clone)]
    struct FieldCase {
        field_type: FieldType,
        required: bool,
        defaulted: bool,
        supplied: Supplied,
    }

    const OPTIONS: [&str; 3] = ["a", "b", "c"];

    fn valid_raw(field_type: FieldType) -> Value {
        match field_type {
            FieldType::String => json!("some text"),
            FieldType::Integer => json!(5),
            FieldType::Float => json!(1.5),
            FieldType::Boolean => json!(true),
            FieldType::Datetime => json!("2026-01-02T03:04:05Z"),
            FieldType::Select => json!("b"),
            FieldType::MultiSelect => json!(["a", "c"]),
        }
    }

    fn invalid_raw(field_type: FieldType) -> Value {
        match field_type {
            FieldType::String => json!([1, 2]),
            FieldType::Integer => json!("abc"),
            FieldType::Float => json!(true),
            FieldType::Boolean => json!("maybe"),
            FieldType::Datetime => json!(42),
            FieldType::Select => json!("z"),
            FieldType::MultiSelect => json!(["a", "z"]),
        }
    }

    fn default_for(field_type: FieldType) -> DefaultValue {
        match field_type {
            FieldType::Datetime => DefaultValue::Now,
            FieldType::String => DefaultValue::Static(FieldValue::String("d".into())),
            FieldType::Integer => DefaultValue::Static(FieldValue::Integer(0)),
            FieldType::Float => DefaultValue::Static(FieldValue::Float(0.0)),
            FieldType::Boolean => DefaultValue::Static(FieldValue::Boolean(false)),
            FieldType::Select => DefaultValue::Static(FieldValue::Select("a".into())),
            FieldType::MultiSelect => DefaultValue::Static(FieldValue::MultiSelect(vec![])),
        }
    }

    fn field_case() -> impl Strategy<Value = FieldCase> {
        (
            prop::sample::select(FieldType::ALL.to_vec()),
            any::<bool>(),
            any::<bool>(),
            prop_oneof![
                Just(Supplied::Absent),
                Just(Supplied::Valid),
                Just(Supplied::Invalid)
            ],
        )
            .prop_map(|(field_type, required, defaulted, supplied)| FieldCase {
                field_type,
                required,
                defaulted,
                supplied,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn validate_accepts_exactly_the_well_formed_documents(
            cases in prop::collection::vec(field_case(), 1..8),
            extra_key in any::<bool>(),
        ) {
            let mut fields = Vec::new();
            let mut mapping = Map::new();
            let mut expect_ok = !extra_key;

            for (index, case) in cases.iter().enumerate() {
                let name = format!("f{index}");
                let mut field = FieldDefinition::new(&name, case.field_type);
                if case.field_type.has_options() {
                    field = field.with_options(OPTIONS);
                }
                if case.required {
                    field = field.required();
                }
                if case.defaulted {
                    field = field.with_default(default_for(case.field_type));
                }
                fields.push(check_field_definition(&field).unwrap());

                match case.supplied {
                    Supplied::Absent => {
                        if case.required && !case.defaulted {
                            expect_ok = false;
                        }
                    }
                    Supplied::Valid => {
                        mapping.insert(name, valid_raw(case.field_type));
                    }
                    Supplied::Invalid => {
                        mapping.insert(name, invalid_raw(case.field_type));
                        expect_ok = false;
                    }
                }
            }
            if extra_key {
                mapping.insert("not_in_schema".to_string(), json!(1));
            }

            let result = validate_fields(&fields, &mapping, now());
            prop_assert_eq!(result.is_ok(), expect_ok, "mapping: {:?}", mapping);

            if let Ok(doc) = result {
                for (index, case) in cases.iter().enumerate() {
                    let name = format!("f{index}");
                    let present = matches!(case.supplied, Supplied::Valid) || case.defaulted;
                    prop_assert_eq!(doc.contains_key(&name), present);
                    if let Some(value) = doc.get(&name) {
                        prop_assert_eq!(value.field_type(), case.field_type);
                    }
                }
            }
        }
    }
}
