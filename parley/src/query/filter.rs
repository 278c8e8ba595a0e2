use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::models::{
    CollectionSchema, Condition, Document, FieldDefinition, FieldType, FieldValue, Filter,
    Operator,
};
use crate::schema::coerce_value;

/// Resolves a field name to its definition, including the system fields.
pub fn resolve_field(schema: &CollectionSchema, name: &str) -> Option<FieldDefinition> {
    match name {
        "id" => Some(FieldDefinition::new("id", FieldType::String)),
        "created_at" | "updated_at" => Some(FieldDefinition::new(name, FieldType::Datetime)),
        _ => schema.field(name).cloned(),
    }
}

/// A filter whose operands have been coerced through the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    conditions: Vec<CompiledCondition>,
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledCondition {
    field: String,
    op: Operator,
    operand: Operand,
    case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Single(FieldValue),
    Many(Vec<FieldValue>),
    Substring(String),
}

pub fn compile_filter(schema: &CollectionSchema, filter: &Filter) -> Result<CompiledFilter> {
    let conditions = filter
        .conditions
        .iter()
        .map(|condition| compile_condition(schema, condition))
        .collect::<Result<Vec<_>>>()?;
    Ok(CompiledFilter { conditions })
}

impl CompiledFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.matches(doc.value(&condition.field).as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn compile_condition(
    schema: &CollectionSchema,
    condition: &Condition,
) -> Result<CompiledCondition> {
    let field = resolve_field(schema, &condition.field).ok_or_else(|| {
        ParleyError::InvalidFilter(format!(
            "'{}' is not a field of {}",
            condition.field, schema.name
        ))
    })?;
    let is_id = field.name == "id";
    let field_type = field.field_type;

    let unsupported = || {
        ParleyError::InvalidFilter(format!(
            "operator '{}' cannot be used on {} field '{}'",
            condition.op, field_type, field.name
        ))
    };

    let operand = match condition.op {
        Operator::Eq | Operator::Ne => Operand::Single(coerce_operand(&field, &condition.value)?),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            if !field_type.is_ordered() {
                return Err(unsupported());
            }
            Operand::Single(coerce_operand(&field, &condition.value)?)
        }
        Operator::In => {
            if !matches!(
                field_type,
                FieldType::String
                    | FieldType::Integer
                    | FieldType::Float
                    | FieldType::Select
                    | FieldType::MultiSelect
            ) {
                return Err(unsupported());
            }
            let element_field = element_definition(&field);
            let values = match &condition.value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            if values.is_empty() {
                return Err(ParleyError::InvalidFilter(format!(
                    "'in' on '{}' needs at least one value",
                    field.name
                )));
            }
            Operand::Many(
                values
                    .iter()
                    .map(|value| coerce_operand(&element_field, value))
                    .collect::<Result<_>>()?,
            )
        }
        Operator::Contains => match field_type {
            FieldType::String if !is_id => match coerce_operand(&field, &condition.value)? {
                FieldValue::String(text) => Operand::Substring(text.to_lowercase()),
                _ => return Err(unsupported()),
            },
            FieldType::MultiSelect => {
                Operand::Single(coerce_operand(&element_definition(&field), &condition.value)?)
            }
            _ => return Err(unsupported()),
        },
    };

    Ok(CompiledCondition {
        field: field.name.clone(),
        op: condition.op,
        operand,
        case_insensitive: field_type == FieldType::String && !is_id,
    })
}

/// For MULTI_SELECT the elements of `in` and `contains` are single options.
fn element_definition(field: &FieldDefinition) -> FieldDefinition {
    if field.field_type == FieldType::MultiSelect {
        FieldDefinition::new(field.name.clone(), FieldType::Select)
            .with_options(field.options.clone())
    } else {
        field.clone()
    }
}

fn coerce_operand(field: &FieldDefinition, value: &Value) -> Result<FieldValue> {
    coerce_value(field, value).map_err(|reason| {
        ParleyError::InvalidFilter(format!("value for '{}' {reason}", field.name))
    })
}

impl CompiledCondition {
    fn matches(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value else {
            return self.op == Operator::Ne;
        };

        match (&self.op, &self.operand) {
            (Operator::Eq, Operand::Single(expected)) => self.equals(value, expected),
            (Operator::Ne, Operand::Single(expected)) => !self.equals(value, expected),
            (Operator::Gt, Operand::Single(bound)) => {
                value.compare(bound).is_some_and(|o| o.is_gt())
            }
            (Operator::Gte, Operand::Single(bound)) => {
                value.compare(bound).is_some_and(|o| o.is_ge())
            }
            (Operator::Lt, Operand::Single(bound)) => {
                value.compare(bound).is_some_and(|o| o.is_lt())
            }
            (Operator::Lte, Operand::Single(bound)) => {
                value.compare(bound).is_some_and(|o| o.is_le())
            }
            (Operator::In, Operand::Many(candidates)) => match value {
                FieldValue::MultiSelect(held) => candidates.iter().any(|candidate| {
                    matches!(candidate, FieldValue::Select(option) if held.contains(option))
                }),
                _ => candidates.iter().any(|candidate| self.equals(value, candidate)),
            },
            (Operator::Contains, Operand::Substring(needle)) => match value {
                FieldValue::String(text) => text.to_lowercase().contains(needle.as_str()),
                _ => false,
            },
            (Operator::Contains, Operand::Single(FieldValue::Select(option))) => match value {
                FieldValue::MultiSelect(held) => held.contains(option),
                _ => false,
            },
            _ => false,
        }
    }

    fn equals(&self, value: &FieldValue, expected: &FieldValue) -> bool {
        match (value, expected) {
            (FieldValue::String(a), FieldValue::String(b)) if self.case_insensitive => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => value.compare(expected).is_some_and(|o| o.is_eq()),
        }
    }
}
