use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Select,
    MultiSelect,
}

impl FieldType {
    pub const ALL: [FieldType; 7] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Datetime,
        FieldType::Select,
        FieldType::MultiSelect,
    ];

    /// Whether the type draws its values from a declared option list.
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::MultiSelect)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// Types that support range comparisons and min/max.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Float | FieldType::Datetime
        )
    }

    /// Human phrasing used in validation messages.
    pub fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "text",
            FieldType::Integer => "an integer",
            FieldType::Float => "a number",
            FieldType::Boolean => "true or false",
            FieldType::Datetime => "a date/time",
            FieldType::Select => "one of the allowed options",
            FieldType::MultiSelect => "a list of allowed options",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Datetime => write!(f, "DATETIME"),
            Self::Select => write!(f, "SELECT"),
            Self::MultiSelect => write!(f, "MULTI_SELECT"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "string" | "text" | "str" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "number" | "decimal" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "datetime" | "date" | "timestamp" => Ok(Self::Datetime),
            "select" => Ok(Self::Select),
            "multi_select" | "multiselect" => Ok(Self::MultiSelect),
            _ => Err(format!("Unknown field type: {s}")),
        }
    }
}

/// A typed field value. The tag always agrees with the owning field's [`FieldType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Datetime(DateTime<Utc>),
    Select(String),
    MultiSelect(Vec<String>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::String(_) => FieldType::String,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Datetime(_) => FieldType::Datetime,
            FieldValue::Select(_) => FieldType::Select,
            FieldValue::MultiSelect(_) => FieldType::MultiSelect,
        }
    }

    /// Plain JSON rendering used on the wire and in prompts.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(value) | FieldValue::Select(value) => Value::from(value.clone()),
            FieldValue::Integer(value) => Value::from(*value),
            FieldValue::Float(value) => Value::from(*value),
            FieldValue::Boolean(value) => Value::from(*value),
            FieldValue::Datetime(value) => {
                Value::from(value.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            FieldValue::MultiSelect(values) => Value::from(values.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Ordering between two values of compatible types. Integers and floats compare
    /// numerically with each other; every other pairing must share a tag.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b))
            | (FieldValue::Select(a), FieldValue::Select(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (
                FieldValue::Integer(_) | FieldValue::Float(_),
                FieldValue::Integer(_) | FieldValue::Float(_),
            ) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Datetime(a), FieldValue::Datetime(b)) => Some(a.cmp(b)),
            (FieldValue::MultiSelect(a), FieldValue::MultiSelect(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(value) | FieldValue::Select(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::Datetime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M UTC")),
            FieldValue::MultiSelect(values) => write!(f, "{}", values.join(", ")),
        }
    }
}

/// Value applied to absent fields at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    Static(FieldValue),
    /// Current instant, DATETIME fields only.
    Now,
}

impl DefaultValue {
    pub fn resolve(&self, now: DateTime<Utc>) -> FieldValue {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Now => FieldValue::Datetime(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            options: Vec::new(),
            description: None,
            unique: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
