use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_QUERY_LIMIT: u64 = 50;
pub const MAX_QUERY_LIMIT: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "eq"),
            Self::Ne => write!(f, "ne"),
            Self::Gt => write!(f, "gt"),
            Self::Gte => write!(f, "gte"),
            Self::Lt => write!(f, "lt"),
            Self::Lte => write!(f, "lte"),
            Self::In => write!(f, "in"),
            Self::Contains => write!(f, "contains"),
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "=" | "==" | "equals" => Ok(Self::Eq),
            "ne" | "!=" | "<>" | "not_equals" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "contains" | "like" => Ok(Self::Contains),
            _ => Err(format!("Unknown filter operator: {s}")),
        }
    }
}

/// One field comparison. The raw value is coerced through the field's type when the
/// filter is compiled against a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, Operator::Eq, value)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QueryRequest {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn effective_limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "sum" | "total" => Ok(Self::Sum),
            "avg" | "average" | "mean" => Ok(Self::Avg),
            "min" | "minimum" => Ok(Self::Min),
            "max" | "maximum" => Ok(Self::Max),
            _ => Err(format!("Unknown metric: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub op: Metric,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl MetricSpec {
    pub fn count() -> Self {
        Self {
            op: Metric::Count,
            field: None,
            alias: None,
        }
    }

    pub fn over(op: Metric, field: impl Into<String>) -> Self {
        Self {
            op,
            field: Some(field.into()),
            alias: None,
        }
    }

    /// Output column name: the explicit alias, else `count` or `{op}_{field}`.
    pub fn alias(&self) -> String {
        if let Some(alias) = self.alias.as_ref().filter(|alias| !alias.trim().is_empty()) {
            return alias.clone();
        }
        match &self.field {
            Some(field) => format!("{}_{}", self.op, field),
            None => self.op.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// One output group: its key values and its metric results, both as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub group: BTreeMap<String, Value>,
    pub metrics: BTreeMap<String, Value>,
}
