use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::models::{
    AggregateRequest, AggregateRow, CollectionSchema, Document, FieldValue, Metric, MetricSpec,
    SortOrder,
};

use super::filter::{compile_filter, resolve_field};
use super::sort::compare_for_sort;

/// Checks group keys and metrics against the schema, returning the metrics to compute
/// (a bare `count` when none were asked for).
pub fn check_aggregate(
    schema: &CollectionSchema,
    request: &AggregateRequest,
) -> Result<Vec<MetricSpec>> {
    for field in &request.group_by {
        if resolve_field(schema, field).is_none() {
            return Err(ParleyError::InvalidFilter(format!(
                "cannot group by '{field}': not a field of {}",
                schema.name
            )));
        }
    }

    let metrics = if request.metrics.is_empty() {
        vec![MetricSpec::count()]
    } else {
        request.metrics.clone()
    };

    let mut aliases = HashSet::new();
    for metric in &metrics {
        check_metric(schema, metric)?;
        let alias = metric.alias();
        if request.group_by.contains(&alias) || !aliases.insert(alias.clone()) {
            return Err(ParleyError::InvalidFilter(format!(
                "output name '{alias}' is used more than once"
            )));
        }
    }
    Ok(metrics)
}

fn check_metric(schema: &CollectionSchema, metric: &MetricSpec) -> Result<()> {
    let Some(name) = metric.field.as_deref() else {
        return if metric.op == Metric::Count {
            Ok(())
        } else {
            Err(ParleyError::InvalidFilter(format!(
                "{} needs a field",
                metric.op
            )))
        };
    };

    let field = resolve_field(schema, name).ok_or_else(|| {
        ParleyError::InvalidFilter(format!("'{name}' is not a field of {}", schema.name))
    })?;
    let allowed = match metric.op {
        Metric::Count => true,
        Metric::Sum | Metric::Avg => field.field_type.is_numeric(),
        Metric::Min | Metric::Max => field.field_type.is_ordered(),
    };
    if allowed {
        Ok(())
    } else {
        Err(ParleyError::InvalidFilter(format!(
            "{} cannot be computed over {} field '{name}'",
            metric.op, field.field_type
        )))
    }
}

/// Groups the matching documents and computes every metric per group. Without
/// `group_by` exactly one row is produced, even for an empty collection.
pub fn run_aggregate(
    schema: &CollectionSchema,
    docs: &[Document],
    request: &AggregateRequest,
) -> Result<Vec<AggregateRow>> {
    let filter = compile_filter(schema, &request.filter)?;
    let metrics = check_aggregate(schema, request)?;
    let matching: Vec<&Document> = docs.iter().filter(|doc| filter.matches(doc)).collect();

    let mut groups: Vec<(Vec<Option<FieldValue>>, Vec<&Document>)> = Vec::new();
    if request.group_by.is_empty() {
        groups.push((Vec::new(), matching));
    } else {
        for doc in matching {
            let key: Vec<Option<FieldValue>> = request
                .group_by
                .iter()
                .map(|field| doc.value(field))
                .collect();
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }
        groups.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| {
            let group = request
                .group_by
                .iter()
                .zip(key)
                .map(|(field, value)| {
                    (
                        field.clone(),
                        value.map(|v| v.to_json()).unwrap_or(Value::Null),
                    )
                })
                .collect();
            let metrics = metrics
                .iter()
                .map(|metric| (metric.alias(), compute(metric, &members)))
                .collect::<BTreeMap<_, _>>();
            AggregateRow { group, metrics }
        })
        .collect())
}

fn compare_keys(a: &[Option<FieldValue>], b: &[Option<FieldValue>]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_for_sort(x.as_ref(), y.as_ref(), SortOrder::Asc))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn compute(metric: &MetricSpec, members: &[&Document]) -> Value {
    let Some(field) = metric.field.as_deref() else {
        return Value::from(members.len() as u64);
    };
    let values: Vec<FieldValue> = members.iter().filter_map(|doc| doc.value(field)).collect();

    match metric.op {
        Metric::Count => Value::from(values.len() as u64),
        Metric::Sum => sum(&values),
        Metric::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(FieldValue::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Metric::Min => extreme(&values, Ordering::Less),
        Metric::Max => extreme(&values, Ordering::Greater),
    }
}

fn sum(values: &[FieldValue]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let integers: Option<Vec<i64>> = values
        .iter()
        .map(|value| match value {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        })
        .collect();
    if let Some(total) = integers.and_then(|ns| ns.into_iter().try_fold(0i64, i64::checked_add)) {
        return Value::from(total);
    }
    Value::from(values.iter().filter_map(FieldValue::as_f64).sum::<f64>())
}

fn extreme(values: &[FieldValue], wanted: Ordering) -> Value {
    values
        .iter()
        .fold(None::<&FieldValue>, |best, value| match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(value),
        })
        .map(FieldValue::to_json)
        .unwrap_or(Value::Null)
}
