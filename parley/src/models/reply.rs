use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParleyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxItem {
    pub label: String,
    pub checked: bool,
}

/// A typed piece of a reply, rendered by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiElement {
    Markdown {
        content: String,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Chart {
        chart_type: ChartType,
        labels: Vec<String>,
        datasets: Vec<ChartDataset>,
    },
    Checkbox {
        items: Vec<CheckboxItem>,
    },
}

impl UiElement {
    pub fn markdown(content: impl Into<String>) -> Self {
        UiElement::Markdown {
            content: content.into(),
        }
    }

    pub fn table(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != headers.len()) {
            return Err(ParleyError::Internal(format!(
                "Table row has {} cells but {} headers",
                row.len(),
                headers.len()
            )));
        }
        Ok(UiElement::Table { headers, rows })
    }

    pub fn chart(
        chart_type: ChartType,
        labels: Vec<String>,
        datasets: Vec<ChartDataset>,
    ) -> Result<Self> {
        if let Some(dataset) = datasets.iter().find(|d| d.data.len() != labels.len()) {
            return Err(ParleyError::Internal(format!(
                "Chart dataset '{}' has {} points but {} labels",
                dataset.label,
                dataset.data.len(),
                labels.len()
            )));
        }
        Ok(UiElement::Chart {
            chart_type,
            labels,
            datasets,
        })
    }

    pub fn checkbox(items: Vec<CheckboxItem>) -> Self {
        UiElement::Checkbox { items }
    }

    /// Plain-text rendering stored in conversation history.
    pub fn to_text(&self) -> String {
        match self {
            UiElement::Markdown { content } => content.clone(),
            UiElement::Table { headers, rows } => {
                let mut lines = vec![
                    format!("| {} |", headers.join(" | ")),
                    format!("|{}|", vec!["---"; headers.len()].join("|")),
                ];
                for row in rows {
                    let cells: Vec<String> = row.iter().map(cell_text).collect();
                    lines.push(format!("| {} |", cells.join(" | ")));
                }
                lines.join("\n")
            }
            UiElement::Chart {
                chart_type,
                labels,
                datasets,
            } => {
                let series: Vec<&str> = datasets.iter().map(|d| d.label.as_str()).collect();
                format!(
                    "[{:?} chart of {} over {}]",
                    chart_type,
                    series.join(", "),
                    labels.join(", ")
                )
            }
            UiElement::Checkbox { items } => items
                .iter()
                .map(|item| {
                    let mark = if item.checked { "x" } else { " " };
                    format!("- [{mark}] {}", item.label)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Ordered list of elements answering one message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reply {
    pub elements: Vec<UiElement>,
}

impl Reply {
    pub fn new(elements: Vec<UiElement>) -> Self {
        Self { elements }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self::new(vec![UiElement::markdown(content)])
    }

    pub fn push(&mut self, element: UiElement) {
        self.elements.push(element);
    }

    pub fn to_text(&self) -> String {
        self.elements
            .iter()
            .map(UiElement::to_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_rejects_ragged_rows() {
        let result = UiElement::table(
            vec!["title".into(), "completed".into()],
            vec![vec![json!("Write report")]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn chart_rejects_mismatched_dataset() {
        let result = UiElement::chart(
            ChartType::Bar,
            vec!["food".into(), "rent".into()],
            vec![ChartDataset {
                label: "sum_amount".into(),
                data: vec![1.0],
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn elements_serialize_with_type_tag() {
        let element = UiElement::checkbox(vec![CheckboxItem {
            label: "Write report".into(),
            checked: false,
        }]);
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["type"], "checkbox");
        assert_eq!(value["items"][0]["checked"], false);
    }

    #[test]
    fn table_text_is_markdown() {
        let table = UiElement::table(
            vec!["title".into()],
            vec![vec![json!("Write report")], vec![json!(null)]],
        )
        .unwrap();
        assert_eq!(table.to_text(), "| title |\n|---|\n| Write report |\n|  |");
    }
}
