use crate::db::db_utils::Row;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Bar,
    Line,
    Pie,
    Table,
    Metric,
}

impl VisualizationKind {
    pub const ALL: [VisualizationKind; 5] = [
        VisualizationKind::Bar,
        VisualizationKind::Line,
        VisualizationKind::Pie,
        VisualizationKind::Table,
        VisualizationKind::Metric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizationKind::Bar => "bar",
            VisualizationKind::Line => "line",
            VisualizationKind::Pie => "pie",
            VisualizationKind::Table => "table",
            VisualizationKind::Metric => "metric",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name.trim())
    }
}

static KIND_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""visualization(?:Type|Kind)"\s*:\s*"([^"]+)""#).expect("static kind pattern")
});

static KIND_PHRASES: LazyLock<Vec<(VisualizationKind, Regex)>> = LazyLock::new(|| {
    VisualizationKind::ALL
        .into_iter()
        .map(|kind| {
            let pattern = format!(r"(?i)\b{}\s+(?:chart|graph|diagram|plot)\b", kind.as_str());
            (kind, Regex::new(&pattern).expect("static phrase pattern"))
        })
        .collect()
});

const TREND_WORDS: &[&str] = &["tendance", "évolution", "temps", "période"];
const SHARE_WORDS: &[&str] = &["proportion", "répartition", "pourcentage", "distribution"];
const RANKING_WORDS: &[&str] = &["comparer", "comparaison", "classement", "top"];

/// Picks a chart kind from an analysis response. Falls back to a table.
pub fn detect_kind(response: &str) -> VisualizationKind {
    if let Some(kind) = KIND_FIELD
        .captures_iter(response)
        .find_map(|caps| VisualizationKind::parse(&caps[1]))
    {
        return kind;
    }

    if let Some((kind, _)) = KIND_PHRASES.iter().find(|(_, phrase)| phrase.is_match(response)) {
        return *kind;
    }

    let lower = response.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| lower.contains(word));
    if mentions(TREND_WORDS) {
        VisualizationKind::Line
    } else if mentions(SHARE_WORDS) {
        VisualizationKind::Pie
    } else if mentions(RANKING_WORDS) {
        VisualizationKind::Bar
    } else {
        VisualizationKind::Table
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VisualizationPayload {
    Bar {
        data: Vec<Row>,
        #[serde(rename = "xAxis", skip_serializing_if = "Option::is_none")]
        x_axis: Option<String>,
        series: Vec<String>,
    },
    Line {
        data: Vec<Row>,
        #[serde(rename = "xAxis", skip_serializing_if = "Option::is_none")]
        x_axis: Option<String>,
        series: Vec<String>,
    },
    Pie {
        data: Vec<PieSlice>,
    },
    Metric {
        data: Option<Metric>,
    },
    Table {
        data: Vec<Row>,
        columns: Vec<String>,
    },
}

fn label_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

// Decimals may come back from the store as strings.
fn number_of(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Reshapes result rows for `kind`. Empty inputs give empty payloads.
pub fn shape(kind: VisualizationKind, columns: &[String], rows: &[Row]) -> VisualizationPayload {
    match kind {
        VisualizationKind::Bar | VisualizationKind::Line => {
            let data = rows.to_vec();
            let x_axis = columns.first().cloned();
            let series = columns.iter().skip(1).cloned().collect();
            if kind == VisualizationKind::Bar {
                VisualizationPayload::Bar { data, x_axis, series }
            } else {
                VisualizationPayload::Line { data, x_axis, series }
            }
        }
        VisualizationKind::Pie => {
            let (Some(label_col), value_col) = (columns.first(), columns.get(1)) else {
                return VisualizationPayload::Pie { data: Vec::new() };
            };
            let data = rows
                .iter()
                .map(|row| PieSlice {
                    name: label_of(row.get(label_col)),
                    value: value_col.map(|col| number_of(row.get(col))).unwrap_or(0.0),
                })
                .collect();
            VisualizationPayload::Pie { data }
        }
        VisualizationKind::Metric => {
            let data = match (rows.first(), columns.first()) {
                (Some(row), Some(label)) => {
                    let value_col = columns.get(1).unwrap_or(label);
                    Some(Metric {
                        value: row.get(value_col).cloned().unwrap_or(Value::Null),
                        label: label.clone(),
                    })
                }
                _ => None,
            };
            VisualizationPayload::Metric { data }
        }
        VisualizationKind::Table => VisualizationPayload::Table {
            data: rows.to_vec(),
            columns: columns.to_vec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Vec<String>, Vec<Row>) {
        let columns = vec!["Catégorie".to_string(), "CA".to_string()];
        let rows = vec![
            json!({"Catégorie": "Solaire", "CA": 1200.5}),
            json!({"Catégorie": "Grippe", "CA": "310.00"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().expect("row"))
        .collect();
        (columns, rows)
    }

    #[test]
    fn kind_detection_order() {
        assert_eq!(detect_kind(r#"{"visualizationType": "pie"}"#), VisualizationKind::Pie);
        assert_eq!(detect_kind(r#"{"visualizationType": "radar"} tendance"#), VisualizationKind::Line);
        assert_eq!(detect_kind("Un Bar chart serait adapté, vu la tendance"), VisualizationKind::Bar);
        assert_eq!(detect_kind("La répartition par catégorie"), VisualizationKind::Pie);
        assert_eq!(detect_kind("Le classement des produits"), VisualizationKind::Bar);
        assert_eq!(detect_kind("Voici les chiffres."), VisualizationKind::Table);
    }

    #[test]
    fn pie_uses_first_two_columns() {
        let (columns, rows) = sample();
        let payload = shape(VisualizationKind::Pie, &columns, &rows);
        assert_eq!(
            payload,
            VisualizationPayload::Pie {
                data: vec![
                    PieSlice { name: "Solaire".to_string(), value: 1200.5 },
                    PieSlice { name: "Grippe".to_string(), value: 310.0 },
                ]
            }
        );
    }

    #[test]
    fn bar_payload_serializes_axis_and_series() {
        let (columns, rows) = sample();
        let value = serde_json::to_value(shape(VisualizationKind::Bar, &columns, &rows)).expect("json");
        assert_eq!(value["type"], "bar");
        assert_eq!(value["xAxis"], "Catégorie");
        assert_eq!(value["series"], json!(["CA"]));
        assert_eq!(value["data"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn metric_takes_first_row_second_column() {
        let (columns, rows) = sample();
        let payload = shape(VisualizationKind::Metric, &columns, &rows);
        let value = serde_json::to_value(payload).expect("json");
        assert_eq!(value["data"]["value"], 1200.5);
        assert_eq!(value["data"]["label"], "Catégorie");
    }

    #[test]
    fn empty_rows_never_panic() {
        for kind in VisualizationKind::ALL {
            let payload = shape(kind, &[], &[]);
            let value = serde_json::to_value(payload).expect("json");
            assert_eq!(value["type"], kind.as_str());
        }
    }
}
