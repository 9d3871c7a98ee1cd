use crate::db::db_utils::Row;
use crate::domain::QuestionCategory;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const SAMPLE_ROWS: usize = 20;
const MAX_CELL_CHARS: usize = 50;
const TRUNCATED_CELL_CHARS: usize = 47;

static ISO_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ]\d{2}:\d{2}").expect("static timestamp pattern"));

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::Number(number)) => match (number.as_i64(), number.as_f64()) {
            (Some(int), _) => int.to_string(),
            (None, Some(float)) if float.fract() == 0.0 => format!("{}", float),
            (None, Some(float)) => format!("{:.2}", float),
            _ => number.to_string(),
        },
        Some(Value::String(text)) => {
            if let Some(date) = ISO_TIMESTAMP.captures(text).and_then(|caps| caps.get(1)) {
                return date.as_str().to_string();
            }
            if text.chars().count() > MAX_CELL_CHARS {
                let head: String = text.chars().take(TRUNCATED_CELL_CHARS).collect();
                format!("{}...", head)
            } else {
                text.clone()
            }
        }
        Some(other) => other.to_string(),
    }
}

/// Pipe-separated sample of the result, as shown to the analysis prompt.
pub fn data_context(columns: &[String], rows: &[Row], row_count: usize) -> String {
    if row_count == 0 || rows.is_empty() {
        return "RÉSULTATS: Aucune donnée trouvée.".to_string();
    }

    let sample_size = rows.len().min(SAMPLE_ROWS);
    let header = columns.join(" | ");
    let separator = vec!["---"; columns.len()].join(" | ");
    let lines: Vec<String> = rows[..sample_size]
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| format_cell(row.get(column)))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    let shown = if sample_size < row_count {
        format!("montrant les {} premières lignes", sample_size)
    } else {
        format!("montrant {} lignes", sample_size)
    };

    let mut context = format!(
        "RÉSULTATS ({} ligne(s) au total, {}):\n\n{}\n{}\n{}",
        row_count,
        shown,
        header,
        separator,
        lines.join("\n")
    );
    if sample_size < row_count {
        context.push_str(&format!(
            "\n\n...et {} lignes supplémentaires non affichées.",
            row_count - sample_size
        ));
    }
    context
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Unspecified,
}

impl Granularity {
    pub fn detect(question: &str) -> Self {
        let lower = question.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|word| lower.contains(word));

        if has(&["jour", "aujourd'hui", "quotidien"]) {
            Granularity::Daily
        } else if has(&["semaine", "hebdomadaire"]) {
            Granularity::Weekly
        } else if has(&["mois", "mensuel"]) {
            Granularity::Monthly
        } else if has(&["année", "annuel"]) {
            Granularity::Yearly
        } else {
            Granularity::Unspecified
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Daily => "journalière",
            Granularity::Weekly => "hebdomadaire",
            Granularity::Monthly => "mensuelle",
            Granularity::Yearly => "annuelle",
            Granularity::Unspecified => "non spécifiée",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Best,
    Worst,
    General,
}

impl Focus {
    pub fn detect(question: &str) -> Self {
        let lower = question.to_lowercase();
        if lower.contains("top") || lower.contains("meilleur") {
            Focus::Best
        } else if lower.contains("pire") || lower.contains("faible") {
            Focus::Worst
        } else {
            Focus::General
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Focus::Best => "performances élevées",
            Focus::Worst => "performances faibles",
            Focus::General => "général",
        }
    }
}

pub fn query_context(question: &str) -> String {
    format!(
        "CONTEXTE D'ANALYSE:\n- Type d'analyse demandée: {}\n- Période temporelle: {}\n- Focus: {}",
        QuestionCategory::detect(question).label(),
        Granularity::detect(question).label(),
        Focus::detect(question).label()
    )
}
