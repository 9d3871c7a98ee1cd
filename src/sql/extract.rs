//! Recovers a SELECT statement and its metadata from backend output.
//!
//! Each extractor is total: it returns `None` when its shape does not match.
//! [`extract_candidate`] composes them first-success in the order
//! strict JSON, embedded JSON, fenced code block, keyword-bounded substring.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub confidence: Option<f64>,
}

static EMBEDDED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static object pattern"));

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:sql|SQL|postgresql|duckdb)?[ \t]*\r?\n?(.*?)```").expect("static fence pattern")
});

static SELECT_TO_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b.*\bLIMIT\s+\d+").expect("static limit pattern"));

static SELECT_TO_TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b.*?;").expect("static terminator pattern"));

static SELECT_TO_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b.*").expect("static select pattern"));

static EXPLANATION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""explanation"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static explanation pattern")
});

static CONFIDENCE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"confidence"?\s*:\s*"?([0-9]*\.?[0-9]+)"#).expect("static confidence pattern"));

fn starts_with_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn clean_sql(sql: &str) -> Option<String> {
    let sql = sql.trim().trim_end_matches(';').trim();
    starts_with_select(sql).then(|| sql.to_string())
}

fn from_json_value(value: &Value) -> Option<Extracted> {
    let object = value.as_object()?;
    let sql = object.get("sql").and_then(Value::as_str).and_then(clean_sql);
    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string());
    let confidence = object.get("confidence").and_then(|value| match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    sql.map(|sql| Extracted {
        sql: Some(sql),
        explanation,
        confidence,
    })
}

/// The whole response is a JSON object with a SELECT in `sql`.
pub fn strict_json(text: &str) -> Option<Extracted> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    from_json_value(&value)
}

/// A JSON object surrounded by prose.
pub fn embedded_json(text: &str) -> Option<Extracted> {
    let span = EMBEDDED_OBJECT.find(text)?;
    let value: Value = serde_json::from_str(span.as_str()).ok()?;
    from_json_value(&value)
}

/// The first fenced code block holding a SELECT.
pub fn fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| clean_sql(body.as_str()))
}

/// From the first SELECT to the final `LIMIT n`, else to the first `;`,
/// else to the end of the text. JSON string escapes are undone first.
pub fn keyword_bounded(text: &str) -> Option<String> {
    let text = text
        .replace("\\\"", "\"")
        .replace("\\n", " ")
        .replace("\\t", " ");

    let found = SELECT_TO_LIMIT
        .find(&text)
        .or_else(|| SELECT_TO_TERMINATOR.find(&text))
        .or_else(|| SELECT_TO_END.find(&text))?;

    // a JSON envelope that failed to parse leaves its closing quote behind
    let sql = found.as_str().trim_end_matches(['"', '}', ',', '`']);
    clean_sql(sql)
}

pub fn explanation_field(text: &str) -> Option<String> {
    let raw = EXPLANATION_FIELD.captures(text)?.get(1)?.as_str();
    let unescaped = raw.replace("\\n", " ").replace("\\\"", "\"");
    let collapsed = unescaped.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub fn confidence_field(text: &str) -> Option<f64> {
    CONFIDENCE_FIELD.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Runs the chain. Metadata missing from a JSON hit is looked up with the
/// field patterns so text-only answers still keep their explanation.
pub fn extract_candidate(text: &str) -> Extracted {
    if let Some(extracted) = strict_json(text) {
        debug!(strategy = "strict_json", "extracted SQL");
        return extracted;
    }
    if let Some(extracted) = embedded_json(text) {
        debug!(strategy = "embedded_json", "extracted SQL");
        return extracted;
    }

    let sql = fenced_block(text)
        .inspect(|_| debug!(strategy = "fenced_block", "extracted SQL"))
        .or_else(|| keyword_bounded(text).inspect(|_| debug!(strategy = "keyword_bounded", "extracted SQL")));

    Extracted {
        sql,
        explanation: explanation_field(text),
        confidence: confidence_field(text),
    }
}

/// SQL only, for answers that should contain nothing else.
pub fn extract_sql(text: &str) -> Option<String> {
    extract_candidate(text).sql
}
