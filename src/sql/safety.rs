use crate::db::schema::{TENANT_COLUMN, TENANT_SCOPED_TABLE};
use crate::sql::lexer::{has_multiple_statements, mask_literals, mask_quoted};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Mutating or file-touching statements that never reach the store.
pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT INTO",
    "UPDATE",
    "DELETE FROM",
    "DROP",
    "ALTER",
    "TRUNCATE",
    "GRANT",
    "REVOKE",
    "CREATE",
    "EXECUTE",
    "EXEC",
    "ATTACH",
    "DETACH",
    "COPY",
    "EXPORT",
    "IMPORT",
    "INSTALL",
    "LOAD",
    "PRAGMA",
];

static DENIED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DENIED_KEYWORDS
        .iter()
        .map(|keyword| {
            let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
            let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
            (*keyword, Regex::new(&pattern).expect("static keyword pattern"))
        })
        .collect()
});

// DuckDB table functions that read arbitrary files.
static FILE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(read_(?:csv|csv_auto|parquet|json|json_auto|json_objects|ndjson|text|blob)|parquet_scan|glob)\s*\(")
        .expect("static file function pattern")
});

static TENANT_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{}\s*=\s*\$1\b", TENANT_COLUMN)).expect("static tenant pattern")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn safe() -> Self {
        Self { safe: true, reason: None }
    }

    fn unsafe_because(reason: String) -> Self {
        Self { safe: false, reason: Some(reason) }
    }
}

/// First deny-listed keyword found outside literals.
pub fn first_denied_keyword(sql: &str) -> Option<&'static str> {
    let masked = mask_quoted(sql);
    DENIED_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&masked))
        .map(|(keyword, _)| *keyword)
}

pub fn first_file_function(sql: &str) -> Option<String> {
    let masked = mask_literals(sql);
    FILE_FUNCTION
        .captures(&masked)
        .map(|caps| caps[1].to_lowercase())
}

/// True when `table` is referenced as a whole word outside literals.
pub fn references_table(sql: &str, table: &str) -> bool {
    let masked = mask_literals(sql).to_lowercase();
    let table = table.to_lowercase();
    masked.match_indices(&table).any(|(start, _)| {
        let before = masked[..start].chars().next_back();
        let after = masked[start + table.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `pharmacy_id = $1` outside literals.
pub fn has_tenant_filter(sql: &str) -> bool {
    TENANT_FILTER.is_match(&mask_literals(sql))
}

/// Last check before execution. Runs on every statement, templates included.
pub fn check_safety(sql: &str) -> SafetyVerdict {
    if let Some(keyword) = first_denied_keyword(sql) {
        return SafetyVerdict::unsafe_because(format!("Forbidden operation: {}", keyword));
    }

    if let Some(function) = first_file_function(sql) {
        return SafetyVerdict::unsafe_because(format!("Forbidden file access function: {}", function));
    }

    if has_multiple_statements(sql) {
        return SafetyVerdict::unsafe_because("Multiple statements are not allowed".to_string());
    }

    if references_table(sql, TENANT_SCOPED_TABLE) && !has_tenant_filter(sql) {
        return SafetyVerdict::unsafe_because(format!(
            "Missing tenant filter {} = $1 on {}",
            TENANT_COLUMN, TENANT_SCOPED_TABLE
        ));
    }

    SafetyVerdict::safe()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_rejected_by_name() {
        let verdict = check_safety("DROP TABLE data_pharmacy;");
        assert!(!verdict.safe);
        assert!(verdict.reason.unwrap_or_default().contains("DROP"));
    }

    #[test]
    fn keywords_inside_literals_or_identifiers_are_ignored() {
        let sql = "SELECT name AS \"Update\" FROM data_globalproduct WHERE name = 'Drop solaire' LIMIT 5";
        assert!(check_safety(sql).safe);
        assert!(check_safety("SELECT last_update FROM data_pharmacy").safe);
    }

    #[test]
    fn duckdb_file_statements_are_denied() {
        assert_eq!(first_denied_keyword("ATTACH 'other.db' AS o"), Some("ATTACH"));
        assert_eq!(first_denied_keyword("copy data_sales to 'x.csv'"), Some("COPY"));
        assert!(!check_safety("SELECT * FROM read_csv('/etc/passwd')").safe);
    }

    #[test]
    fn stacked_statements_are_rejected() {
        let verdict = check_safety("SELECT 1; SELECT 2");
        assert_eq!(verdict.reason.as_deref(), Some("Multiple statements are not allowed"));
    }

    #[test]
    fn product_table_requires_bound_tenant_filter() {
        assert!(!check_safety("SELECT ip.name FROM data_internalproduct ip LIMIT 10").safe);
        assert!(!check_safety("SELECT ip.name FROM data_internalproduct ip WHERE ip.pharmacy_id = 'abc'").safe);
        assert!(check_safety("SELECT ip.name FROM data_internalproduct ip WHERE ip.pharmacy_id = $1 LIMIT 10").safe);
        // $10 is not the tenant marker
        assert!(!has_tenant_filter("WHERE pharmacy_id = $10"));
    }

    #[test]
    fn quoted_table_names_still_need_the_tenant_filter() {
        let verdict = check_safety("SELECT * FROM \"data_internalproduct\" LIMIT 5");
        assert!(!verdict.safe);
        assert!(verdict.reason.unwrap_or_default().contains("pharmacy_id"));
        assert!(!check_safety("SELECT * FROM \"DATA_INTERNALPRODUCT\" LIMIT 5").safe);
        assert!(check_safety("SELECT * FROM \"data_internalproduct\" WHERE \"pharmacy_id\" = $1 LIMIT 5").safe);
        // a filter spelled inside an alias is not a filter
        assert!(!check_safety("SELECT 1 AS \"pharmacy_id = $1\" FROM data_internalproduct LIMIT 5").safe);
    }

    #[test]
    fn comments_neither_hide_nor_supply_the_tenant_filter() {
        assert!(!check_safety("SELECT ip.name FROM data_internalproduct ip -- WHERE ip.pharmacy_id = $1").safe);
        assert!(!check_safety("SELECT ip.name FROM data_internalproduct ip /* pharmacy_id = $1 */ LIMIT 5").safe);
        assert!(!check_safety("SELECT 1 FROM data_pharmacy -- l'officine\n; DROP TABLE data_sales").safe);
        assert!(check_safety("SELECT ip.name FROM data_internalproduct ip -- produits\nWHERE ip.pharmacy_id = $1").safe);
    }

    #[test]
    fn table_references_are_word_bounded() {
        assert!(references_table("SELECT * FROM data_productorder", "data_productorder"));
        assert!(!references_table("SELECT * FROM data_productorder", "data_order"));
        assert!(references_table("select * from DATA_ORDER o", "data_order"));
    }
}
