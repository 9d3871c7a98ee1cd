use crate::db::db_utils::SqlParam;
use crate::domain::DateRange;
use chrono::NaiveDate;
use regex::Regex;

/// Days covered when a request carries no date range.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Turns literal tenant ids and range dates baked into `sql` back into the
/// `$1`/`$2`/`$3` markers. Running it twice gives the same text.
pub fn reparameterize(sql: &str, tenant_id: &str, range: Option<&DateRange>) -> String {
    let mut sql = replace_quoted(sql, tenant_id, None, "$1");

    if let Some(range) = range {
        sql = replace_quoted(&sql, &iso(range.start), Some("DATE"), "$2");
        sql = replace_quoted(&sql, &iso(range.end), Some("DATE"), "$3");
    }

    sql
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn replace_quoted(sql: &str, literal: &str, type_prefix: Option<&str>, marker: &str) -> String {
    let literal = literal.trim();
    if literal.is_empty() {
        return sql.to_string();
    }

    // `'value'`, `'value'::uuid` and (for dates) `DATE 'value'`
    let prefix = type_prefix
        .map(|keyword| format!(r"(?:\b{}\s+)?", keyword))
        .unwrap_or_default();
    let pattern = format!(r"(?i){}'{}'(?:::\w+)?", prefix, regex::escape(literal));

    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(sql, marker).into_owned(),
        Err(_) => sql.to_string(),
    }
}

/// Values bound to every pipeline statement: tenant, range start, range end.
pub fn pipeline_params(tenant_id: &str, range: &DateRange) -> Vec<SqlParam> {
    vec![
        SqlParam::Text(tenant_id.to_string()),
        SqlParam::Date(range.start),
        SqlParam::Date(range.end),
    ]
}

/// The caller's range, or the trailing window ending `today`.
pub fn effective_range(range: Option<&DateRange>, today: NaiveDate) -> DateRange {
    range
        .copied()
        .unwrap_or_else(|| DateRange::trailing_days(DEFAULT_WINDOW_DAYS, today))
}
