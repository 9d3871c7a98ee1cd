use crate::db::schema::{RELATIONSHIPS, Relationship, TENANT_COLUMN, TENANT_SCOPED_TABLE};
use crate::llm::LlmManager;
use crate::llm::models::{ChatMessage, CompletionRequest};
use crate::llm::prompts;
use crate::sql::extract::extract_sql;
use crate::sql::lexer::{
    balance, collapse_whitespace, depth_map, has_multiple_statements, mask_literals, mask_quoted, split_top_level,
};
use crate::sql::safety::{first_denied_keyword, first_file_function, has_tenant_filter, references_table};
use crate::sql::{FindingKind, ValidationFinding};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Subquery levels allowed below the outer SELECT.
pub const MAX_SUBQUERY_DEPTH: usize = 2;

static FROM_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("static pattern"));
static LIMIT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("static pattern"));
static SELECT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSELECT\b").expect("static pattern"));
static GROUP_BY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").expect("static pattern"));
static AFTER_GROUP_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:HAVING|ORDER\s+BY|LIMIT|OFFSET|QUALIFY|WINDOW|UNION|INTERSECT|EXCEPT)\b").expect("static pattern")
});
static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(\w+)(?:\s+(?:AS\s+)?(\w+))?").expect("static pattern")
});
static AGGREGATE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:SUM|COUNT|AVG|MIN|MAX|STRING_AGG|ARRAY_AGG|LIST|MEDIAN|MODE|STDDEV\w*|VARIANCE|VAR_\w+|BOOL_AND|BOOL_OR|ANY_VALUE|ARG_MAX|ARG_MIN|FIRST|LAST)\s*\(",
    )
    .expect("static pattern")
});
static QUALIFIED_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\.([A-Za-z_]\w*)\b").expect("static pattern"));
static EXTRACT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bEXTRACT\s*\(\s*\w+\s+FROM\s+([A-Za-z_][\w.]*)\s*\)").expect("static pattern")
});
static TOP_LEVEL_AS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAS\b").expect("static pattern"));
static CONSTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:-?\d+(?:\.\d+)?|'.*'|NULL|TRUE|FALSE)$").expect("static pattern"));

// Words that can follow a table name but are never an alias.
const NOT_AN_ALIAS: &[&str] = &[
    "where", "join", "left", "right", "inner", "outer", "full", "cross", "natural", "on", "using", "group",
    "order", "limit", "having", "union", "except", "intersect", "lateral", "window", "qualify", "offset",
];

fn finding(kind: FindingKind, message: impl Into<String>) -> ValidationFinding {
    ValidationFinding::new(kind, message)
}

pub fn check_syntax(sql: &str) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let masked = mask_literals(sql);

    if !masked.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        findings.push(finding(FindingKind::Syntax, "Query must start with SELECT"));
    }
    if !FROM_KEYWORD.is_match(&masked) {
        findings.push(finding(FindingKind::Syntax, "Missing FROM clause"));
    }

    let balance = balance(sql);
    if !balance.parens_balanced {
        findings.push(finding(FindingKind::Syntax, "Unbalanced parentheses"));
    }
    if !balance.quotes_closed {
        findings.push(finding(FindingKind::Syntax, "Unbalanced quotes"));
    }
    if !balance.comments_closed {
        findings.push(finding(FindingKind::Syntax, "Unterminated block comment"));
    }

    if let Some(keyword) = first_denied_keyword(sql) {
        findings.push(finding(FindingKind::Syntax, format!("Forbidden operation: {}", keyword)));
    }
    if let Some(function) = first_file_function(sql) {
        findings.push(finding(FindingKind::Syntax, format!("Forbidden file access function: {}", function)));
    }
    if has_multiple_statements(sql) {
        findings.push(finding(FindingKind::Syntax, "Multiple statements are not allowed"));
    }

    findings
}

/// Names a table can be referred to by: itself plus every alias it gets in
/// FROM/JOIN clauses.
fn qualifiers(masked: &str, table: &str) -> Vec<String> {
    let mut names = vec![table.to_lowercase()];
    for caps in TABLE_REFERENCE.captures_iter(masked) {
        if !caps[1].eq_ignore_ascii_case(table) {
            continue;
        }
        if let Some(alias) = caps.get(2) {
            let alias = alias.as_str().to_lowercase();
            if !NOT_AN_ALIAS.contains(&alias.as_str()) && !names.contains(&alias) {
                names.push(alias);
            }
        }
    }
    names
}

fn has_join_predicate(masked: &str, relation: &Relationship) -> bool {
    let alternation = |names: Vec<String>| {
        names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|")
    };
    let left = alternation(qualifiers(masked, relation.table));
    let right = alternation(qualifiers(masked, relation.related_table));
    let (column, related_column) = (regex::escape(relation.column), regex::escape(relation.related_column));

    let pattern = format!(
        r"(?i)\b(?:{left})\.{column}\s*=\s*(?:{right})\.{related_column}\b|\b(?:{right})\.{related_column}\s*=\s*(?:{left})\.{column}\b"
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(masked))
}

pub fn check_relations(sql: &str) -> Vec<ValidationFinding> {
    let masked = mask_literals(sql);
    let mut findings: Vec<ValidationFinding> = RELATIONSHIPS
        .iter()
        .filter(|relation| references_table(sql, relation.table) && references_table(sql, relation.related_table))
        .filter(|relation| !has_join_predicate(&masked, relation))
        .map(|relation| {
            finding(
                FindingKind::Relation,
                format!("Missing or incorrect join between {}", relation.describe().replace(" -> ", " and ")),
            )
        })
        .collect();

    if references_table(sql, TENANT_SCOPED_TABLE) && !has_tenant_filter(sql) {
        findings.push(finding(
            FindingKind::Relation,
            format!("Missing tenant filter {} = $1 in WHERE clause", TENANT_COLUMN),
        ));
    }

    findings
}

/// Deepest chain of parenthesized SELECTs below the outer query.
pub fn subquery_depth(sql: &str) -> usize {
    let masked = mask_quoted(sql);
    let mut stack: Vec<bool> = Vec::new();
    let mut max_depth = 0;

    for (i, c) in masked.char_indices() {
        match c {
            '(' => {
                let opens_select = masked[i + 1..]
                    .trim_start()
                    .get(..6)
                    .is_some_and(|head| head.eq_ignore_ascii_case("select"));
                stack.push(opens_select);
                max_depth = max_depth.max(stack.iter().filter(|opens| **opens).count());
            }
            ')' => {
                stack.pop();
            }
            _ => {}
        }
    }

    max_depth
}

pub fn check_optimization(sql: &str) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    if subquery_depth(sql) > MAX_SUBQUERY_DEPTH {
        findings.push(finding(
            FindingKind::Optimization,
            "Too many nested subqueries, consider joins or CTEs",
        ));
    }
    if !LIMIT_KEYWORD.is_match(&mask_quoted(sql)) {
        findings.push(finding(
            FindingKind::Optimization,
            "Missing LIMIT clause, add one to bound the result size",
        ));
    }

    findings
}

/// Lowercased, whitespace-normalized form used to compare expressions.
fn normalize_expr(expr: &str) -> String {
    collapse_whitespace(expr)
        .to_lowercase()
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
        .replace(", ", ",")
}

/// First match of `re` in `masked` that sits outside parentheses.
fn top_level_find(re: &Regex, masked: &str, depths: &[usize], from: usize) -> Option<(usize, usize)> {
    re.find_iter(&masked[from..])
        .map(|m| (from + m.start(), from + m.end()))
        .find(|(start, _)| depths[*start] == 0)
}

struct SelectItem {
    expr: String,
    alias: Option<String>,
}

fn split_alias(item: &str) -> SelectItem {
    let masked = mask_quoted(item);
    let depths = depth_map(&masked);
    let last_as = TOP_LEVEL_AS
        .find_iter(&masked)
        .filter(|m| depths[m.start()] == 0)
        .last();

    match last_as {
        Some(m) => SelectItem {
            expr: item[..m.start()].trim().to_string(),
            alias: Some(item[m.end()..].trim().to_string()),
        },
        None => SelectItem {
            expr: item.trim().to_string(),
            alias: None,
        },
    }
}

/// Non-aggregated SELECT expressions must be grouped, and so must every
/// column fed to EXTRACT().
pub fn check_group_by(sql: &str) -> Vec<ValidationFinding> {
    let masked = mask_quoted(sql);
    let depths = depth_map(&masked);

    let Some((_, group_end)) = top_level_find(&GROUP_BY, &masked, &depths, 0) else {
        return Vec::new();
    };
    let Some((_, select_end)) = top_level_find(&SELECT_KEYWORD, &masked, &depths, 0) else {
        return Vec::new();
    };
    let Some((from_start, _)) = top_level_find(&FROM_KEYWORD, &masked, &depths, select_end) else {
        return Vec::new();
    };
    let group_stop = top_level_find(&AFTER_GROUP_BY, &masked, &depths, group_end)
        .map(|(start, _)| start)
        .unwrap_or(sql.len());

    let select_list = &sql[select_end..from_start];
    let group_list = &sql[group_end..group_stop];

    let grouped: HashSet<String> = split_top_level(group_list)
        .iter()
        .map(|item| normalize_expr(item))
        .collect();
    let grouped_text = normalize_expr(group_list);

    let mut findings = Vec::new();

    for (index, raw) in split_top_level(select_list).iter().enumerate() {
        let item = split_alias(raw);
        let expr_masked = mask_quoted(&item.expr);
        let normalized = normalize_expr(&item.expr);

        for caps in EXTRACT_COLUMN.captures_iter(&expr_masked) {
            let column = caps[1].to_lowercase();
            let bounded = Regex::new(&format!(r"(?:^|[^\w.]){}(?:$|[^\w.])", regex::escape(&column)));
            if !bounded.is_ok_and(|re| re.is_match(&grouped_text)) {
                findings.push(finding(
                    FindingKind::Semantic,
                    format!("Column {} used in EXTRACT() must appear in GROUP BY", &caps[1]),
                ));
            }
        }

        if AGGREGATE_CALL.is_match(&expr_masked) || CONSTANT.is_match(item.expr.trim()) {
            continue;
        }

        let ordinal = (index + 1).to_string();
        let alias_grouped = item
            .alias
            .as_deref()
            .is_some_and(|alias| grouped.contains(&normalize_expr(alias)));
        if grouped.contains(&normalized) || grouped.contains(&ordinal) || alias_grouped {
            continue;
        }

        let columns: Vec<String> = QUALIFIED_COLUMN
            .find_iter(&expr_masked)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if !columns.is_empty() && columns.iter().all(|column| grouped.contains(column)) {
            continue;
        }

        findings.push(finding(
            FindingKind::Semantic,
            format!(
                "Column {} in SELECT must appear in GROUP BY or be used in an aggregate function",
                item.expr
            ),
        ));
    }

    findings
}

/// All four checkers in order: syntax, relation, optimization, GROUP BY.
pub fn run_checks(sql: &str) -> Vec<ValidationFinding> {
    let mut findings = check_syntax(sql);
    findings.extend(check_relations(sql));
    findings.extend(check_optimization(sql));
    findings.extend(check_group_by(sql));
    findings
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub sql: String,
    pub findings: Vec<ValidationFinding>,
    pub corrected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_error: Option<String>,
}

/// Runs the checkers and, when anything is found, asks the backend once for
/// a rewrite. The rewrite is not re-checked.
pub struct SqlValidator {
    llm: Arc<LlmManager>,
}

impl SqlValidator {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    pub async fn validate_and_correct(&self, sql: &str, tenant_id: &str) -> ValidationOutcome {
        let findings = run_checks(sql);
        if findings.is_empty() {
            return ValidationOutcome {
                sql: sql.to_string(),
                findings,
                corrected: false,
                correction_error: None,
            };
        }

        info!(tenant_id, findings = findings.len(), "requesting SQL correction");

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::sql_correction_system()),
            ChatMessage::user(prompts::sql_correction_user(sql, &findings)),
        ])
        .temperature(0.1)
        .max_tokens(1000);

        let (sql, corrected, correction_error) = match self.llm.complete(request).await {
            Ok(completion) => match extract_sql(&completion.content) {
                Some(rewritten) => (rewritten, true, None),
                None => {
                    warn!("correction response held no SELECT statement, keeping original SQL");
                    (sql.to_string(), false, Some("No SQL found in correction response".to_string()))
                }
            },
            Err(e) => {
                warn!(error = %e, "SQL correction failed, keeping original SQL");
                (sql.to_string(), false, Some(e.to_string()))
            }
        };

        ValidationOutcome {
            sql,
            findings,
            corrected,
            correction_error,
        }
    }
}
