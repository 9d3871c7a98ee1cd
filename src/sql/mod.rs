pub mod extract;
pub mod generator;
pub mod lexer;
pub mod params;
pub mod safety;
pub mod templates;
pub mod validator;

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Template,
    Generated,
    Corrected,
    Fallback,
}

/// A SQL statement proposed for a question, before execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlCandidate {
    pub sql: String,
    pub explanation: String,
    pub confidence: f64,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SqlCandidate {
    pub fn new(sql: impl Into<String>, explanation: impl Into<String>, confidence: f64, source: SourceKind) -> Self {
        Self {
            sql: sql.into(),
            explanation: explanation.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Syntax,
    Relation,
    Optimization,
    Semantic,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingKind::Syntax => "syntax",
            FindingKind::Relation => "relation",
            FindingKind::Optimization => "optimization",
            FindingKind::Semantic => "semantic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFinding {
    pub kind: FindingKind,
    pub message: String,
}

impl ValidationFinding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
