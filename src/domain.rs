use crate::llm::models::ChatMessage;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive date window bound to `$2`/`$3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(alias = "startDate")]
    pub start: NaiveDate,
    #[serde(alias = "endDate")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` days ending on `today`.
    pub fn trailing_days(days: i64, today: NaiveDate) -> Self {
        Self {
            start: today - Duration::days(days),
            end: today,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

/// One natural-language question for a pharmacy.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub question: String,
    pub tenant_id: String,
    pub date_range: Option<DateRange>,
    pub history: Vec<ChatMessage>,
}

impl AnalysisRequest {
    pub fn new(question: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Sales,
    Stock,
    Margin,
    General,
}

impl QuestionCategory {
    /// Sales wins over stock, stock over margin.
    pub fn detect(question: &str) -> Self {
        let lower = question.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|word| lower.contains(word));

        if has(&["vente", "vendu", "chiffre", "ca ", "revenu"]) {
            QuestionCategory::Sales
        } else if has(&["stock", "inventaire", "rupture", "invendu"]) {
            QuestionCategory::Stock
        } else if has(&["marge", "rentab", "profit", "bénéfice"]) {
            QuestionCategory::Margin
        } else {
            QuestionCategory::General
        }
    }

    /// Label used in French prompts.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::Sales => "ventes",
            QuestionCategory::Stock => "stocks",
            QuestionCategory::Margin => "marges",
            QuestionCategory::General => "générale",
        }
    }
}

const PHARMACY_KEYWORDS: &[&str] = &[
    "pharmacie",
    "médicament",
    "produit",
    "vente",
    "stock",
    "marge",
    "laboratoire",
    "client",
    "patient",
    "ordonnance",
    "parapharmacie",
    "commande",
    "fournisseur",
];

pub fn is_pharmacy_related(question: &str) -> bool {
    let lower = question.to_lowercase();
    PHARMACY_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}
