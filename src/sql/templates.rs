use crate::sql::{SourceKind, SqlCandidate};

pub const TEMPLATE_CONFIDENCE: f64 = 0.9;

/// A vetted statement using `$1` (tenant), `$2` and `$3` (date range).
#[derive(Debug)]
pub struct SqlTemplate {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub sql: &'static str,
    pub explanation: &'static str,
}

/// Routes a question to a template before the keyword scan runs.
pub struct PriorityRule {
    pub template: &'static str,
    pub applies: fn(&str) -> bool,
}

pub static TEMPLATES: &[SqlTemplate] = &[
    SqlTemplate {
        name: "topSellingProducts",
        keywords: &["vendu", "top produit", "meilleur vente", "plus vend"],
        sql: r#"SELECT
  ip.name AS "Nom du produit",
  SUM(s.quantity) AS "Quantité vendue",
  gp.category AS "Catégorie",
  gp.brand_lab AS "Laboratoire"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
LEFT JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
WHERE ip.pharmacy_id = $1
  AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
GROUP BY ip.name, gp.category, gp.brand_lab
ORDER BY "Quantité vendue" DESC
LIMIT 10"#,
        explanation: "Cette requête identifie les produits les plus vendus sur la période spécifiée, en affichant la quantité totale vendue pour chaque produit, avec sa catégorie et son laboratoire.",
    },
    SqlTemplate {
        name: "stockRupture",
        keywords: &["rupture", "stock zéro", "stock épuisé", "manque stock"],
        sql: r#"SELECT
  ip.name AS "Nom du produit",
  gp.category AS "Catégorie",
  gp.brand_lab AS "Laboratoire",
  inv.date AS "Date du stock"
FROM data_internalproduct ip
JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
JOIN data_inventorysnapshot inv ON ip.id = inv.product_id
WHERE ip.pharmacy_id = $1
  AND inv.stock = 0
  AND inv.date = (SELECT MAX(date) FROM data_inventorysnapshot WHERE product_id = ip.id)
ORDER BY gp.category, ip.name
LIMIT 100"#,
        explanation: "Cette requête identifie tous les produits en rupture de stock (stock = 0) selon le dernier inventaire disponible, classés par catégorie.",
    },
    SqlTemplate {
        name: "marginByCategory",
        keywords: &["marge", "rentabilité", "catégorie", "taux de marge"],
        sql: r#"SELECT
  gp.category AS "Catégorie",
  SUM(s.quantity * inv.price_with_tax) AS "Chiffre d'affaires",
  SUM(s.quantity * inv.weighted_average_price) AS "Coût d'achat",
  SUM(s.quantity * (inv.price_with_tax - inv.weighted_average_price)) AS "Marge brute",
  ROUND(
    SUM(s.quantity * (inv.price_with_tax - inv.weighted_average_price)) /
    NULLIF(SUM(s.quantity * inv.price_with_tax), 0) * 100,
    2
  ) AS "Taux de marge (%)"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
WHERE ip.pharmacy_id = $1
  AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
  AND inv.price_with_tax > 0
GROUP BY gp.category
ORDER BY "Marge brute" DESC
LIMIT 100"#,
        explanation: "Cette requête calcule la marge par catégorie de produits, en affichant le chiffre d'affaires, le coût d'achat, la marge brute et le taux de marge pour chaque catégorie.",
    },
    SqlTemplate {
        name: "lowRotationProducts",
        keywords: &["rotation", "faible vente", "invendu", "stock dormant"],
        sql: r#"SELECT
  ip.name AS "Nom du produit",
  gp.category AS "Catégorie",
  inv.stock AS "Stock actuel",
  inv.price_with_tax AS "Prix TTC",
  COALESCE(SUM(s.quantity), 0) AS "Ventes période",
  inv.stock * inv.weighted_average_price AS "Valeur stock"
FROM data_internalproduct ip
JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
JOIN data_inventorysnapshot inv ON ip.id = inv.product_id
LEFT JOIN data_sales s ON s.product_id = inv.id AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
WHERE ip.pharmacy_id = $1
  AND inv.date = (SELECT MAX(date) FROM data_inventorysnapshot WHERE product_id = ip.id)
  AND inv.stock > 0
GROUP BY ip.name, gp.category, inv.stock, inv.price_with_tax, inv.weighted_average_price
HAVING COALESCE(SUM(s.quantity), 0) < 3
ORDER BY "Ventes période" ASC, "Valeur stock" DESC
LIMIT 100"#,
        explanation: "Cette requête identifie les produits à faible rotation (moins de 3 ventes sur la période) qui sont encore en stock, triés par nombre de ventes (ascendant) et valeur de stock (descendant).",
    },
    SqlTemplate {
        name: "salesByDay",
        keywords: &["vente jour", "quotidien", "journalier", "ca par jour"],
        sql: r#"SELECT
  s.date AS "Date",
  SUM(s.quantity * inv.price_with_tax) AS "Chiffre d'affaires",
  COUNT(DISTINCT s.id) AS "Nombre de ventes"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
WHERE ip.pharmacy_id = $1
  AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
GROUP BY s.date
ORDER BY s.date
LIMIT 100"#,
        explanation: "Cette requête affiche le chiffre d'affaires quotidien et le nombre de ventes sur la période spécifiée.",
    },
    SqlTemplate {
        name: "solarProductsComparison",
        keywords: &["solaire", "compar", "année dernière", "compare"],
        sql: r#"SELECT
  EXTRACT(YEAR FROM s.date) AS "Année",
  EXTRACT(MONTH FROM s.date) AS "Mois",
  SUM(s.quantity) AS "Quantité vendue",
  SUM(s.quantity * inv.price_with_tax) AS "Chiffre d'affaires"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
WHERE ip.pharmacy_id = $1
  AND gp.category = 'Solaire'
  AND (
    (s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE))
    OR (s.date BETWEEN CAST($2 AS DATE) - INTERVAL '1 year' AND CAST($3 AS DATE) - INTERVAL '1 year')
  )
GROUP BY EXTRACT(YEAR FROM s.date), EXTRACT(MONTH FROM s.date)
ORDER BY EXTRACT(YEAR FROM s.date), EXTRACT(MONTH FROM s.date)
LIMIT 100"#,
        explanation: "Cette requête compare les ventes de produits solaires entre l'année en cours et l'année précédente, en affichant les quantités vendues et le chiffre d'affaires par mois.",
    },
    SqlTemplate {
        name: "monthlySales",
        // "ca " keeps its trailing space; a bare "ca" also hits "médicament", "camomille"...
        keywords: &["chiffre d'affaires", "ca ", "mensuel", "mois", "ventes"],
        sql: r#"SELECT
  DATE_TRUNC('month', s.date) AS "Mois",
  SUM(s.quantity * inv.price_with_tax) AS "Chiffre d'affaires"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
WHERE ip.pharmacy_id = $1
  AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
GROUP BY DATE_TRUNC('month', s.date)
ORDER BY "Mois"
LIMIT 100"#,
        explanation: "Cette requête calcule le chiffre d'affaires mensuel pour la période spécifiée.",
    },
    SqlTemplate {
        name: "gripMedicineComparison",
        keywords: &["grippe", "médicament", "compar", "année dernière", "rhume", "toux"],
        sql: r#"SELECT
  EXTRACT(YEAR FROM s.date) AS "Année",
  EXTRACT(MONTH FROM s.date) AS "Mois",
  SUM(s.quantity) AS "Quantité vendue",
  SUM(s.quantity * inv.price_with_tax) AS "Chiffre d'affaires"
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
WHERE ip.pharmacy_id = $1
  AND gp.category = 'Médicaments'
  AND (
    gp.name ILIKE '%grippe%'
    OR gp.name ILIKE '%rhume%'
    OR gp.name ILIKE '%fièvre%'
    OR gp.name ILIKE '%toux%'
  )
  AND (
    (s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE))
    OR (s.date BETWEEN CAST($2 AS DATE) - INTERVAL '1 year' AND CAST($3 AS DATE) - INTERVAL '1 year')
  )
GROUP BY EXTRACT(YEAR FROM s.date), EXTRACT(MONTH FROM s.date)
ORDER BY EXTRACT(YEAR FROM s.date), EXTRACT(MONTH FROM s.date)
LIMIT 100"#,
        explanation: "Cette requête compare les ventes de médicaments contre la grippe entre l'année en cours et l'année précédente, en affichant les quantités vendues et le chiffre d'affaires par mois.",
    },
];

fn flu_medicine(q: &str) -> bool {
    q.contains("grippe") || (q.contains("médicament") && (q.contains("rhume") || q.contains("toux")))
}

/// Revenue ("chiffre d'affaires" or the abbreviation "ca ") asked per month.
fn monthly_revenue(q: &str) -> bool {
    (q.contains("chiffre d'affaires") || q.contains("ca ")) && (q.contains("mois") || q.contains("mensuel"))
}

fn sun_care_comparison(q: &str) -> bool {
    q.contains("solaire") && (q.contains("année dernière") || q.contains("compar"))
}

pub static PRIORITY_RULES: &[PriorityRule] = &[
    PriorityRule { template: "gripMedicineComparison", applies: flu_medicine },
    PriorityRule { template: "monthlySales", applies: monthly_revenue },
    PriorityRule { template: "solarProductsComparison", applies: sun_care_comparison },
];

/// Lowercases and folds typographic apostrophes so keyword tests see `'`.
fn normalize(question: &str) -> String {
    question.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// Priority rules first, then a keyword scan in declaration order.
pub struct TemplateMatcher {
    templates: &'static [SqlTemplate],
    rules: &'static [PriorityRule],
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self {
            templates: TEMPLATES,
            rules: PRIORITY_RULES,
        }
    }
}

impl TemplateMatcher {
    pub fn new(templates: &'static [SqlTemplate], rules: &'static [PriorityRule]) -> Self {
        Self { templates, rules }
    }

    pub fn find(&self, question: &str) -> Option<&'static SqlTemplate> {
        let normalized = normalize(question);

        let prioritized = self
            .rules
            .iter()
            .filter(|rule| (rule.applies)(&normalized))
            .find_map(|rule| self.by_name(rule.template));

        prioritized.or_else(|| {
            self.templates
                .iter()
                .find(|template| template.keywords.iter().any(|keyword| normalized.contains(keyword)))
        })
    }

    pub fn by_name(&self, name: &str) -> Option<&'static SqlTemplate> {
        self.templates.iter().find(|template| template.name == name)
    }

    /// The matching template as a candidate, or `None` to fall through to generation.
    pub fn match_question(&self, question: &str) -> Option<SqlCandidate> {
        self.find(question).map(|template| {
            SqlCandidate::new(
                template.sql,
                template.explanation,
                TEMPLATE_CONFIDENCE,
                SourceKind::Template,
            )
        })
    }
}
