//! Fixed read-only listings behind the `/api/*` data endpoints. They go
//! through [`SqlExecutor`] like any other statement, so the safety gate,
//! row cap and timeout apply to them too.

use crate::db::db_utils::SqlParam;
use crate::db::executor::{ExecutionError, ExecutionOptions, ExecutionResult, SqlExecutor};
use crate::domain::DateRange;

pub const DEFAULT_PRODUCT_LIMIT: usize = 100;
pub const DEFAULT_SALES_LIMIT: usize = 100;
pub const DEFAULT_LOW_STOCK_LIMIT: usize = 50;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;
pub const PHARMACY_LIST_LIMIT: usize = 10;

/// Latest inventory snapshot per product of the tenant, with catalog data.
pub const CURRENT_INVENTORY_SQL: &str = r#"SELECT
  ip.id,
  ip.name,
  ip.internal_id,
  gp.category,
  gp.brand_lab,
  gp.lab_distributor,
  gp.universe,
  gp.sub_category,
  inv.stock,
  inv.price_with_tax,
  inv.weighted_average_price,
  inv.date AS inventory_date
FROM data_internalproduct ip
LEFT JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
LEFT JOIN data_inventorysnapshot inv ON ip.id = inv.product_id
WHERE ip.pharmacy_id = $1
  AND (inv.date IS NULL OR inv.date = (SELECT MAX(date) FROM data_inventorysnapshot WHERE product_id = ip.id))
ORDER BY ip.name"#;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: DEFAULT_PRODUCT_LIMIT, offset: 0 }
    }
}

pub async fn pharmacy_info(
    executor: &SqlExecutor,
    pharmacy_id: &str,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let sql = "SELECT id, name, id_nat, ca, area, employees_count, address \
               FROM data_pharmacy WHERE id = $1 LIMIT 1";
    executor.execute(sql, vec![SqlParam::from(pharmacy_id)], options).await
}

pub async fn list_pharmacies(
    executor: &SqlExecutor,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let sql = format!(
        "SELECT id, name, id_nat, area FROM data_pharmacy ORDER BY name LIMIT {}",
        PHARMACY_LIST_LIMIT
    );
    executor.execute(&sql, Vec::new(), options).await
}

pub async fn list_products(
    executor: &SqlExecutor,
    pharmacy_id: &str,
    page: Page,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let sql = format!("{} LIMIT {} OFFSET {}", CURRENT_INVENTORY_SQL, page.limit, page.offset);
    executor.execute(&sql, vec![SqlParam::from(pharmacy_id)], options).await
}

pub async fn list_sales(
    executor: &SqlExecutor,
    pharmacy_id: &str,
    range: &DateRange,
    limit: usize,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let sql = format!(
        r#"SELECT
  s.id,
  s.date,
  s.quantity,
  inv.price_with_tax,
  s.quantity * inv.price_with_tax AS total_price,
  ip.name AS product_name,
  gp.category,
  gp.brand_lab
FROM data_sales s
JOIN data_inventorysnapshot inv ON s.product_id = inv.id
JOIN data_internalproduct ip ON inv.product_id = ip.id
LEFT JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
WHERE ip.pharmacy_id = $1
  AND s.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
ORDER BY s.date DESC
LIMIT {}"#,
        limit
    );
    let params = vec![
        SqlParam::from(pharmacy_id),
        SqlParam::Date(range.start),
        SqlParam::Date(range.end),
    ];
    executor.execute(&sql, params, options).await
}

/// Products whose latest stock is positive and at most `threshold`.
pub async fn low_stock(
    executor: &SqlExecutor,
    pharmacy_id: &str,
    threshold: i64,
    limit: usize,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let sql = format!(
        r#"SELECT
  ip.id,
  ip.name,
  gp.category,
  gp.brand_lab,
  inv.stock,
  inv.price_with_tax,
  inv.date AS inventory_date
FROM data_internalproduct ip
LEFT JOIN data_globalproduct gp ON ip.code_13_ref_id = gp.code_13_ref
JOIN data_inventorysnapshot inv ON ip.id = inv.product_id
WHERE ip.pharmacy_id = $1
  AND inv.date = (SELECT MAX(date) FROM data_inventorysnapshot WHERE product_id = ip.id)
  AND inv.stock <= $2
  AND inv.stock > 0
ORDER BY inv.stock ASC
LIMIT {}"#,
        limit
    );
    let params = vec![SqlParam::from(pharmacy_id), SqlParam::Int(threshold)];
    executor.execute(&sql, params, options).await
}
