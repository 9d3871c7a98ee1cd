use serde::Serialize;
use std::sync::LazyLock;

/// Column that scopes every row to one pharmacy.
pub const TENANT_COLUMN: &str = "pharmacy_id";

/// Table whose rows must always be filtered by tenant.
pub const TENANT_SCOPED_TABLE: &str = "data_internalproduct";

#[derive(Debug, Clone, Serialize)]
pub enum DataType {
    Uuid,
    SmallInt,
    BigInt,
    Numeric(u8, u8),
    Varchar(u16),
    Text,
    Date,
    Timestamp,
}

impl DataType {
    /// Type as described to the language backend (PostgreSQL spelling).
    pub fn to_sql_type(&self) -> String {
        match self {
            DataType::Uuid => "UUID".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Numeric(p, s) => format!("NUMERIC({},{})", p, s),
            DataType::Varchar(len) => format!("VARCHAR({})", len),
            DataType::Text => "TEXT".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
        }
    }

    /// Type used when the tables are created in DuckDB. Identifiers are kept
    /// as text so tenant ids bind as plain strings.
    pub fn to_storage_type(&self) -> String {
        match self {
            DataType::Uuid | DataType::Varchar(_) | DataType::Text => "VARCHAR".to_string(),
            DataType::Numeric(p, s) => format!("DECIMAL({},{})", p, s),
            other => other.to_sql_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnSchema {
    fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", self.name, self.data_type.to_storage_type(), nullable_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self.columns.iter().map(|col| col.to_sql_definition()).collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            columns_sql.join(",\n    ")
        )
    }

    /// One-line description used in prompts: `name: description (col TYPE, ...)`.
    pub fn to_prompt_line(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("{} {}", col.name, col.data_type.to_sql_type()))
            .collect();
        format!("- {}: {} ({})", self.name, self.description, columns.join(", "))
    }
}

/// A foreign-key relationship `table.column -> related_table.related_column`.
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub table: &'static str,
    pub column: &'static str,
    pub related_table: &'static str,
    pub related_column: &'static str,
}

impl Relationship {
    pub fn describe(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.table, self.column, self.related_table, self.related_column
        )
    }
}

pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship { table: "data_internalproduct", column: "pharmacy_id", related_table: "data_pharmacy", related_column: "id" },
    Relationship { table: "data_internalproduct", column: "code_13_ref_id", related_table: "data_globalproduct", related_column: "code_13_ref" },
    Relationship { table: "data_inventorysnapshot", column: "product_id", related_table: "data_internalproduct", related_column: "id" },
    Relationship { table: "data_sales", column: "product_id", related_table: "data_inventorysnapshot", related_column: "id" },
    Relationship { table: "data_order", column: "pharmacy_id", related_table: "data_pharmacy", related_column: "id" },
    Relationship { table: "data_productorder", column: "order_id", related_table: "data_order", related_column: "id" },
    Relationship { table: "data_productorder", column: "product_id", related_table: "data_internalproduct", related_column: "id" },
];

pub static TABLES: LazyLock<Vec<TableSchema>> = LazyLock::new(|| {
    use DataType::*;
    let table = |name: &str, description: &str, columns: Vec<ColumnSchema>| TableSchema {
        name: name.to_string(),
        description: description.to_string(),
        columns,
    };
    let col = ColumnSchema::new;

    vec![
        table(
            "data_pharmacy",
            "Informations sur les pharmacies",
            vec![
                col("id", Uuid, false),
                col("name", Varchar(255), false),
                col("id_nat", Varchar(255), true),
                col("area", Varchar(255), true),
                col("ca", Numeric(15, 2), true),
                col("employees_count", SmallInt, true),
                col("address", Text, true),
            ],
        ),
        table(
            "data_internalproduct",
            "Produits de la pharmacie",
            vec![
                col("id", Uuid, false),
                col("name", Varchar(255), false),
                col("internal_id", BigInt, true),
                col("pharmacy_id", Uuid, false),
                col("code_13_ref_id", Varchar(13), true),
                col("TVA", Numeric(4, 2), true),
            ],
        ),
        table(
            "data_globalproduct",
            "Catalogue global des produits",
            vec![
                col("code_13_ref", Varchar(13), false),
                col("name", Text, true),
                col("category", Varchar(255), true),
                col("sub_category", Varchar(255), true),
                col("brand_lab", Varchar(255), true),
                col("lab_distributor", Varchar(255), true),
                col("universe", Varchar(255), true),
            ],
        ),
        table(
            "data_inventorysnapshot",
            "Instantanés des stocks",
            vec![
                col("id", BigInt, false),
                col("date", Date, false),
                col("stock", SmallInt, false),
                col("price_with_tax", Numeric(10, 2), true),
                col("weighted_average_price", Numeric(10, 2), true),
                col("product_id", Uuid, false),
            ],
        ),
        table(
            "data_sales",
            "Ventes",
            vec![
                col("id", BigInt, false),
                col("date", Date, false),
                col("quantity", SmallInt, false),
                col("product_id", BigInt, false),
            ],
        ),
        table(
            "data_order",
            "Commandes",
            vec![
                col("id", Uuid, false),
                col("step", SmallInt, true),
                col("sent_date", Timestamp, true),
                col("delivery_date", Date, true),
                col("pharmacy_id", Uuid, false),
                col("supplier_id", Uuid, true),
            ],
        ),
        table(
            "data_productorder",
            "Lignes de commande",
            vec![
                col("id", Uuid, false),
                col("qte", SmallInt, true),
                col("order_id", Uuid, false),
                col("product_id", Uuid, false),
            ],
        ),
    ]
});

/// Schema block shared by the generation and correction prompts.
pub fn describe_schema() -> String {
    let tables: Vec<String> = TABLES.iter().map(TableSchema::to_prompt_line).collect();
    let relations: Vec<String> = RELATIONSHIPS
        .iter()
        .map(|relation| format!("- {}", relation.describe()))
        .collect();

    format!(
        "SCHÉMA DE LA BASE DE DONNÉES:\n{}\n\nRELATIONS IMPORTANTES:\n{}",
        tables.join("\n"),
        relations.join("\n")
    )
}

/// DDL creating every catalog table, used by `database.bootstrap_schema`.
pub fn bootstrap_ddl() -> String {
    TABLES
        .iter()
        .map(TableSchema::to_create_table_sql)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationships_reference_catalog_columns() {
        for relation in RELATIONSHIPS {
            for (table, column) in [
                (relation.table, relation.column),
                (relation.related_table, relation.related_column),
            ] {
                let schema = TABLES
                    .iter()
                    .find(|t| t.name == table)
                    .unwrap_or_else(|| panic!("unknown table {table}"));
                assert!(
                    schema.columns.iter().any(|c| c.name == column),
                    "{table}.{column} is not in the catalog"
                );
            }
        }
    }

    #[test]
    fn prompt_description_lists_tables_and_relations() {
        let description = describe_schema();
        assert!(description.contains("- data_sales: Ventes (id BIGINT, date DATE, quantity SMALLINT, product_id BIGINT)"));
        assert!(description.contains("- data_sales.product_id -> data_inventorysnapshot.id"));
    }

    #[test]
    fn storage_ddl_uses_duckdb_types() {
        let ddl = bootstrap_ddl();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS data_internalproduct"));
        assert!(ddl.contains("pharmacy_id VARCHAR NOT NULL"));
        assert!(ddl.contains("price_with_tax DECIMAL(10,2)"));
    }
}
