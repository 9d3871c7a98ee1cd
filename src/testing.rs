//! Fakes and fixtures shared by the unit tests.

use crate::config::DatabaseConfig;
use crate::db::db_utils::SqlParam;
use crate::db::executor::{ExecutionError, QueryRunner, RowSet};
use crate::db::{DbPool, bootstrap, build_pool};
use crate::domain::DateRange;
use crate::llm::models::{Completion, CompletionRequest, TokenUsage};
use crate::llm::{ChatBackend, LlmError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const P1: &str = "11111111-1111-1111-1111-111111111111";
pub const P2: &str = "22222222-2222-2222-2222-222222222222";

/// Replies with queued answers in order and records every request.
/// Once the queue is drained it answers with a response error.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            Some(content) => Ok(Completion {
                content,
                model: "scripted".to_string(),
                usage: TokenUsage::default(),
            }),
            None => Err(LlmError::Response("no scripted reply left".to_string())),
        }
    }
}

pub struct FailingBackend;

#[async_trait]
impl ChatBackend for FailingBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
        Err(LlmError::Connection("backend unreachable".to_string()))
    }
}

/// Never reaches a database; counts calls and remembers the last statement.
#[derive(Default)]
pub struct CountingRunner {
    calls: AtomicUsize,
    last_sql: Mutex<Option<String>>,
}

impl CountingRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_sql(&self) -> Option<String> {
        self.last_sql.lock().expect("sql lock").clone()
    }
}

#[async_trait]
impl QueryRunner for CountingRunner {
    async fn run(&self, sql: String, _params: Vec<SqlParam>) -> Result<RowSet, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sql.lock().expect("sql lock") = Some(sql);
        Ok(RowSet::default())
    }
}

pub struct SlowRunner {
    delay: Duration,
}

impl SlowRunner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl QueryRunner for SlowRunner {
    async fn run(&self, _sql: String, _params: Vec<SqlParam>) -> Result<RowSet, ExecutionError> {
        tokio::time::sleep(self.delay).await;
        Ok(RowSet::default())
    }
}

/// Fails every statement whose text contains `needle`.
pub struct FailingRunner<R> {
    pub needle: &'static str,
    pub inner: R,
}

#[async_trait]
impl<R: QueryRunner> QueryRunner for FailingRunner<R> {
    async fn run(&self, sql: String, params: Vec<SqlParam>) -> Result<RowSet, ExecutionError> {
        if sql.contains(self.needle) {
            return Err(ExecutionError::Query(format!("Catalog Error: simulated failure on {}", self.needle)));
        }
        self.inner.run(sql, params).await
    }
}

const SEED: &str = r#"
INSERT INTO data_pharmacy (id, name, id_nat, area, ca, employees_count, address) VALUES
  ('11111111-1111-1111-1111-111111111111', 'Pharmacie du Centre', '750000001', 'Paris', 1250000.00, 8, '1 rue de Rivoli'),
  ('22222222-2222-2222-2222-222222222222', 'Pharmacie de la Gare', '690000002', 'Lyon', 830000.00, 5, '2 place Carnot');

INSERT INTO data_globalproduct (code_13_ref, name, category, sub_category, brand_lab, lab_distributor, universe) VALUES
  ('3400930000001', 'Doliprane 1000mg', 'Antalgiques', 'Paracétamol', 'Sanofi', 'Sanofi', 'Médicament'),
  ('3400930000002', 'Avène Solaire SPF50', 'Solaire', 'Protection', 'Avène', 'Pierre Fabre', 'Parapharmacie'),
  ('3400930000003', 'Fervex Adulte', 'Grippe', 'Etat grippal', 'Upsa', 'Upsa', 'Médicament');

INSERT INTO data_internalproduct (id, name, internal_id, pharmacy_id, code_13_ref_id, TVA) VALUES
  ('a1', 'Doliprane 1000mg', 1, '11111111-1111-1111-1111-111111111111', '3400930000001', 2.10),
  ('a2', 'Avène Solaire SPF50', 2, '11111111-1111-1111-1111-111111111111', '3400930000002', 20.00),
  ('a3', 'Fervex Adulte', 3, '11111111-1111-1111-1111-111111111111', '3400930000003', 2.10),
  ('b1', 'Doliprane 1000mg', 4, '22222222-2222-2222-2222-222222222222', '3400930000001', 2.10);

INSERT INTO data_inventorysnapshot (id, date, stock, price_with_tax, weighted_average_price, product_id) VALUES
  (1, CAST(current_date - INTERVAL 3 DAY AS DATE), 50, 3.50, 2.00, 'a1'),
  (2, CAST(current_date - INTERVAL 3 DAY AS DATE), 4, 15.90, 9.00, 'a2'),
  (3, CAST(current_date - INTERVAL 3 DAY AS DATE), 0, 6.20, 4.10, 'a3'),
  (4, CAST(current_date - INTERVAL 3 DAY AS DATE), 10, 3.50, 2.00, 'b1');

INSERT INTO data_sales (id, date, quantity, product_id) VALUES
  (1, CAST(current_date - INTERVAL 3 DAY AS DATE), 12, 1),
  (2, CAST(current_date - INTERVAL 2 DAY AS DATE), 3, 2),
  (3, CAST(current_date - INTERVAL 3 DAY AS DATE), 7, 4);
"#;

/// In-memory store with the catalog tables and a small two-pharmacy
/// dataset dated a few days back.
pub fn seeded_pool() -> DbPool {
    let config = DatabaseConfig {
        connection_string: ":memory:".to_string(),
        pool_size: 2,
        bootstrap_schema: true,
    };
    let pool = build_pool(&config).expect("in-memory pool");
    bootstrap(&pool).expect("schema");
    pool.get().expect("connection").execute_batch(SEED).expect("seed data");
    pool
}

/// Covers every seeded sale.
pub fn recent_range() -> DateRange {
    DateRange::trailing_days(30, chrono::Local::now().date_naive() + chrono::Duration::days(1))
}
