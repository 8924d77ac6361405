//! Scripted in-memory provider: records every statement and replays queued
//! results.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use medql_core::fixtures::fixture_registry;
use medql_core::{EngineConfig, PostgresDialect, Row, SqlDialect};
use medql_query::BuiltStatement;
use medql_storage::{Connection, ConnectionProvider, DataContext, Result};

/// Logs generated SQL under `RUST_LOG=medql=debug`; repeated calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
struct Script {
    log: Vec<String>,
    rows: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    connections: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Result of the next row-returning statement.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.script.lock().unwrap().rows.push_back(rows);
    }

    /// Affected-row count of the next executed statement (default 1).
    pub fn push_affected(&self, count: u64) {
        self.script.lock().unwrap().affected.push_back(count);
    }

    /// `conn<N>: <sql>` for every statement, in execution order.
    pub fn log(&self) -> Vec<String> {
        self.script.lock().unwrap().log.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> DataContext {
        DataContext::new(
            Arc::new(self.clone()),
            Arc::new(fixture_registry()),
            EngineConfig::default(),
        )
    }
}

struct ScriptedConnection {
    id: usize,
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    fn record(&self, sql: String) {
        self.script
            .lock()
            .unwrap()
            .log
            .push(format!("conn{}: {sql}", self.id));
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn query(&mut self, statement: &BuiltStatement) -> Result<Vec<Row>> {
        self.record(statement.to_positional(&PostgresDialect));
        Ok(self.script.lock().unwrap().rows.pop_front().unwrap_or_default())
    }

    async fn execute(&mut self, statement: &BuiltStatement) -> Result<u64> {
        self.record(statement.to_positional(&PostgresDialect));
        Ok(self.script.lock().unwrap().affected.pop_front().unwrap_or(1))
    }

    async fn begin(&mut self) -> Result<()> {
        self.record("BEGIN".into());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record("COMMIT".into());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK".into());
        Ok(())
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let id = self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            id,
            script: Arc::clone(&self.script),
        }))
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::new(PostgresDialect)
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
