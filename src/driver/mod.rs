//! Driver adapter: dialect SQL forms plus the connection plug points.
//!
//! The concrete pool library is the embedder's choice. The engine only needs
//! `Connection` objects; `PoolProvider` turns a `DbConfig` datasource entry
//! into a pool, and `DriverRegistry` materializes those pools lazily.

use crate::config::{ConfigRegistry, DataSourceSpec, Dialect};
use crate::error::EngineError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Outcome of an INSERT/UPDATE/DELETE execution.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub generated_key: Option<i64>,
}

impl Dialect {
    /// Positional placeholder for the given zero-based parameter index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
            Dialect::Mssql => format!("@p{}", index),
        }
    }

    /// Pagination clause with literal offsets.
    pub fn page_clause(&self, offset: u64, size: u64) -> String {
        match self {
            Dialect::Mysql | Dialect::Sqlite => format!("LIMIT {} OFFSET {}", size, offset),
            Dialect::Mssql => format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, size),
        }
    }

    /// Conventional server port, None for file-backed dialects.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::Mysql => Some(3306),
            Dialect::Mssql => Some(1433),
            Dialect::Sqlite => None,
        }
    }
}

/// A live database connection. Implementations are not expected to be
/// thread-safe; a connection stays on the thread that acquired it.
pub trait Connection: Send {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, EngineError>;
    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecOutcome, EngineError>;
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), EngineError>;
    fn commit(&mut self) -> Result<(), EngineError>;
    fn rollback(&mut self) -> Result<(), EngineError>;
    fn close(&mut self) -> Result<(), EngineError>;
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Connection")
    }
}

pub trait ConnectionPool: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn Connection>, EngineError>;
}

/// Builds one pool per datasource entry. Supplied by the embedder.
pub trait PoolProvider: Send + Sync {
    fn build(
        &self,
        dialect: Dialect,
        name: &str,
        spec: DataSourceSpec<'_>,
    ) -> Result<Arc<dyn ConnectionPool>, EngineError>;
}

type PoolMap = HashMap<String, Arc<dyn ConnectionPool>>;

pub struct DriverRegistry {
    registry: Arc<ConfigRegistry>,
    provider: Box<dyn PoolProvider>,
    pools: RwLock<HashMap<Dialect, Arc<PoolMap>>>,
}

impl DriverRegistry {
    pub fn new(registry: Arc<ConfigRegistry>, provider: Box<dyn PoolProvider>) -> Self {
        DriverRegistry {
            registry,
            provider,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire a connection for `(dialect, host)`. Pools for a dialect are
    /// built on first use; an unknown host is a configuration mistake and
    /// does not retry.
    pub fn connection(&self, dialect: Dialect, host: &str) -> Result<Box<dyn Connection>, EngineError> {
        let pools = self.dialect_pools(dialect)?;
        let pool = pools.get(host).ok_or_else(|| {
            EngineError::Driver(format!("unknown {} datasource: {}", dialect, host))
        })?;
        pool.acquire()
    }

    /// Drop all materialized pools; the next acquisition rebuilds them from
    /// the current db config. Wired to db-config reload notifications.
    pub fn clear(&self) {
        self.pools.write().clear();
    }

    fn dialect_pools(&self, dialect: Dialect) -> Result<Arc<PoolMap>, EngineError> {
        if let Some(pools) = self.pools.read().get(&dialect) {
            return Ok(Arc::clone(pools));
        }
        let mut guard = self.pools.write();
        // Re-check: another thread may have built the map while we waited.
        if let Some(pools) = guard.get(&dialect) {
            return Ok(Arc::clone(pools));
        }
        let db = self.registry.get_db_config();
        let mut built: PoolMap = HashMap::new();
        let names: Vec<String> = match dialect {
            Dialect::Mysql => db.mysql.keys().cloned().collect(),
            Dialect::Mssql => db.mssql.keys().cloned().collect(),
            Dialect::Sqlite => db.sqlite.keys().cloned().collect(),
        };
        for name in names {
            let spec = db
                .spec(dialect, &name)
                .expect("name enumerated from the same map");
            let pool = self.provider.build(dialect, &name, spec)?;
            built.insert(name, pool);
        }
        tracing::debug!(target: "datagate::driver", dialect = %dialect, pools = built.len(), "dialect pools materialized");
        let built = Arc::new(built);
        guard.insert(dialect, Arc::clone(&built));
        Ok(built)
    }
}
