//! Per-job connection cache and multi-datasource transactional envelope.
//!
//! A job owns one `JobConnections` value for its whole run (no ambient
//! state). Every step targeting the same datasource key reuses the cached
//! connection; commits run in insertion order; close always happens.

use crate::driver::Connection;
use crate::error::EngineError;
use uuid::Uuid;

struct JobConnection {
    key: String,
    conn: Box<dyn Connection>,
    /// Transaction id when this connection was begun under the envelope.
    tx_id: Option<Uuid>,
    committed: bool,
}

#[derive(Default)]
pub struct JobConnections {
    entries: Vec<JobConnection>,
}

impl JobConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch the cached connection for `key`, or acquire one through
    /// `acquire`. Under a transactional job a freshly acquired connection
    /// has auto-commit disabled before any statement runs on it.
    pub fn get_or_open(
        &mut self,
        key: &str,
        transactional: bool,
        acquire: impl FnOnce() -> Result<Box<dyn Connection>, EngineError>,
    ) -> Result<&mut dyn Connection, EngineError> {
        if let Some(pos) = self.entries.iter().position(|e| e.key == key) {
            tracing::debug!(target: "datagate::job", key, "reusing cached connection");
            return Ok(self.entries[pos].conn.as_mut());
        }

        let mut conn = acquire()?;
        let tx_id = if transactional {
            conn.set_auto_commit(false)?;
            let id = Uuid::new_v4();
            tracing::info!(target: "datagate::job", key, tx_id = %id, "transaction begun");
            Some(id)
        } else {
            None
        };
        self.entries.push(JobConnection {
            key: key.to_string(),
            conn,
            tx_id,
            committed: false,
        });
        Ok(self
            .entries
            .last_mut()
            .expect("just pushed")
            .conn
            .as_mut())
    }

    /// Commit every begun transaction in insertion order. A failing commit
    /// triggers a compensating rollback of every connection (commits that
    /// already landed cannot be rewound) and surfaces as a transaction
    /// error naming the partial state.
    pub fn commit_all(&mut self) -> Result<(), EngineError> {
        let mut committed = 0usize;
        for pos in 0..self.entries.len() {
            let entry = &mut self.entries[pos];
            let Some(tx_id) = entry.tx_id else {
                continue;
            };
            match entry.conn.commit() {
                Ok(()) => {
                    entry.committed = true;
                    committed += 1;
                    tracing::info!(target: "datagate::job", key = %entry.key, tx_id = %tx_id, "transaction committed");
                }
                Err(e) => {
                    let failed_key = entry.key.clone();
                    self.rollback_all();
                    return Err(EngineError::Transaction(format!(
                        "partial commit: datasource '{}' failed after {} commit(s) landed ({}); compensating rollback attempted",
                        failed_key, committed, e
                    )));
                }
            }
        }
        Ok(())
    }

    /// Roll back every begun transaction. Per-connection failures are
    /// logged and never interrupt the sweep.
    pub fn rollback_all(&mut self) {
        for entry in &mut self.entries {
            let Some(tx_id) = entry.tx_id else {
                continue;
            };
            match entry.conn.rollback() {
                Ok(()) => {
                    tracing::info!(target: "datagate::job", key = %entry.key, tx_id = %tx_id, committed = entry.committed, "transaction rolled back");
                }
                Err(e) => {
                    tracing::warn!(target: "datagate::job", key = %entry.key, tx_id = %tx_id, error = %e, "rollback failed");
                }
            }
        }
    }

    /// Close every cached connection, restoring auto-commit where possible,
    /// and clear the cache. Runs on every job exit path.
    pub fn close_all(&mut self) {
        for entry in &mut self.entries {
            if entry.tx_id.is_some() {
                if let Err(e) = entry.conn.set_auto_commit(true) {
                    tracing::warn!(target: "datagate::job", key = %entry.key, error = %e, "auto-commit restore failed");
                }
            }
            if let Err(e) = entry.conn.close() {
                tracing::warn!(target: "datagate::job", key = %entry.key, error = %e, "connection close failed");
            } else {
                tracing::debug!(target: "datagate::job", key = %entry.key, "connection closed");
            }
        }
        self.entries.clear();
    }
}
