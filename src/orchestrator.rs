//! Single-endpoint pipeline: lookup, auth, resolve, build, execute, marshal,
//! and telemetry for one call.

use crate::config::ConfigRegistry;
use crate::driver::Connection;
use crate::error::EngineError;
use crate::monitor::{AuditLog, SlowQueryLog};
use crate::params::StandardParams;
use crate::resolver::ParamResolver;
use crate::response::ApiResponse;
use crate::security::{RateLimiter, SignatureVerifier};
use crate::sql::SqlBuilder;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Modify,
    List,
    Page,
    DeepPage,
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modify" => Ok(Operation::Modify),
            "list" => Ok(Operation::List),
            "page" => Ok(Operation::Page),
            "deep_page" | "deepPage" => Ok(Operation::DeepPage),
            other => Err(EngineError::Build(format!("unsupported operation: {}", other))),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ConfigRegistry>,
    rate_limiter: Arc<RateLimiter>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ConfigRegistry>, rate_limiter: Arc<RateLimiter>) -> Self {
        Orchestrator {
            registry,
            rate_limiter,
        }
    }

    /// Run one endpoint call on the supplied connection. The connection is
    /// owned by the caller and is never closed here. Every failure folds
    /// into the envelope.
    pub fn process(
        &self,
        api_key: &str,
        operation: Operation,
        params: &StandardParams,
        conn: &mut dyn Connection,
        client: &str,
    ) -> ApiResponse {
        match self.process_inner(api_key, operation, params, conn, client) {
            Ok(response) => response,
            Err(e) => ApiResponse::fail(e.to_string()),
        }
    }

    fn process_inner(
        &self,
        api_key: &str,
        operation: Operation,
        params: &StandardParams,
        conn: &mut dyn Connection,
        client: &str,
    ) -> Result<ApiResponse, EngineError> {
        let start = Instant::now();
        let endpoint = self
            .registry
            .get_sql_config(api_key)
            .ok_or_else(|| EngineError::UnknownEndpoint(api_key.to_string()))?;
        let auth = self.registry.get_effective_auth(endpoint.auth_config.as_ref());

        let canonical = if endpoint.require_auth {
            let merged = params.merged();
            SignatureVerifier::new(&auth).verify(&merged)?
        } else {
            "unsigned".to_string()
        };

        if auth.rate_limit_max > 0 && auth.rate_limit_window > 0 {
            self.rate_limiter.check(
                api_key,
                client,
                auth.rate_limit_max,
                auth.rate_limit_window,
                auth.interval_min,
            )?;
        }

        let resolved = ParamResolver::new(&endpoint).resolve(params)?;
        let stmt = match operation {
            Operation::Modify => SqlBuilder::build_modify(&endpoint, &resolved)?,
            Operation::List => SqlBuilder::build_query(&endpoint, &resolved)?,
            Operation::Page => SqlBuilder::build_page(&endpoint, &resolved)?,
            Operation::DeepPage => SqlBuilder::build_deep_page(&endpoint, &resolved)?,
        };
        tracing::debug!(target: "datagate::core", api_key, sql = %stmt.sql, "statement compiled");

        let response = match operation {
            Operation::Modify => {
                let outcome = conn.execute(&stmt.sql, &stmt.args)?;
                ApiResponse::success_modify(outcome.affected_rows, outcome.generated_key)
            }
            Operation::List => {
                let rows = conn.query(&stmt.sql, &stmt.args)?;
                ApiResponse::success(rows_to_value(rows))
            }
            Operation::Page | Operation::DeepPage => {
                let rows = conn.query(&stmt.sql, &stmt.args)?;
                let total = rows
                    .first()
                    .and_then(|row| row.get("TotalCount"))
                    .and_then(Value::as_i64);
                ApiResponse::success_paged(rows_to_value(rows), total)
            }
        };

        let cost_ms = start.elapsed().as_millis() as u64;
        SlowQueryLog::new(&auth).log_if_slow(&stmt.sql, cost_ms, &stmt.args);
        AuditLog::log(api_key, client, &canonical, cost_ms);
        Ok(response)
    }
}

fn rows_to_value(rows: Vec<crate::driver::Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}
