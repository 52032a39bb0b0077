//! Engine facade: one lifetime owner for the registry, driver pools,
//! limiter, scripts, orchestrator, and job executor.

use crate::config::{ConfigKind, ConfigRegistry};
use crate::driver::{DriverRegistry, PoolProvider};
use crate::job::JobExecutor;
use crate::orchestrator::{Operation, Orchestrator};
use crate::params::StandardParams;
use crate::response::{ApiResponse, JobResponse};
use crate::script::ScriptRegistry;
use crate::security::RateLimiter;
use std::sync::Arc;

pub struct Engine {
    registry: Arc<ConfigRegistry>,
    drivers: Arc<DriverRegistry>,
    orchestrator: Arc<Orchestrator>,
    jobs: JobExecutor,
}

impl Engine {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        provider: Box<dyn PoolProvider>,
        scripts: ScriptRegistry,
    ) -> Self {
        let drivers = Arc::new(DriverRegistry::new(Arc::clone(&registry), provider));
        let rate_limiter = Arc::new(RateLimiter::new());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&rate_limiter),
        ));
        let jobs = JobExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&drivers),
            Arc::clone(&orchestrator),
            Arc::clone(&rate_limiter),
            Arc::new(scripts),
        );

        // A reloaded db config invalidates every materialized pool.
        let pool_cache = Arc::clone(&drivers);
        registry.subscribe(Box::new(move |kind| {
            if kind == ConfigKind::Db {
                pool_cache.clear();
            }
        }));

        Engine {
            registry,
            drivers,
            orchestrator,
            jobs,
        }
    }

    /// Run one endpoint call on a pooled connection the engine acquires and
    /// returns itself.
    pub fn invoke(
        &self,
        api_key: &str,
        operation: Operation,
        params: &StandardParams,
        client: &str,
    ) -> ApiResponse {
        let Some(endpoint) = self.registry.get_sql_config(api_key) else {
            return ApiResponse::fail(format!("unknown endpoint: {}", api_key));
        };
        let drive = &endpoint.db_drive;
        let mut conn = match self.drivers.connection(drive.drive, &drive.host) {
            Ok(conn) => conn,
            Err(e) => return ApiResponse::fail(e.to_string()),
        };
        let response = self
            .orchestrator
            .process(api_key, operation, params, conn.as_mut(), client);
        if let Err(e) = conn.close() {
            tracing::warn!(target: "datagate::core", api_key, error = %e, "connection close failed");
        }
        response
    }

    pub fn run_job(&self, job_key: &str, params: &StandardParams, client: &str) -> JobResponse {
        self.jobs.execute(job_key, params, client)
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn drivers(&self) -> &Arc<DriverRegistry> {
        &self.drivers
    }
}
