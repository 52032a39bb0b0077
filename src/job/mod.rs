//! Job-flow executor: ordered API/script steps under one transactional
//! envelope, with a shared step-result context.

pub mod transaction;

use crate::config::{ConfigRegistry, JobStep, StepKind};
use crate::driver::DriverRegistry;
use crate::orchestrator::{Operation, Orchestrator};
use crate::params::StandardParams;
use crate::response::{JobResponse, StepOutcome};
use crate::script::ScriptRegistry;
use crate::security::{RateLimiter, SignatureVerifier};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use transaction::JobConnections;

pub struct JobExecutor {
    registry: Arc<ConfigRegistry>,
    drivers: Arc<DriverRegistry>,
    orchestrator: Arc<Orchestrator>,
    rate_limiter: Arc<RateLimiter>,
    scripts: Arc<ScriptRegistry>,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        drivers: Arc<DriverRegistry>,
        orchestrator: Arc<Orchestrator>,
        rate_limiter: Arc<RateLimiter>,
        scripts: Arc<ScriptRegistry>,
    ) -> Self {
        JobExecutor {
            registry,
            drivers,
            orchestrator,
            rate_limiter,
            scripts,
        }
    }

    /// Run a job to completion. All steps succeed → commit every opened
    /// transaction; any failure → roll them all back. Cached connections
    /// close on every exit path.
    pub fn execute(&self, job_key: &str, params: &StandardParams, client: &str) -> JobResponse {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let Some(job) = self.registry.get_job_config(job_key) else {
            return JobResponse::fail(format!("unknown job: {}", job_key), Vec::new(), elapsed(start));
        };
        if job.jobs.is_empty() {
            return JobResponse::fail(
                format!("job has no steps: {}", job_key),
                Vec::new(),
                elapsed(start),
            );
        }

        let auth = self.registry.get_effective_auth(job.auth_config.as_ref());
        let mut context = params.merged();

        if job.require_auth {
            if let Err(e) = SignatureVerifier::new(&auth).verify(&context) {
                return JobResponse::fail(e.to_string(), Vec::new(), elapsed(start));
            }
        }
        if auth.rate_limit_max > 0 && auth.rate_limit_window > 0 {
            if let Err(e) = self.rate_limiter.check(
                job_key,
                client,
                auth.rate_limit_max,
                auth.rate_limit_window,
                auth.interval_min,
            ) {
                return JobResponse::fail(e.to_string(), Vec::new(), elapsed(start));
            }
        }

        let mut connections = JobConnections::new();
        let mut steps = Vec::with_capacity(job.jobs.len());
        let mut failure: Option<String> = None;

        for (index, step) in job.jobs.iter().enumerate() {
            let step_name = format!("step_{}_{}", index + 1, kind_tag(step.kind));
            let step_start = Instant::now();
            let outcome = match step.kind {
                StepKind::Api => {
                    self.run_api_step(step, params, job.transaction, &mut connections, client)
                }
                StepKind::Script => self.run_script_step(step, &mut context),
            };
            match outcome {
                Ok(data) => {
                    context.insert(step_name.clone(), data.clone());
                    steps.push(StepOutcome {
                        step_name,
                        success: true,
                        step_time: elapsed(step_start),
                        data: Some(data),
                    });
                }
                Err(msg) => {
                    tracing::error!(target: "datagate::job", job_key, step = %step_name, error = %msg, "step failed");
                    let text = format!("step [{}] failed: {}", step_name, msg);
                    steps.push(StepOutcome {
                        step_name,
                        success: false,
                        step_time: elapsed(step_start),
                        data: Some(json!(msg)),
                    });
                    failure = Some(text);
                    break;
                }
            }
        }

        let response = match failure {
            None => {
                if job.transaction {
                    match connections.commit_all() {
                        Ok(()) => JobResponse::success(steps, elapsed(start)),
                        Err(e) => JobResponse::fail(e.to_string(), steps, elapsed(start)),
                    }
                } else {
                    JobResponse::success(steps, elapsed(start))
                }
            }
            Some(msg) => {
                connections.rollback_all();
                JobResponse::fail(msg, steps, elapsed(start))
            }
        };

        connections.close_all();
        response
    }

    fn run_api_step(
        &self,
        step: &JobStep,
        params: &StandardParams,
        transactional: bool,
        connections: &mut JobConnections,
        client: &str,
    ) -> Result<Value, String> {
        let api_key = step
            .api_key
            .as_deref()
            .ok_or("api step missing apiKey")?;
        let operation: Operation = step
            .operation
            .as_deref()
            .ok_or("api step missing operation")?
            .parse()
            .map_err(|e: crate::error::EngineError| e.to_string())?;
        let endpoint = self
            .registry
            .get_sql_config(api_key)
            .ok_or_else(|| format!("unknown endpoint: {}", api_key))?;

        let drive = &endpoint.db_drive;
        let key = drive.datasource_key();
        let conn = connections
            .get_or_open(&key, transactional, || {
                self.drivers.connection(drive.drive, &drive.host)
            })
            .map_err(|e| e.to_string())?;

        let response = self
            .orchestrator
            .process(api_key, operation, params, conn, client);
        if !response.success {
            return Err(response.msg);
        }
        Ok(match response.data {
            Some(data) => data,
            None => json!({
                "affectedRows": response.affected_rows,
                "generatedKey": response.generated_key,
            }),
        })
    }

    fn run_script_step(
        &self,
        step: &JobStep,
        context: &mut HashMap<String, Value>,
    ) -> Result<Value, String> {
        let script_type = step
            .script_type
            .as_deref()
            .ok_or("script step missing scriptType")?;
        let source = step
            .script_content
            .as_deref()
            .ok_or("script step missing scriptContent")?;
        let executor = self.scripts.get(script_type).map_err(|e| e.to_string())?;
        executor.execute(source, context).map_err(|e| e.to_string())
    }
}

fn kind_tag(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Api => "api",
        StepKind::Script => "script",
    }
}
