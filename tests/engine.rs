//! End-to-end scenarios over an in-memory mock driver: engine invocation,
//! job commit fan-out, and coordinated rollback on step failure.

use datagate::config::DataSourceSpec;
use datagate::{
    Connection, ConnectionPool, ConfigRegistry, Dialect, Engine, EngineError, ExecOutcome,
    Operation, PoolProvider, RegistryOptions, Row, ScriptExecutor, ScriptRegistry, StandardParams,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Shared operation journal: every pool and connection event, in order.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, needle: &str) -> usize {
        self.entries().iter().filter(|e| e.contains(needle)).count()
    }
}

struct MockProvider {
    journal: Journal,
}

impl PoolProvider for MockProvider {
    fn build(
        &self,
        dialect: Dialect,
        name: &str,
        _spec: DataSourceSpec<'_>,
    ) -> Result<Arc<dyn ConnectionPool>, EngineError> {
        Ok(Arc::new(MockPool {
            key: format!("{}/{}", dialect, name),
            journal: self.journal.clone(),
        }))
    }
}

struct MockPool {
    key: String,
    journal: Journal,
}

impl ConnectionPool for MockPool {
    fn acquire(&self) -> Result<Box<dyn Connection>, EngineError> {
        self.journal.push(format!("acquire@{}", self.key));
        Ok(Box::new(MockConn {
            key: self.key.clone(),
            journal: self.journal.clone(),
        }))
    }
}

struct MockConn {
    key: String,
    journal: Journal,
}

impl Connection for MockConn {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, EngineError> {
        self.journal.push(format!("query@{}|{}|{}", self.key, sql, args.len()));
        let row = json!({"id": 1, "username": "al", "TotalCount": 3});
        match row {
            Value::Object(map) => Ok(vec![map]),
            _ => unreachable!(),
        }
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecOutcome, EngineError> {
        self.journal.push(format!("execute@{}|{}|{}", self.key, sql, args.len()));
        Ok(ExecOutcome {
            affected_rows: 1,
            generated_key: Some(7),
        })
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.journal.push(format!("auto_commit({})@{}", enabled, self.key));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.journal.push(format!("commit@{}", self.key));
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        self.journal.push(format!("rollback@{}", self.key));
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.journal.push(format!("close@{}", self.key));
        Ok(())
    }
}

struct FailingScript;

impl ScriptExecutor for FailingScript {
    fn execute(
        &self,
        _source: &str,
        _bindings: &mut HashMap<String, Value>,
    ) -> Result<Value, EngineError> {
        Err(EngineError::Script("boom from script".into()))
    }

    fn script_type(&self) -> &str {
        "js"
    }
}

struct ContextProbeScript;

impl ScriptExecutor for ContextProbeScript {
    fn execute(
        &self,
        _source: &str,
        bindings: &mut HashMap<String, Value>,
    ) -> Result<Value, EngineError> {
        // Reports which step results it can see, proving context sharing.
        let visible: Vec<&String> = bindings.keys().filter(|k| k.starts_with("step_")).collect();
        let mut visible: Vec<String> = visible.into_iter().cloned().collect();
        visible.sort();
        Ok(json!({ "visible_steps": visible }))
    }

    fn script_type(&self) -> &str {
        "groovy"
    }
}

fn write(base: &Path, rel: &str, content: &str) {
    let path = base.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn seed_config(base: &Path) {
    write(
        base,
        "config/db-config.json",
        r#"{
            "mysql": {"main": {"host": "db-a", "database": "app"}},
            "sqlite": {"local": {"filePath": "./data/app.db"}}
        }"#,
    );
    write(
        base,
        "config/sql-config.json",
        r#"{
            "user_list": {
                "tableName": "users",
                "dbDrive": {"drive": "mysql", "host": "main"},
                "conditionSchema": {"keyword": {"fields": ["username", "email"], "operator": "like", "logic": "OR"}},
                "paramsMapping": [{"field": "keyword"}]
            },
            "user_insert": {
                "tableName": "users",
                "dbDrive": {"drive": "mysql", "host": "main"},
                "mutableFields": ["name", "email"],
                "paramsMapping": [{"field": "name"}, {"field": "email"}]
            },
            "audit_insert": {
                "tableName": "audit_trail",
                "dbDrive": {"drive": "sqlite", "host": "local"},
                "mutableFields": ["entry"],
                "paramsMapping": [{"field": "entry"}]
            }
        }"#,
    );
    write(
        base,
        "config/job-config.yaml",
        r#"
two_sources:
  jobs:
    - type: api
      apiKey: user_insert
      operation: modify
    - type: api
      apiKey: audit_insert
      operation: modify
rolls_back:
  jobs:
    - type: api
      apiKey: user_insert
      operation: modify
    - type: script
      scriptType: js
      scriptContent: "explode()"
shares_context:
  jobs:
    - type: api
      apiKey: user_list
      operation: list
    - type: script
      scriptType: groovy
      scriptContent: "inspect()"
same_source_twice:
  jobs:
    - type: api
      apiKey: user_insert
      operation: modify
    - type: api
      apiKey: user_insert
      operation: modify
no_steps:
  jobs: []
bad_script_type:
  jobs:
    - type: api
      apiKey: user_insert
      operation: modify
    - type: script
      scriptType: lua
      scriptContent: "return 1"
"#,
    );
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn engine_fixture() -> (TempDir, Journal, Engine) {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    seed_config(tmp.path());
    let registry =
        Arc::new(ConfigRegistry::open(RegistryOptions::with_base_dir(tmp.path())).unwrap());
    let journal = Journal::default();
    let mut scripts = ScriptRegistry::new();
    scripts.register(Arc::new(FailingScript));
    scripts.register(Arc::new(ContextProbeScript));
    let engine = Engine::new(
        registry,
        Box::new(MockProvider {
            journal: journal.clone(),
        }),
        scripts,
    );
    (tmp, journal, engine)
}

#[test]
fn invoke_runs_list_on_a_pooled_connection() {
    let (_tmp, journal, engine) = engine_fixture();
    let params = StandardParams::new().with_query("keyword", "al");
    let resp = engine.invoke("user_list", Operation::List, &params, "client-1");
    assert!(resp.success, "{}", resp.msg);
    let data = resp.data.unwrap();
    assert_eq!(data[0]["username"], json!("al"));

    let ops = journal.entries();
    assert_eq!(journal.count("acquire@mysql/main"), 1);
    assert!(ops.iter().any(|op| op.contains(
        "query@mysql/main|SELECT * FROM users WHERE (username LIKE ? OR email LIKE ?)|2"
    )));
    assert_eq!(journal.count("close@mysql/main"), 1);
}

#[test]
fn invoke_modify_returns_affected_rows_and_key() {
    let (_tmp, _journal, engine) = engine_fixture();
    let params = StandardParams::new()
        .with_body("name", "al")
        .with_body("email", "al@example.com");
    let resp = engine.invoke("user_insert", Operation::Modify, &params, "client-1");
    assert!(resp.success, "{}", resp.msg);
    assert_eq!(resp.affected_rows, Some(1));
    assert_eq!(resp.generated_key, Some(7));
}

#[test]
fn job_commits_every_datasource_in_order() {
    let (_tmp, journal, engine) = engine_fixture();
    let params = StandardParams::new()
        .with_body("name", "al")
        .with_body("email", "al@example.com")
        .with_body("entry", "created user al");
    let resp = engine.run_job("two_sources", &params, "client-1");
    assert!(resp.success, "{}", resp.msg);
    assert_eq!(resp.steps.len(), 2);
    assert!(resp.steps.iter().all(|s| s.success));
    assert_eq!(resp.steps[0].step_name, "step_1_api");
    assert_eq!(resp.steps[1].step_name, "step_2_api");

    let ops = journal.entries();
    let commits: Vec<&String> = ops.iter().filter(|op| op.starts_with("commit@")).collect();
    assert_eq!(commits, ["commit@mysql/main", "commit@sqlite/local"]);
    assert_eq!(journal.count("close@mysql/main"), 1);
    assert_eq!(journal.count("close@sqlite/local"), 1);
    assert!(journal.count("rollback@") == 0);
}

#[test]
fn failing_script_rolls_back_and_closes_everything() {
    let (_tmp, journal, engine) = engine_fixture();
    let params = StandardParams::new()
        .with_body("name", "al")
        .with_body("email", "al@example.com");
    let resp = engine.run_job("rolls_back", &params, "client-1");

    assert!(!resp.success);
    assert!(resp.msg.contains("boom from script"));
    assert_eq!(resp.steps.len(), 2);
    assert!(resp.steps[0].success);
    assert!(!resp.steps[1].success);

    let ops = journal.entries();
    assert!(ops.iter().any(|op| op == "execute@mysql/main|INSERT INTO users (name, email) VALUES (?, ?)|2"));
    assert_eq!(journal.count("commit@"), 0);
    assert_eq!(journal.count("rollback@mysql/main"), 1);
    assert_eq!(journal.count("close@mysql/main"), 1);
    // Auto-commit is restored before the connection goes back.
    assert!(ops.iter().any(|op| op == "auto_commit(true)@mysql/main"));
}

#[test]
fn job_steps_share_one_connection_per_datasource() {
    let (_tmp, journal, engine) = engine_fixture();
    let params = StandardParams::new()
        .with_body("name", "al")
        .with_body("email", "al@example.com");
    let resp = engine.run_job("same_source_twice", &params, "client-1");
    assert!(resp.success, "{}", resp.msg);
    assert_eq!(journal.count("acquire@mysql/main"), 1);
    assert_eq!(journal.count("execute@mysql/main"), 2);
    assert_eq!(journal.count("commit@mysql/main"), 1);
}

#[test]
fn script_steps_see_prior_step_results() {
    let (_tmp, _journal, engine) = engine_fixture();
    let resp = engine.run_job("shares_context", &StandardParams::new(), "client-1");
    assert!(resp.success, "{}", resp.msg);
    let probe = resp.steps[1].data.as_ref().unwrap();
    assert_eq!(probe["visible_steps"], json!(["step_1_api"]));
}

#[test]
fn empty_job_fails_before_touching_any_pool() {
    let (_tmp, journal, engine) = engine_fixture();
    let resp = engine.run_job("no_steps", &StandardParams::new(), "client-1");
    assert!(!resp.success);
    assert!(resp.msg.contains("no steps"));
    assert!(journal.entries().is_empty());
}

#[test]
fn unregistered_script_type_rolls_back_prior_steps() {
    let (_tmp, journal, engine) = engine_fixture();
    let params = StandardParams::new()
        .with_body("name", "al")
        .with_body("email", "al@example.com");
    let resp = engine.run_job("bad_script_type", &params, "client-1");
    assert!(!resp.success);
    assert!(resp.msg.contains("unsupported script type"));
    assert_eq!(journal.count("rollback@mysql/main"), 1);
    assert_eq!(journal.count("commit@"), 0);
}

#[test]
fn unknown_job_fails_cleanly() {
    let (_tmp, journal, engine) = engine_fixture();
    let resp = engine.run_job("ghost", &StandardParams::new(), "client-1");
    assert!(!resp.success);
    assert!(resp.msg.contains("unknown job"));
    assert!(journal.entries().is_empty());
}

#[test]
fn hot_reload_picks_up_new_endpoints() {
    let (tmp, _journal, engine) = engine_fixture();
    let resp = engine.invoke("late_arrival", Operation::List, &StandardParams::new(), "c");
    assert!(!resp.success);

    write(
        tmp.path(),
        "config/sql-config-late.json",
        r#"{"late_arrival": {"tableName": "latecomers",
            "dbDrive": {"drive": "mysql", "host": "main"}}}"#,
    );
    engine.registry().reload().unwrap();
    let resp = engine.invoke("late_arrival", Operation::List, &StandardParams::new(), "c");
    assert!(resp.success, "{}", resp.msg);
}
