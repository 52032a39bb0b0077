//! Raw config types matching the JSON/YAML document schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Target database dialect for an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Mssql,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Mssql => "mssql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::Mysql),
            "mssql" => Ok(Dialect::Mssql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unsupported dialect: {}", other)),
        }
    }
}

/// Logical datasource reference: dialect plus a named host entry in `DbConfig`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDrive {
    #[serde(default = "default_dialect")]
    pub drive: Dialect,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for DbDrive {
    fn default() -> Self {
        DbDrive {
            drive: default_dialect(),
            host: default_host(),
        }
    }
}

impl DbDrive {
    /// Cache key used by the per-job connection cache.
    pub fn datasource_key(&self) -> String {
        format!("{}{}", self.drive, self.host)
    }
}

fn default_dialect() -> Dialect {
    Dialect::Mysql
}

fn default_host() -> String {
    "default".into()
}

/// Where a mapped parameter is read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Path,
    Query,
    Body,
    #[default]
    All,
}

/// Declared type a resolved parameter is coerced to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Int,
    Long,
    Double,
    Boolean,
}

/// One validation rule attached to a parameter mapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub param: Option<Value>,
    /// Custom error text; wins over the generated default message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Declares one incoming parameter: key, source, type, and rule chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamMapping {
    pub field: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub source: ParamSource,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub validators: Vec<Rule>,
}

impl ParamMapping {
    /// Key under which the resolved value is emitted.
    pub fn resolved_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

/// Boolean connective joining the per-column fragments of one condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// How a single incoming parameter expands over one or more columns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub fields: Vec<String>,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub logic: Logic,
}

fn default_operator() -> String {
    "=".into()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// One declarative endpoint: everything needed to compile and guard a call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDef {
    pub table_name: String,
    #[serde(default)]
    pub db_drive: DbDrive,
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default)]
    pub params_mapping: Vec<ParamMapping>,
    /// BTreeMap so a compilation walks conditions in a stable order.
    #[serde(default)]
    pub condition_schema: BTreeMap<String, ConditionSpec>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub mutable_fields: Vec<String>,
    #[serde(default = "default_pk")]
    pub pk: String,
    /// Name of a param whose value (`update`/`insert`) overrides the
    /// INSERT-vs-UPDATE inference.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub preset_params: HashMap<String, Value>,
    /// Page number past which shallow pagination switches to the
    /// ROW_NUMBER form. 0 disables the switch.
    #[serde(default)]
    pub shallow_to_deep_threshold: u32,
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub auth_config: Option<AuthOverrides>,
    // Descriptive metadata carried for operators' tooling; the pipeline
    // ignores these.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_field() -> String {
    "*".into()
}

fn default_pk() -> String {
    "id".into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Api,
    Script,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub script_type: Option<String>,
    #[serde(default)]
    pub script_content: Option<String>,
}

/// An ordered composite of API and script steps under one transactional
/// envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDef {
    pub jobs: Vec<JobStep>,
    #[serde(default = "default_true")]
    pub transaction: bool,
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub auth_config: Option<AuthOverrides>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Md5,
    Sha1,
    Sha256,
    HmacMd5,
    HmacSha1,
    HmacSha256,
}

/// Effective security/monitoring knobs for one endpoint or job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Seconds a submitted timestamp stays valid.
    #[serde(default = "default_signature_expire")]
    pub signature_expire: u64,
    /// Sliding-window length in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,
    /// Max requests per window; 0 disables the window check.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    /// Minimum milliseconds between two requests; 0 disables.
    #[serde(default)]
    pub interval_min: u64,
    #[serde(default = "default_algorithm")]
    pub signature_algorithm: SignatureAlgorithm,
    #[serde(default = "default_audit_prefix")]
    pub audit_field_prefix: String,
    #[serde(default = "default_audit_signature")]
    pub audit_signature: String,
    #[serde(default = "default_audit_timestamp")]
    pub audit_timestamp: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_true")]
    pub slow_log: bool,
    #[serde(default = "default_slow_log_threshold")]
    pub slow_log_threshold: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            signature_expire: default_signature_expire(),
            rate_limit_window: default_rate_limit_window(),
            rate_limit_max: default_rate_limit_max(),
            interval_min: 0,
            signature_algorithm: default_algorithm(),
            audit_field_prefix: default_audit_prefix(),
            audit_signature: default_audit_signature(),
            audit_timestamp: default_audit_timestamp(),
            secret: None,
            slow_log: true,
            slow_log_threshold: default_slow_log_threshold(),
            log_level: default_log_level(),
        }
    }
}

fn default_signature_expire() -> u64 {
    300
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_algorithm() -> SignatureAlgorithm {
    SignatureAlgorithm::Sha256
}

fn default_audit_prefix() -> String {
    "audit_".into()
}

fn default_audit_signature() -> String {
    "signature".into()
}

fn default_audit_timestamp() -> String {
    "timestamp".into()
}

fn default_slow_log_threshold() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".into()
}

/// Per-endpoint / per-job auth override: set fields win over the global
/// config, unset fields fall through.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOverrides {
    #[serde(default)]
    pub signature_expire: Option<u64>,
    #[serde(default)]
    pub rate_limit_window: Option<u64>,
    #[serde(default)]
    pub rate_limit_max: Option<u32>,
    #[serde(default)]
    pub interval_min: Option<u64>,
    #[serde(default)]
    pub signature_algorithm: Option<SignatureAlgorithm>,
    #[serde(default)]
    pub audit_field_prefix: Option<String>,
    #[serde(default)]
    pub audit_signature: Option<String>,
    #[serde(default)]
    pub audit_timestamp: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub slow_log: Option<bool>,
    #[serde(default)]
    pub slow_log_threshold: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl AuthConfig {
    /// Field-wise merge: a new config whose fields are the override's set
    /// values falling back to `self`. Pure; neither input is mutated.
    pub fn merged(&self, overrides: Option<&AuthOverrides>) -> AuthConfig {
        let Some(o) = overrides else {
            return self.clone();
        };
        AuthConfig {
            signature_expire: o.signature_expire.unwrap_or(self.signature_expire),
            rate_limit_window: o.rate_limit_window.unwrap_or(self.rate_limit_window),
            rate_limit_max: o.rate_limit_max.unwrap_or(self.rate_limit_max),
            interval_min: o.interval_min.unwrap_or(self.interval_min),
            signature_algorithm: o.signature_algorithm.unwrap_or(self.signature_algorithm),
            audit_field_prefix: o
                .audit_field_prefix
                .clone()
                .unwrap_or_else(|| self.audit_field_prefix.clone()),
            audit_signature: o
                .audit_signature
                .clone()
                .unwrap_or_else(|| self.audit_signature.clone()),
            audit_timestamp: o
                .audit_timestamp
                .clone()
                .unwrap_or_else(|| self.audit_timestamp.clone()),
            secret: o.secret.clone().or_else(|| self.secret.clone()),
            slow_log: o.slow_log.unwrap_or(self.slow_log),
            slow_log_threshold: o.slow_log_threshold.unwrap_or(self.slow_log_threshold),
            log_level: o
                .log_level
                .clone()
                .unwrap_or_else(|| self.log_level.clone()),
        }
    }
}

/// Pool sizing knobs handed to the embedder's `PoolProvider`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolPolicy {
    #[serde(default = "default_pool_max")]
    pub max: u32,
    #[serde(default)]
    pub min_idle: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        PoolPolicy {
            max: default_pool_max(),
            min_idle: 0,
            connection_timeout_ms: default_connection_timeout(),
            idle_timeout_ms: default_idle_timeout(),
        }
    }
}

fn default_pool_max() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30_000
}

fn default_idle_timeout() -> u64 {
    600_000
}

/// A server-addressed datasource (MySQL / MSSQL).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolPolicy,
}

fn default_server_host() -> String {
    "localhost".into()
}

/// A file-addressed datasource (SQLite).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    pub file_path: String,
    #[serde(default)]
    pub pool: PoolPolicy,
}

/// Borrowed view of one datasource entry, handed to `PoolProvider::build`.
#[derive(Clone, Copy, Debug)]
pub enum DataSourceSpec<'a> {
    Server(&'a ServerSpec),
    File(&'a FileSpec),
}

/// Named datasources per dialect.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    #[serde(default)]
    pub mysql: HashMap<String, ServerSpec>,
    #[serde(default)]
    pub mssql: HashMap<String, ServerSpec>,
    #[serde(default)]
    pub sqlite: HashMap<String, FileSpec>,
}

impl DbConfig {
    /// A db config with no datasource at all cannot serve anything.
    pub fn has_any(&self) -> bool {
        !self.mysql.is_empty() || !self.mssql.is_empty() || !self.sqlite.is_empty()
    }

    pub fn spec(&self, dialect: Dialect, name: &str) -> Option<DataSourceSpec<'_>> {
        match dialect {
            Dialect::Mysql => self.mysql.get(name).map(DataSourceSpec::Server),
            Dialect::Mssql => self.mssql.get(name).map(DataSourceSpec::Server),
            Dialect::Sqlite => self.sqlite.get(name).map(DataSourceSpec::File),
        }
    }
}
