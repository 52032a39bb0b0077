//! Config registry: prefix-classified loading, hot swap, change listeners.
//!
//! Documents live under a base directory as json/yaml/yml files. File-name
//! prefixes decide what a document contains (`sql-config*` holds endpoint
//! maps, `job-config*` holds job maps); `db-config` and `auth-config` are
//! single documents at known paths. Reads are lock-free on concurrent maps;
//! batch mutations serialize behind one lock.

use crate::config::pattern::FilePattern;
use crate::config::types::{AuthConfig, AuthOverrides, DbConfig, EndpointDef, JobDef};
use crate::error::ConfigError;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigKind {
    Db,
    Sql,
    Job,
    Auth,
}

pub type ConfigListener = Box<dyn Fn(ConfigKind) + Send + Sync>;

/// Deserializer table: one entry per accepted extension.
const DECODERS: &[(&str, fn(&[u8]) -> Result<Value, String>)] = &[
    ("json", decode_json),
    ("yaml", decode_yaml),
    ("yml", decode_yaml),
];

fn decode_json(bytes: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}

fn decode_yaml(bytes: &[u8]) -> Result<Value, String> {
    serde_yaml::from_slice(bytes).map_err(|e| e.to_string())
}

fn decoder_for(ext: &str) -> Option<fn(&[u8]) -> Result<Value, String>> {
    DECODERS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, f)| *f)
}

/// Filename-prefix classification, longest match wins.
const PREFIXES: &[(&str, ConfigKind)] = &[("sql-config", ConfigKind::Sql), ("job-config", ConfigKind::Job)];

fn classify(file_stem: &str) -> Option<ConfigKind> {
    PREFIXES
        .iter()
        .filter(|(prefix, _)| file_stem.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, kind)| *kind)
}

/// Construction knobs. An explicit field wins over its environment variable
/// (`CONFIG_PATTERN`, `DB_CONFIG_PATH`, `AUTH_CONFIG_PATH`), which wins over
/// the built-in default.
#[derive(Clone, Debug, Default)]
pub struct RegistryOptions {
    pub base_dir: Option<PathBuf>,
    pub config_pattern: Option<String>,
    pub db_config_path: Option<String>,
    pub auth_config_path: Option<String>,
}

impl RegistryOptions {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        RegistryOptions {
            base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    fn pattern(&self) -> String {
        setting(self.config_pattern.as_deref(), "CONFIG_PATTERN", "config/**/*")
    }

    fn db_path(&self) -> String {
        setting(self.db_config_path.as_deref(), "DB_CONFIG_PATH", "config/db-config")
    }

    fn auth_path(&self) -> String {
        setting(self.auth_config_path.as_deref(), "AUTH_CONFIG_PATH", "config/auth-config")
    }
}

fn setting(explicit: Option<&str>, env_key: &str, default: &str) -> String {
    if let Some(v) = explicit {
        if !v.trim().is_empty() {
            return v.trim().to_string();
        }
    }
    match std::env::var(env_key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub struct ConfigRegistry {
    base_dir: PathBuf,
    pattern: String,
    endpoints: DashMap<String, Arc<EndpointDef>>,
    jobs: DashMap<String, Arc<JobDef>>,
    db: RwLock<Arc<DbConfig>>,
    auth: RwLock<Arc<AuthConfig>>,
    listeners: RwLock<Vec<ConfigListener>>,
    batch_lock: Mutex<()>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("base_dir", &self.base_dir)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

static SHARED: OnceCell<Arc<ConfigRegistry>> = OnceCell::new();

impl ConfigRegistry {
    /// Build a registry and run the initial load. A missing or empty db
    /// config aborts; a missing auth config falls back to defaults.
    pub fn open(options: RegistryOptions) -> Result<Self, ConfigError> {
        let base_dir = resolve_base_dir(options.base_dir.as_deref())?;
        let registry = ConfigRegistry {
            base_dir,
            pattern: options.pattern(),
            endpoints: DashMap::new(),
            jobs: DashMap::new(),
            db: RwLock::new(Arc::new(DbConfig::default())),
            auth: RwLock::new(Arc::new(AuthConfig::default())),
            listeners: RwLock::new(Vec::new()),
            batch_lock: Mutex::new(()),
        };

        registry.load_db_config(&options.db_path())?;
        registry.load_auth_config(&options.auth_path());
        registry.incremental_load(&registry.pattern.clone())?;
        Ok(registry)
    }

    /// Process-wide facade. The first caller fixes the base directory; later
    /// callers asking for a different one get a stable-identity error.
    pub fn shared(options: RegistryOptions) -> Result<Arc<ConfigRegistry>, ConfigError> {
        let requested = resolve_base_dir(options.base_dir.as_deref())?;
        let registry = SHARED.get_or_try_init(|| Self::open(options).map(Arc::new))?;
        if registry.base_dir != requested {
            return Err(ConfigError::BaseDirBound {
                current: registry.base_dir.display().to_string(),
                requested: requested.display().to_string(),
            });
        }
        Ok(Arc::clone(registry))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn get_sql_config(&self, api_key: &str) -> Option<Arc<EndpointDef>> {
        self.endpoints.get(api_key).map(|e| Arc::clone(e.value()))
    }

    pub fn get_job_config(&self, job_key: &str) -> Option<Arc<JobDef>> {
        self.jobs.get(job_key.trim()).map(|e| Arc::clone(e.value()))
    }

    pub fn get_db_config(&self) -> Arc<DbConfig> {
        Arc::clone(&self.db.read())
    }

    /// Global auth with the override's set fields layered on top.
    pub fn get_effective_auth(&self, overrides: Option<&AuthOverrides>) -> AuthConfig {
        self.auth.read().merged(overrides)
    }

    pub fn subscribe(&self, listener: ConfigListener) {
        self.listeners.write().push(listener);
    }

    /// Re-run the batch load with the pattern the registry was opened with.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let pattern = self.pattern.clone();
        self.incremental_load(&pattern)
    }

    /// Walk the tree for files matching `pattern_path`, classify by filename
    /// prefix, and upsert every valid entry. Malformed files and entries are
    /// logged and skipped; valid entries land even when siblings fail.
    pub fn incremental_load(&self, pattern_path: &str) -> Result<(), ConfigError> {
        let _guard = self.batch_lock.lock();
        let pattern = FilePattern::parse(pattern_path)?;
        let mut affected = BTreeSet::new();

        for path in pattern.walk(&self.base_dir) {
            let Some((stem, ext)) = stem_and_ext(&path) else {
                tracing::debug!(target: "datagate::config", path = %path.display(), "skipping extensionless file");
                continue;
            };
            let Some(decode) = decoder_for(&ext) else {
                tracing::debug!(target: "datagate::config", path = %path.display(), "skipping unsupported format");
                continue;
            };
            let Some(kind) = classify(&stem) else {
                tracing::warn!(target: "datagate::config", path = %path.display(), "unrecognized config prefix, skipping");
                continue;
            };

            let doc = match std::fs::read(&path).map_err(|e| e.to_string()).and_then(|b| decode(&b)) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::error!(target: "datagate::config", path = %path.display(), error = %e, "failed to read config file");
                    continue;
                }
            };

            let accepted = match kind {
                ConfigKind::Sql => merge_entries(&self.endpoints, doc, &path, validate_endpoint),
                ConfigKind::Job => merge_entries(&self.jobs, doc, &path, validate_job),
                _ => 0,
            };
            if accepted > 0 {
                affected.insert(kind);
            }
        }

        for kind in affected {
            self.notify(kind);
        }
        Ok(())
    }

    fn load_db_config(&self, base_path: &str) -> Result<(), ConfigError> {
        for (ext, decode) in DECODERS {
            let path = self.base_dir.join(format!("{}.{}", base_path, ext));
            if !path.is_file() {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| ConfigError::Load(e.to_string()))?;
            let doc = decode(&bytes).map_err(ConfigError::Load)?;
            let config: DbConfig = serde_json::from_value(doc).map_err(|e| ConfigError::Load(e.to_string()))?;
            if !config.has_any() {
                return Err(ConfigError::Validation(format!(
                    "db config '{}' declares no datasource",
                    path.display()
                )));
            }
            *self.db.write() = Arc::new(config);
            tracing::info!(target: "datagate::config", path = %path.display(), "db config loaded");
            self.notify(ConfigKind::Db);
            return Ok(());
        }
        Err(ConfigError::MissingRequired(format!(
            "{}.[json|yaml|yml] under {}",
            base_path,
            self.base_dir.display()
        )))
    }

    fn load_auth_config(&self, base_path: &str) {
        for (ext, decode) in DECODERS {
            let path = self.base_dir.join(format!("{}.{}", base_path, ext));
            if !path.is_file() {
                continue;
            }
            match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|b| decode(&b))
                .and_then(|doc| serde_json::from_value::<AuthConfig>(doc).map_err(|e| e.to_string()))
            {
                Ok(config) => {
                    *self.auth.write() = Arc::new(config);
                    tracing::info!(target: "datagate::config", path = %path.display(), "auth config loaded");
                    self.notify(ConfigKind::Auth);
                    return;
                }
                Err(e) => {
                    tracing::error!(target: "datagate::config", path = %path.display(), error = %e, "failed to load auth config");
                }
            }
        }
        tracing::warn!(target: "datagate::config", "no auth config found, using defaults");
    }

    fn notify(&self, kind: ConfigKind) {
        for listener in self.listeners.read().iter() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(kind)));
            if outcome.is_err() {
                tracing::warn!(target: "datagate::config", kind = ?kind, "config listener panicked");
            }
        }
    }
}

/// Deserialize a document as `map<key, T>` and upsert each valid entry.
/// Returns the number of accepted entries. Last write wins across files.
fn merge_entries<T: DeserializeOwned>(
    target: &DashMap<String, Arc<T>>,
    doc: Value,
    path: &Path,
    validate: fn(&str, &T) -> Result<(), String>,
) -> usize {
    let Value::Object(entries) = doc else {
        tracing::error!(target: "datagate::config", path = %path.display(), "config document is not a map, skipping");
        return 0;
    };
    let mut accepted = 0;
    for (raw_key, raw_value) in entries {
        let key = raw_key.trim();
        if key.is_empty() {
            tracing::warn!(target: "datagate::config", path = %path.display(), "skipping entry with blank key");
            continue;
        }
        match serde_json::from_value::<T>(raw_value) {
            Ok(value) => match validate(key, &value) {
                Ok(()) => {
                    target.insert(key.to_string(), Arc::new(value));
                    tracing::info!(target: "datagate::config", path = %path.display(), key, "config entry loaded");
                    accepted += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "datagate::config", path = %path.display(), key, error = %e, "config entry rejected");
                }
            },
            Err(e) => {
                tracing::warn!(target: "datagate::config", path = %path.display(), key, error = %e, "config entry malformed, skipping");
            }
        }
    }
    accepted
}

fn validate_endpoint(key: &str, def: &EndpointDef) -> Result<(), String> {
    if def.table_name.trim().is_empty() {
        return Err(format!("endpoint '{}' has a blank tableName", key));
    }
    Ok(())
}

fn validate_job(_key: &str, _def: &JobDef) -> Result<(), String> {
    Ok(())
}

fn stem_and_ext(path: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_str()?.to_string();
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some((stem, ext))
}

fn resolve_base_dir(base_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::BadBaseDir(".".into(), e.to_string()))?;
    let dir = match base_dir {
        None => cwd,
        Some(p) if p.as_os_str().is_empty() => cwd,
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd.join(p),
    };
    dir.canonicalize()
        .map_err(|e| ConfigError::BadBaseDir(dir.display().to_string(), e.to_string()))
}
