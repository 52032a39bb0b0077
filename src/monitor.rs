//! Slow-query and audit records. Telemetry must never fail a request, so
//! everything here logs and returns.

use crate::config::AuthConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"1[3-9]\d{9}").expect("phone mask"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email mask"));

static SECRET_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(password|token|secret)[:=]\s*[^,;}]+").expect("secret mask"));

static SECRET_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"password|token|secret").expect("secret word"));

/// Records statements whose cost crosses the configured threshold.
pub struct SlowQueryLog {
    enabled: bool,
    threshold_ms: u64,
}

impl SlowQueryLog {
    pub fn new(auth: &AuthConfig) -> Self {
        SlowQueryLog {
            enabled: auth.slow_log,
            threshold_ms: auth.slow_log_threshold,
        }
    }

    pub fn log_if_slow(&self, sql: &str, cost_ms: u64, args: &[Value]) {
        if !self.enabled || cost_ms < self.threshold_ms {
            return;
        }
        let masked = mask_args(args);
        tracing::warn!(
            target: "datagate::slow_query",
            cost_ms,
            threshold_ms = self.threshold_ms,
            sql,
            args = %serde_json::Value::Array(masked),
            "slow query detected"
        );
    }
}

/// One audit line per processed request: who, what, how long, signed what.
pub struct AuditLog;

impl AuditLog {
    pub fn log(api_key: &str, client: &str, signed_payload: &str, cost_ms: u64) {
        tracing::info!(
            target: "datagate::audit",
            at = %chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            api_key,
            client,
            cost_ms,
            payload = %mask_sensitive(signed_payload),
            "audit"
        );
    }
}

/// Whole-argument redaction: any string arg mentioning a credential keyword
/// is replaced outright.
pub fn mask_args(args: &[Value]) -> Vec<Value> {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) if SECRET_WORD.is_match(s) => Value::String("***redacted***".into()),
            other => other.clone(),
        })
        .collect()
}

/// In-text masking for audit payloads: phones, emails, credential pairs.
pub fn mask_sensitive(text: &str) -> String {
    let masked = PHONE.replace_all(text, "***phone***");
    let masked = EMAIL.replace_all(&masked, "***email***");
    SECRET_PAIR
        .replace_all(&masked, "$1=***redacted***")
        .into_owned()
}
