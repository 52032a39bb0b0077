//! Request signing: canonical audit-string construction and digest checks.

use crate::config::{AuthConfig, SignatureAlgorithm};
use crate::error::EngineError;
use crate::params::plain_text;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SignatureVerifier<'a> {
    auth: &'a AuthConfig,
}

impl<'a> SignatureVerifier<'a> {
    pub fn new(auth: &'a AuthConfig) -> Self {
        SignatureVerifier { auth }
    }

    /// Verify the submitted signature over the merged parameter map. On
    /// success returns the canonical string for the audit log.
    pub fn verify(&self, params: &HashMap<String, Value>) -> Result<String, EngineError> {
        self.verify_at(params, now_seconds())
    }

    pub fn verify_at(
        &self,
        params: &HashMap<String, Value>,
        now_seconds: u64,
    ) -> Result<String, EngineError> {
        let timestamp = params
            .get(&self.auth.audit_timestamp)
            .map(plain_text)
            .filter(|s| !s.is_empty());
        let submitted = params
            .get(&self.auth.audit_signature)
            .map(plain_text)
            .filter(|s| !s.is_empty());
        let (Some(timestamp), Some(submitted)) = (timestamp, submitted) else {
            return Err(EngineError::Signature("missing timestamp or signature".into()));
        };

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| EngineError::Signature("invalid timestamp".into()))?;
        if now_seconds as i64 - ts > self.auth.signature_expire as i64 {
            return Err(EngineError::Signature("expired".into()));
        }

        let canonical = canonical_string(self.auth, params, &timestamp);
        let key = signing_key(self.auth, now_seconds);
        let computed = compute_signature(self.auth.signature_algorithm, &canonical, &key)?;
        if computed != submitted {
            return Err(EngineError::Signature("verification failed".into()));
        }
        Ok(canonical)
    }
}

/// Ascending scan over audit-prefixed keys (minus the signature key itself),
/// `k=v&` pairs, closed by `timestamp=<ts>`.
pub fn canonical_string(
    auth: &AuthConfig,
    params: &HashMap<String, Value>,
    timestamp: &str,
) -> String {
    let sorted: BTreeMap<&str, &Value> = params.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut out = String::new();
    for (key, value) in sorted {
        if !key.starts_with(&auth.audit_field_prefix) || key == auth.audit_signature {
            continue;
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&plain_text(value));
        out.push('&');
    }
    out.push_str("timestamp=");
    out.push_str(timestamp);
    out
}

/// The configured secret, or the first nine digits of the current epoch
/// second when none is set (stable within one second).
pub fn signing_key(auth: &AuthConfig, now_seconds: u64) -> String {
    match auth.secret.as_deref() {
        Some(secret) if !secret.trim().is_empty() => secret.to_string(),
        _ => {
            let digits = now_seconds.to_string();
            digits[..digits.len().min(9)].to_string()
        }
    }
}

/// Plain digests run over `canonical || key` and render hex; HMAC variants
/// key the MAC and render base64.
pub fn compute_signature(
    algorithm: SignatureAlgorithm,
    canonical: &str,
    key: &str,
) -> Result<String, EngineError> {
    let out = match algorithm {
        SignatureAlgorithm::Md5 => hex::encode(Md5::digest(suffixed(canonical, key))),
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(suffixed(canonical, key))),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(suffixed(canonical, key))),
        SignatureAlgorithm::HmacMd5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(key.as_bytes())
                .map_err(|e| EngineError::Signature(format!("bad hmac key: {}", e)))?;
            mac.update(canonical.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
                .map_err(|e| EngineError::Signature(format!("bad hmac key: {}", e)))?;
            mac.update(canonical.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
                .map_err(|e| EngineError::Signature(format!("bad hmac key: {}", e)))?;
            mac.update(canonical.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
    };
    Ok(out)
}

fn suffixed(canonical: &str, key: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(canonical.len() + key.len());
    bytes.extend_from_slice(canonical.as_bytes());
    bytes.extend_from_slice(key.as_bytes());
    bytes
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
