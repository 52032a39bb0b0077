//! Validation rule vocabulary for parameter mappings.
//!
//! A null value passes every rule except `required`; chains stop at the
//! first failing rule with the rule's custom message or a generated default.

use crate::config::Rule;
use crate::error::EngineError;
use crate::params::plain_text;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_+&*-]+(?:\.[a-zA-Z0-9_+&*-]+)*@(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}$")
        .expect("email regex")
});

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("phone regex"));

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(25[0-5]|2[0-4]\d|[01]?\d\d?)\.(25[0-5]|2[0-4]\d|[01]?\d\d?)\.(25[0-5]|2[0-4]\d|[01]?\d\d?)\.(25[0-5]|2[0-4]\d|[01]?\d\d?)$",
    )
    .expect("ipv4 regex")
});

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?|ftp)://[^\s/$.?#].[^\s]*$").expect("url regex"));

/// Run one rule against a value. `key` is only used in messages.
pub fn check(rule: &Rule, value: Option<&Value>, key: &str) -> Result<(), EngineError> {
    let kind = normalize(&rule.rule_type)?;
    let passed = match value {
        None | Some(Value::Null) => kind != "required",
        Some(v) => check_present(&kind, rule.param.as_ref(), v)?,
    };
    if passed {
        Ok(())
    } else {
        let msg = rule
            .message
            .clone()
            .unwrap_or_else(|| default_message(key, &kind, rule.param.as_ref()));
        Err(EngineError::Validation(msg))
    }
}

fn check_present(kind: &str, param: Option<&Value>, value: &Value) -> Result<bool, EngineError> {
    let text = plain_text(value);
    let ok = match kind {
        "required" => match value {
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        },
        "number" => text.parse::<f64>().is_ok(),
        "integer" => text.parse::<i64>().is_ok(),
        "string" => value.is_string(),
        "min" => match (as_f64(value), param.and_then(as_f64)) {
            (Some(v), Some(min)) => v >= min,
            _ => false,
        },
        "max" => match (as_f64(value), param.and_then(as_f64)) {
            (Some(v), Some(max)) => v <= max,
            _ => false,
        },
        "minlength" => match (value, param.and_then(as_usize)) {
            (Value::String(s), Some(n)) => s.chars().count() >= n,
            _ => false,
        },
        "maxlength" => match (value, param.and_then(as_usize)) {
            (Value::String(s), Some(n)) => s.chars().count() <= n,
            _ => false,
        },
        "length" => match (value, param.and_then(as_usize)) {
            (Value::String(s), Some(n)) => s.chars().count() == n,
            _ => false,
        },
        "email" => EMAIL.is_match(&text),
        "phone" => PHONE.is_match(&text),
        "date" => {
            let pattern = param
                .and_then(|p| p.as_str())
                .unwrap_or("%Y-%m-%d");
            NaiveDateTime::parse_from_str(&text, pattern).is_ok()
                || NaiveDate::parse_from_str(&text, pattern).is_ok()
        }
        "boolean" => value.is_boolean() || text == "true" || text == "false",
        "enum" => match param {
            Some(Value::Array(allowed)) => allowed
                .iter()
                .any(|a| a == value || plain_text(a) == text),
            _ => false,
        },
        "pattern" => match param.and_then(|p| p.as_str()) {
            Some(p) => {
                let re = Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                    EngineError::Validation(format!("invalid pattern rule: {}", e))
                })?;
                re.is_match(&text)
            }
            None => false,
        },
        "ipv4" => IPV4.is_match(&text),
        "url" => URL.is_match(&text),
        "trim" => match value {
            Value::String(s) => s.trim() == s,
            _ => false,
        },
        _ => unreachable!("normalize rejects unknown kinds"),
    };
    Ok(ok)
}

/// Canonical lowercase rule names, absorbing the historic shorthands.
fn normalize(rule_type: &str) -> Result<String, EngineError> {
    let kind = match rule_type.to_ascii_lowercase().as_str() {
        "maxlen" => "maxlength".to_string(),
        "minlen" => "minlength".to_string(),
        "num" => "number".to_string(),
        "int" => "integer".to_string(),
        other => other.to_string(),
    };
    const KNOWN: &[&str] = &[
        "required", "number", "integer", "string", "min", "max", "minlength", "maxlength",
        "length", "email", "phone", "date", "boolean", "enum", "pattern", "ipv4", "url", "trim",
    ];
    if KNOWN.contains(&kind.as_str()) {
        Ok(kind)
    } else {
        Err(EngineError::Validation(format!(
            "unsupported validator type: {}",
            rule_type
        )))
    }
}

fn default_message(key: &str, kind: &str, param: Option<&Value>) -> String {
    let param_text = param.map(plain_text).unwrap_or_default();
    match kind {
        "required" => format!("{} is required", key),
        "number" => format!("{} must be a number", key),
        "integer" => format!("{} must be an integer", key),
        "string" => format!("{} must be a string", key),
        "min" => format!("{} must be at least {}", key, param_text),
        "max" => format!("{} must be at most {}", key, param_text),
        "minlength" => format!("{} must be at least {} characters", key, param_text),
        "maxlength" => format!("{} must be at most {} characters", key, param_text),
        "length" => format!("{} must be exactly {} characters", key, param_text),
        "email" => format!("{} must be a valid email", key),
        "phone" => format!("{} must be a valid mobile number", key),
        "date" => format!("{} must be a valid date ({})", key, if param_text.is_empty() { "%Y-%m-%d" } else { &param_text }),
        "boolean" => format!("{} must be a boolean", key),
        "enum" => format!("{} must be one of {}", key, param_text),
        "pattern" => format!("{} does not match the required pattern", key),
        "ipv4" => format!("{} must be a valid IPv4 address", key),
        "url" => format!("{} must be a valid URL", key),
        "trim" => format!("{} must not have leading or trailing whitespace", key),
        _ => format!("{} failed validation ({})", key, kind),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(kind: &str, param: Option<Value>) -> Rule {
        Rule {
            rule_type: kind.into(),
            param,
            message: None,
        }
    }

    fn passes(kind: &str, param: Option<Value>, value: Value) -> bool {
        check(&rule(kind, param), Some(&value), "f").is_ok()
    }

    #[test]
    fn null_passes_everything_but_required() {
        assert!(check(&rule("number", None), None, "f").is_ok());
        assert!(check(&rule("email", None), Some(&Value::Null), "f").is_ok());
        assert!(check(&rule("required", None), None, "f").is_err());
        assert!(check(&rule("required", None), Some(&Value::Null), "f").is_err());
    }

    #[test]
    fn required_rejects_blank_strings_only() {
        assert!(!passes("required", None, json!("   ")));
        assert!(passes("required", None, json!("x")));
        assert!(passes("required", None, json!(0)));
    }

    #[test]
    fn numeric_rules() {
        assert!(passes("number", None, json!("3.14")));
        assert!(!passes("number", None, json!("3.1.4")));
        assert!(passes("integer", None, json!("42")));
        assert!(!passes("integer", None, json!("4.2")));
        assert!(passes("min", Some(json!(1)), json!("5")));
        assert!(!passes("min", Some(json!(10)), json!(5)));
        assert!(passes("max", Some(json!(150)), json!(120)));
        assert!(!passes("max", Some(json!(100)), json!("120")));
    }

    #[test]
    fn length_rules_require_strings() {
        assert!(passes("minLength", Some(json!(2)), json!("ab")));
        assert!(!passes("minLength", Some(json!(2)), json!("a")));
        assert!(!passes("minLength", Some(json!(2)), json!(12)));
        assert!(passes("maxLength", Some(json!(3)), json!("abc")));
        assert!(!passes("maxLength", Some(json!(3)), json!("abcd")));
        assert!(passes("length", Some(json!(4)), json!("abcd")));
    }

    #[test]
    fn shorthand_names_normalize() {
        assert!(passes("maxlen", Some(json!(3)), json!("ab")));
        assert!(passes("minlen", Some(json!(1)), json!("ab")));
        assert!(passes("num", None, json!("9")));
        assert!(passes("int", None, json!("9")));
        assert!(check(&rule("bogus", None), Some(&json!(1)), "f").is_err());
    }

    #[test]
    fn format_rules() {
        assert!(passes("email", None, json!("a.b@example.com")));
        assert!(!passes("email", None, json!("not-an-email")));
        assert!(passes("phone", None, json!("13912345678")));
        assert!(!passes("phone", None, json!("12012345678")));
        assert!(passes("ipv4", None, json!("192.168.0.1")));
        assert!(!passes("ipv4", None, json!("256.1.1.1")));
        assert!(passes("url", None, json!("https://example.com/x")));
        assert!(!passes("url", None, json!("nope://")));
    }

    #[test]
    fn date_rule_is_strict() {
        assert!(passes("date", None, json!("2024-02-29")));
        assert!(!passes("date", None, json!("2023-13-01")));
        assert!(passes("date", Some(json!("%Y/%m/%d %H:%M")), json!("2024/05/01 08:30")));
        assert!(!passes("date", Some(json!("%Y/%m/%d")), json!("2024-05-01")));
    }

    #[test]
    fn enum_and_pattern_rules() {
        assert!(passes("enum", Some(json!(["a", "b"])), json!("b")));
        assert!(!passes("enum", Some(json!(["a", "b"])), json!("c")));
        // A numeric value matches its string spelling in the allowed list.
        assert!(passes("enum", Some(json!(["1", "2"])), json!(1)));
        assert!(passes("pattern", Some(json!("[a-z]+\\d")), json!("abc1")));
        assert!(!passes("pattern", Some(json!("[a-z]+\\d")), json!("abc1x")));
    }

    #[test]
    fn boolean_and_trim_rules() {
        assert!(passes("boolean", None, json!(true)));
        assert!(passes("boolean", None, json!("false")));
        assert!(!passes("boolean", None, json!("yes")));
        assert!(passes("trim", None, json!("clean")));
        assert!(!passes("trim", None, json!(" padded ")));
    }

    #[test]
    fn custom_message_wins() {
        let r = Rule {
            rule_type: "min".into(),
            param: Some(json!(1)),
            message: Some("id must be positive".into()),
        };
        let err = check(&r, Some(&json!(0)), "id").unwrap_err();
        assert_eq!(err.to_string(), "validation: id must be positive");
    }

    #[test]
    fn default_message_names_the_field() {
        let err = check(&rule("required", None), None, "username").unwrap_err();
        assert!(err.to_string().contains("username is required"));
    }
}
