//! Uniform response envelopes for endpoint calls and job runs.

use serde::Serialize;
use serde_json::Value;

pub const CODE_OK: u16 = 200;
pub const CODE_FAIL: u16 = 500;

/// Envelope for a single endpoint invocation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub code: u16,
    pub success: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<i64>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        ApiResponse {
            code: CODE_OK,
            success: true,
            msg: "ok".into(),
            data: Some(data),
            total: None,
            affected_rows: None,
            generated_key: None,
        }
    }

    pub fn success_paged(data: Value, total: Option<i64>) -> Self {
        ApiResponse {
            total,
            ..Self::success(data)
        }
    }

    pub fn success_modify(affected_rows: u64, generated_key: Option<i64>) -> Self {
        ApiResponse {
            code: CODE_OK,
            success: true,
            msg: "ok".into(),
            data: None,
            total: None,
            affected_rows: Some(affected_rows),
            generated_key,
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        ApiResponse {
            code: CODE_FAIL,
            success: false,
            msg: msg.into(),
            data: None,
            total: None,
            affected_rows: None,
            generated_key: None,
        }
    }
}

/// Per-step record inside a job envelope.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_name: String,
    pub success: bool,
    pub step_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Envelope for a whole job run. A failing run still carries the step
/// records accumulated before the failure.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub success: bool,
    pub msg: String,
    pub total_time: u64,
    pub steps: Vec<StepOutcome>,
}

impl JobResponse {
    pub fn success(steps: Vec<StepOutcome>, total_time: u64) -> Self {
        JobResponse {
            success: true,
            msg: "ok".into(),
            total_time,
            steps,
        }
    }

    pub fn fail(msg: impl Into<String>, steps: Vec<StepOutcome>, total_time: u64) -> Self {
        JobResponse {
            success: false,
            msg: msg.into(),
            total_time,
            steps,
        }
    }
}
