use serde_json::json;

use crate::calc::CalcError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error object as it appears inside responses and refresh events.
pub fn calc_error_body(e: &CalcError) -> serde_json::Value {
    let mut error = json!({
        "code": e.code(),
        "message": e.to_string(),
    });
    if let Some(d) = e.details() {
        error["details"] = d;
    }
    error
}

pub fn calc_err(id: &str, e: &CalcError) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": calc_error_body(e),
    })
}
