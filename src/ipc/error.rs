use crate::state::ControllerError;
use serde_json::json;

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

pub fn controller_err(id: &str, e: &ControllerError) -> serde_json::Value {
    let details = match e {
        ControllerError::NotFound { kind, id: missing } => {
            Some(json!({ "kind": kind, "id": missing }))
        }
        _ => None,
    };
    // Evaluation failures are one opaque class for the caller; the cause is in the log.
    let message = match e {
        ControllerError::Evaluation(_) => "evaluation failed".to_string(),
        other => other.to_string(),
    };
    err(id, e.code(), message, details)
}
