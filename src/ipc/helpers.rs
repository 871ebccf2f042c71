use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

/// Mutations need a loaded workspace so they are never lost to a store-less session.
pub fn require_workspace(state: &AppState, req: &Request) -> Result<(), serde_json::Value> {
    if state.workspace.is_none() || !state.controller.is_loaded() {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    }
    Ok(())
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

pub fn opt_param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}
