use crate::backup;
use crate::ipc::error::{controller_err, err, ok};
use crate::ipc::helpers::{opt_param_str, param_str, require_workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

fn handle_export_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "document": state.controller.export_document() }),
    )
}

fn handle_export_write(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match param_str(req, "dir") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let doc = state.controller.export_document();
    match backup::export_snapshot(&doc, Path::new(dir)) {
        Ok(summary) => {
            info!(path = %summary.path.display(), bytes = summary.byte_len, "backup exported");
            ok(
                &req.id,
                json!({
                    "path": summary.path.to_string_lossy(),
                    "bytes": summary.byte_len,
                }),
            )
        }
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

fn handle_import_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let confirmed = req
        .params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // `document` is either the parsed object or the raw file text.
    let text = if let Some(doc) = req.params.get("document").filter(|v| !v.is_null()) {
        match doc.as_str() {
            Some(raw) => raw.to_string(),
            None => doc.to_string(),
        }
    } else if let Some(path) = opt_param_str(req, "path") {
        match backup::read_backup(Path::new(path)) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "backup file unreadable");
                return err(&req.id, "import_parse_failed", format!("{e:#}"), None);
            }
        }
    } else {
        return err(&req.id, "bad_params", "missing path or document", None);
    };

    match state.controller.import_document(&text, confirmed) {
        Ok(()) => {
            let snap = state.controller.snapshot();
            ok(
                &req.id,
                json!({
                    "classCount": snap.grades.len(),
                    "studentCount": snap.students.len(),
                    "reportCount": snap.saved_reports.len(),
                }),
            )
        }
        Err(e) => controller_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.get" => Some(handle_export_get(state, req)),
        "export.write" => Some(handle_export_write(state, req)),
        "import.apply" => Some(handle_import_apply(state, req)),
        _ => None,
    }
}
