use crate::db::Store;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, require_workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "evaluator": state.evaluator.as_ref().map(|e| e.kind()),
        }),
    )
}

pub fn select_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let store = Store::open(&path)?;
    state.controller.attach_store(store);
    info!(workspace = %path.display(), "workspace selected");
    state.workspace = Some(path);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match param_str(req, "path") {
        Ok(p) => PathBuf::from(p),
        Err(resp) => return resp,
    };

    match select_workspace(state, path.clone()) {
        Ok(()) => {
            let snap = state.controller.snapshot();
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "classCount": snap.grades.len(),
                    "studentCount": snap.students.len(),
                    "reportCount": snap.saved_reports.len(),
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = state.controller.session();
    ok(
        &req.id,
        json!({
            "activeGradeId": s.active_grade_id,
            "activeStudentId": s.active_student_id,
            "viewingReportId": s.viewing_report_id,
            "loading": s.loading(),
            "comparison": s.comparison,
            "showOnboarding": s.show_onboarding,
        }),
    )
}

fn handle_onboarding_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "show": state.controller.session().show_onboarding }),
    )
}

fn handle_onboarding_dismiss(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    state.controller.dismiss_onboarding();
    ok(&req.id, json!({ "show": false }))
}

fn handle_reference_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "referenceText": state.controller.snapshot().reference_text }),
    )
}

fn handle_reference_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let text = match param_str(req, "text") {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    state.controller.set_reference_text(text);
    ok(&req.id, json!({ "referenceText": text }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        "onboarding.get" => Some(handle_onboarding_get(state, req)),
        "onboarding.dismiss" => Some(handle_onboarding_dismiss(state, req)),
        "reference.get" => Some(handle_reference_get(state, req)),
        "reference.set" => Some(handle_reference_set(state, req)),
        _ => None,
    }
}
