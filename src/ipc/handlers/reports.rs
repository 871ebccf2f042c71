use crate::chart;
use crate::ipc::error::{controller_err, ok};
use crate::ipc::helpers::{opt_param_str, param_str, require_workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Images stay out of the list; fetch one report to get its image.
    let reports: Vec<serde_json::Value> = state
        .controller
        .snapshot()
        .saved_reports
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "studentName": r.student_name,
                "gradeName": r.grade_name,
                "timestamp": r.timestamp,
                "overallScore": r.evaluation.overall_score,
                "hasImage": r.work_image.is_some(),
            })
        })
        .collect();
    ok(&req.id, json!({ "reports": reports }))
}

fn handle_reports_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match param_str(req, "reportId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.get_report(report_id) {
        Ok(r) => ok(
            &req.id,
            json!({ "report": r, "radar": chart::radar(&r.evaluation) }),
        ),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_reports_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = opt_param_str(req, "reportId");
    match state.controller.view_report(report_id) {
        Ok(()) => ok(&req.id, json!({ "viewingReportId": report_id })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_reports_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let report_id = match param_str(req, "reportId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.delete_report(report_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => controller_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.list" => Some(handle_reports_list(state, req)),
        "reports.get" => Some(handle_reports_get(state, req)),
        "reports.view" => Some(handle_reports_view(state, req)),
        "reports.delete" => Some(handle_reports_delete(state, req)),
        _ => None,
    }
}
