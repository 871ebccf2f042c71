use crate::chart;
use crate::imaging;
use crate::ipc::error::{controller_err, err, ok};
use crate::ipc::helpers::{opt_param_str, param_str, require_workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{Evaluation, Student};
use crate::state::{AnalysisOutcome, Controller};
use serde_json::json;
use tracing::warn;

fn student_summary(c: &Controller, s: &Student) -> serde_json::Value {
    json!({
        "id": s.id,
        "name": s.name,
        "gradeId": s.grade_id,
        "status": s.status(),
        "hasImage": s.work_image.is_some(),
        "overallScore": s.current_evaluation().map(|e| e.overall_score),
        "analysisPending": c.session().is_pending(&s.id),
        "selectedForComparison": c.session().comparison.contains(&s.id),
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let c = &state.controller;
    let grade_id = opt_param_str(req, "gradeId");
    let students: Vec<serde_json::Value> = c
        .snapshot()
        .students
        .iter()
        .filter(|s| grade_id.map(|g| s.grade_id == g).unwrap_or(true))
        .map(|s| student_summary(c, s))
        .collect();
    ok(&req.id, json!({ "students": students }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let c = &state.controller;
    let student = match c.get_student(student_id) {
        Ok(s) => s,
        Err(e) => return controller_err(&req.id, &e),
    };
    ok(
        &req.id,
        json!({
            "student": student,
            "status": student.status(),
            "gradeName": c.grade_name_or_unknown(&student.grade_id),
            "radar": student.current_evaluation().map(chart::radar),
        }),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let grade_id = match param_str(req, "gradeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match param_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.create_student(grade_id, name) {
        Ok(s) => ok(&req.id, json!({ "studentId": s.id, "name": s.name, "gradeId": s.grade_id })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_students_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = opt_param_str(req, "studentId");
    match state.controller.select_student(student_id) {
        Ok(()) => ok(&req.id, json!({ "activeStudentId": student_id })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn read_image_param(req: &Request) -> Result<Vec<u8>, serde_json::Value> {
    if let Some(data) = opt_param_str(req, "imageData") {
        return imaging::decode_data_url(data)
            .map(|(_, bytes)| bytes)
            .map_err(|e| {
                warn!(error = %e, "image payload rejected");
                err(&req.id, "image_decode_failed", format!("{e:#}"), None)
            });
    }
    if let Some(path) = opt_param_str(req, "imagePath") {
        return std::fs::read(path).map_err(|e| {
            err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        });
    }
    Err(err(
        &req.id,
        "bad_params",
        "missing imageData or imagePath",
        None,
    ))
}

fn handle_students_attach_image(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let bytes = match read_image_param(req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let opts = state.normalize;
    match state.controller.attach_image(student_id, &bytes, opts) {
        Ok(status) => ok(&req.id, json!({ "studentId": student_id, "status": status })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_students_attach_evaluation(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let evaluation: Evaluation = match req
        .params
        .get("evaluation")
        .cloned()
        .map(serde_json::from_value)
    {
        Some(Ok(ev)) => ev,
        Some(Err(e)) => return err(&req.id, "bad_params", format!("invalid evaluation: {e}"), None),
        None => return err(&req.id, "bad_params", "missing evaluation", None),
    };
    match state.controller.attach_evaluation(student_id, evaluation) {
        Ok(status) => ok(&req.id, json!({ "studentId": student_id, "status": status })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_students_analyze(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(evaluator) = state.evaluator.as_deref() else {
        return err(
            &req.id,
            "evaluator_unavailable",
            "configure GEMINI_API_KEY or an evaluation fixture",
            None,
        );
    };
    match state.controller.analyze(student_id, evaluator) {
        Ok(AnalysisOutcome::Applied(ev)) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "applied": true,
                "evaluation": ev,
                "radar": chart::radar(&ev),
            }),
        ),
        Ok(AnalysisOutcome::Stale) => ok(&req.id, json!({ "studentId": student_id, "applied": false })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_students_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.archive_student(student_id) {
        Ok(Some(report)) => ok(&req.id, json!({ "archived": true, "reportId": report.id })),
        Ok(None) => ok(&req.id, json!({ "archived": false })),
        Err(e) => controller_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.select" => Some(handle_students_select(state, req)),
        "students.attachImage" => Some(handle_students_attach_image(state, req)),
        "students.attachEvaluation" => Some(handle_students_attach_evaluation(state, req)),
        "students.analyze" => Some(handle_students_analyze(state, req)),
        "students.archive" => Some(handle_students_archive(state, req)),
        _ => None,
    }
}
