use crate::ipc::error::{controller_err, ok};
use crate::ipc::helpers::{opt_param_str, param_str, require_workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let c = &state.controller;
    // Counts let the UI show a dashboard without fetching every student.
    let classes: Vec<serde_json::Value> = c
        .snapshot()
        .grades
        .iter()
        .map(|g| {
            let students: Vec<_> = c.students_in(&g.id).collect();
            let evaluated = students
                .iter()
                .filter(|s| s.status() == StudentStatus::Evaluated)
                .count();
            json!({
                "id": g.id,
                "name": g.name,
                "studentCount": students.len(),
                "evaluatedCount": evaluated,
            })
        })
        .collect();
    ok(&req.id, json!({ "classes": classes }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let name = match param_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.create_class(name) {
        Ok(class) => ok(&req.id, json!({ "gradeId": class.id, "name": class.name })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let grade_id = match param_str(req, "gradeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.delete_class(grade_id) {
        Ok(removed) => ok(&req.id, json!({ "removedStudents": removed })),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_classes_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade_id = opt_param_str(req, "gradeId");
    match state.controller.select_class(grade_id) {
        Ok(()) => ok(&req.id, json!({ "activeGradeId": grade_id })),
        Err(e) => controller_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "classes.select" => Some(handle_classes_select(state, req)),
        _ => None,
    }
}
