use crate::ipc::error::{controller_err, ok};
use crate::ipc::helpers::{opt_param_str, param_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_compare_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.controller.toggle_comparison(student_id) {
        Ok(selected) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "selected": selected,
                "comparison": state.controller.session().comparison,
            }),
        ),
        Err(e) => controller_err(&req.id, &e),
    }
}

fn handle_compare_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "comparison": state.controller.session().comparison }),
    )
}

fn handle_compare_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.controller.clear_comparison();
    ok(&req.id, json!({ "comparison": [] }))
}

fn handle_compare_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade_id = opt_param_str(req, "gradeId");
    ok(&req.id, json!(state.controller.comparison_chart(grade_id)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "compare.toggle" => Some(handle_compare_toggle(state, req)),
        "compare.list" => Some(handle_compare_list(state, req)),
        "compare.clear" => Some(handle_compare_clear(state, req)),
        "compare.chart" => Some(handle_compare_chart(state, req)),
        _ => None,
    }
}
