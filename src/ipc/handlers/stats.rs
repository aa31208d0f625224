use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::helpers::{calc_result, request_config, request_snapshot};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::collections::BTreeMap;

fn handle_class_subject_averages(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = calc::class_subject_rows(&calc::compute_class_subject_averages(&snap));

    let mut by_class: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for r in &rows {
        by_class.entry(r.class_name.clone()).or_default().push(json!({
            "subjectId": r.subject_id,
            "subjectName": r.subject_name,
            "average": calc::round_off_2_decimal(r.average),
        }));
    }
    ok(&req.id, json!({ "rows": rows, "byClass": by_class }))
}

fn handle_class_extremes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!(calc::compute_class_extremes(&snap)))
}

fn handle_class_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let series: Vec<calc::ClassPerformancePoint> = calc::compute_class_performance(&snap)
        .map(|(name, value)| calc::ClassPerformancePoint { name, value })
        .collect();
    ok(&req.id, json!({ "series": series }))
}

fn handle_teacher_extremes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cfg = match request_config(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    // No configured attribution at all is the same as none for every teacher.
    let assignments = cfg.teacher_subjects.unwrap_or_default();
    calc_result(req, calc::compute_teacher_extremes(&snap, &assignments))
}

fn handle_failing_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cfg = match request_config(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    calc_result(
        req,
        calc::compute_failing_students(&snap, cfg.pass_threshold).map(|students| {
            json!({
                "threshold": cfg.pass_threshold,
                "students": students,
            })
        }),
    )
}

fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!(calc::compute_overview(&snap)))
}

fn handle_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cfg = match request_config(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    calc_result(req, calc::compute_stats_report(&snap, &cfg.report_options()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.classSubjectAverages" => Some(handle_class_subject_averages(state, req)),
        "stats.classExtremes" => Some(handle_class_extremes(state, req)),
        "stats.classPerformance" => Some(handle_class_performance(state, req)),
        "stats.teacherExtremes" => Some(handle_teacher_extremes(state, req)),
        "stats.failingStudents" => Some(handle_failing_students(state, req)),
        "stats.overview" => Some(handle_overview(state, req)),
        "stats.report" => Some(handle_report(state, req)),
        _ => None,
    }
}
