use crate::filter::{self, RecordFilters};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{request_snapshot, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Collection;
use serde::Serialize;
use serde_json::json;

fn filtered<T: filter::Filterable + Clone + Serialize>(
    records: &[T],
    filters: &RecordFilters,
) -> serde_json::Value {
    let out = filter::filter_records(records, filters);
    json!({
        "total": records.len(),
        "count": out.len(),
        "records": out,
    })
}

fn handle_records_filter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(collection) = Collection::parse(&kind) else {
        return err(
            &req.id,
            "bad_params",
            "kind must be one of students, teachers, subjects, grades",
            Some(json!({ "kind": kind })),
        );
    };
    let filters = match filter::parse_record_filters(req.params.get("filters")) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, &e),
    };
    let snap = match request_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut result = match collection {
        Collection::Students => filtered(snap.students(), &filters),
        Collection::Teachers => filtered(snap.teachers(), &filters),
        Collection::Subjects => filtered(snap.subjects(), &filters),
        Collection::Grades => filtered(snap.grades(), &filters),
    };
    result["kind"] = json!(collection.as_str());
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.filter" => Some(handle_records_filter(state, req)),
        _ => None,
    }
}
