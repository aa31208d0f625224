mod test_support;

use serde_json::json;
use test_support::{open_workspace, spawn_sidecar, two_class_snapshot};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sidecar = spawn_sidecar();

    let health = sidecar.request_ok("1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let _workspace = open_workspace(&mut sidecar, "gradebook-router-smoke");

    let snapshot = two_class_snapshot();
    for (i, method) in [
        "stats.classSubjectAverages",
        "stats.classExtremes",
        "stats.classPerformance",
        "stats.failingStudents",
        "stats.overview",
        "stats.report",
        "settings.get",
    ]
    .iter()
    .enumerate()
    {
        let _ = sidecar.request_ok(&format!("m{i}"), method, json!({ "snapshot": snapshot }));
    }

    let _ = sidecar.request_ok(
        "f1",
        "records.filter",
        json!({ "kind": "students", "snapshot": snapshot }),
    );

    let code = sidecar.request_err("u1", "nope.method", json!({}));
    assert_eq!(code, "not_implemented");
}

#[test]
fn bad_json_line_is_reported_and_skipped() {
    let mut sidecar = spawn_sidecar();
    sidecar.send_raw("{not json");
    let bad = sidecar.next_line();
    assert_eq!(bad["ok"].as_bool(), Some(false));
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_json"));

    let reply = sidecar.request("2", "health", json!({}));
    assert_eq!(reply.get("ok").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn workspace_methods_require_a_workspace() {
    let mut sidecar = spawn_sidecar();
    assert_eq!(
        sidecar.request_err("1", "stats.overview", json!({})),
        "no_workspace"
    );
    assert_eq!(sidecar.request_err("2", "settings.get", json!({})), "no_workspace");
    assert_eq!(
        sidecar.request_err("3", "refresh.start", json!({ "intervalMs": 1000 })),
        "no_workspace"
    );
}
