use crate::ipc::error::{calc_err, calc_error_body, err, ok};
use crate::ipc::helpers::{request_config, required_str};
use crate::ipc::types::{AppState, Request};
use crate::refresh::{self, CycleFailure, Published, RefreshConfig};
use crate::store::SqliteStore;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn handle_refresh_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let cfg = match request_config(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let refresh_id = Uuid::new_v4().to_string();
    let store = Arc::new(SqliteStore::for_workspace(&workspace));
    let config = RefreshConfig {
        interval: cfg.refresh_interval(),
        options: cfg.report_options(),
    };

    let result_outbox = state.outbox.clone();
    let result_id = refresh_id.clone();
    let error_outbox = state.outbox.clone();
    let error_id = refresh_id.clone();

    let runtime = state.runtime.clone();
    let _guard = runtime.enter();
    let started = refresh::start_refresh(
        store,
        config,
        move |p: &Published| {
            result_outbox.send(&json!({
                "event": "refresh.result",
                "refreshId": result_id,
                "tick": p.tick,
                "at": now_rfc3339(),
                "result": &*p.report,
            }));
        },
        move |f: &CycleFailure| {
            error_outbox.send(&json!({
                "event": "refresh.error",
                "refreshId": error_id,
                "tick": f.tick,
                "at": now_rfc3339(),
                "error": calc_error_body(&f.error),
            }));
        },
    );

    match started {
        Ok(handle) => {
            tracing::info!(refresh_id = %refresh_id, workspace = %workspace.display(), "refresh registered");
            state.refreshes.insert(refresh_id.clone(), handle);
            ok(
                &req.id,
                json!({
                    "refreshId": refresh_id,
                    "intervalMs": cfg.refresh_interval_ms,
                    "threshold": cfg.pass_threshold,
                }),
            )
        }
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_refresh_stop(state: &mut AppState, req: &Request) -> serde_json::Value {
    let refresh_id = match required_str(req, "refreshId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(handle) = state.refreshes.get(&refresh_id) else {
        return err(&req.id, "not_found", "refresh not found", None);
    };
    let was_running = !handle.is_stopped();
    handle.stop();
    if was_running {
        state.retire_refresh(&refresh_id);
    }
    ok(
        &req.id,
        json!({ "refreshId": refresh_id, "stopped": true, "wasRunning": was_running }),
    )
}

fn handle_refresh_latest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let refresh_id = match required_str(req, "refreshId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(handle) = state.refreshes.get(&refresh_id) else {
        return err(&req.id, "not_found", "refresh not found", None);
    };
    let latest = handle.latest();
    ok(
        &req.id,
        json!({
            "refreshId": refresh_id,
            "stopped": handle.is_stopped(),
            "tick": latest.as_ref().map(|p| p.tick),
            "result": latest.as_ref().map(|p| &*p.report),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "refresh.start" => Some(handle_refresh_start(state, req)),
        "refresh.stop" => Some(handle_refresh_stop(state, req)),
        "refresh.latest" => Some(handle_refresh_latest(state, req)),
        _ => None,
    }
}
