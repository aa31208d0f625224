use crate::config::EngineConfig;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match EngineConfig::load(conn) {
        Ok(cfg) => ok(&req.id, json!(cfg)),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut cfg = match EngineConfig::load(conn) {
        Ok(cfg) => cfg,
        Err(e) => return calc_err(&req.id, &e),
    };
    if let Err(e) = cfg.apply(&req.params) {
        return calc_err(&req.id, &e);
    }
    if let Err(e) = cfg.save(conn) {
        return calc_err(&req.id, &e);
    }
    tracing::info!(
        pass_threshold = cfg.pass_threshold,
        refresh_interval_ms = cfg.refresh_interval_ms,
        "settings updated"
    );
    ok(&req.id, json!(cfg))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
