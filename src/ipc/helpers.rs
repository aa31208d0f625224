use rusqlite::Connection;

use crate::calc::CalcError;
use crate::config::EngineConfig;
use crate::db;
use crate::ipc::error::{calc_err, err};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Snapshot};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Inline `params.snapshot` when given, otherwise a fresh read of the
/// workspace database.
pub fn request_snapshot(state: &AppState, req: &Request) -> Result<Snapshot, serde_json::Value> {
    match req.params.get("snapshot") {
        Some(raw) if !raw.is_null() => {
            model::parse_snapshot(raw).map_err(|e| calc_err(&req.id, &e))
        }
        _ => {
            let conn = db_conn(state, req)?;
            db::load_snapshot(conn).map_err(|e| calc_err(&req.id, &e))
        }
    }
}

/// Workspace settings (or defaults without a workspace) overlaid with any
/// per-request overrides in `params`.
pub fn request_config(state: &AppState, req: &Request) -> Result<EngineConfig, serde_json::Value> {
    let mut cfg = match state.db.as_ref() {
        Some(conn) => EngineConfig::load(conn).map_err(|e| calc_err(&req.id, &e))?,
        None => EngineConfig::default(),
    };
    cfg.apply(&req.params).map_err(|e| calc_err(&req.id, &e))?;
    Ok(cfg)
}

pub fn calc_result<T: serde::Serialize>(
    req: &Request,
    res: Result<T, CalcError>,
) -> serde_json::Value {
    match res {
        Ok(v) => match serde_json::to_value(v) {
            Ok(result) => crate::ipc::error::ok(&req.id, result),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => calc_err(&req.id, &e),
    }
}
