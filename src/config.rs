use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::calc::{self, CalcError, ReportOptions, TeacherSubjectMap, DEFAULT_PASS_THRESHOLD};
use crate::db;

pub const KEY_PASS_THRESHOLD: &str = "stats.pass_threshold";
pub const KEY_REFRESH_INTERVAL_MS: &str = "stats.refresh_interval_ms";
pub const KEY_TEACHER_SUBJECTS: &str = "stats.teacher_subjects";

/// Poll interval of the analytics dashboard.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 35_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub pass_threshold: f64,
    pub refresh_interval_ms: u64,
    pub teacher_subjects: Option<TeacherSubjectMap>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            teacher_subjects: None,
        }
    }
}

impl EngineConfig {
    /// Stored settings over defaults. A workspace without settings rows gets
    /// the defaults.
    pub fn load(conn: &Connection) -> Result<Self, CalcError> {
        let get = |key: &str| {
            db::settings_get_json(conn, key).map_err(|e| CalcError::Store(e.to_string()))
        };
        let mut cfg = EngineConfig::default();
        cfg.apply(&json!({
            "passThreshold": get(KEY_PASS_THRESHOLD)?,
            "refreshIntervalMs": get(KEY_REFRESH_INTERVAL_MS)?,
            "teacherSubjects": get(KEY_TEACHER_SUBJECTS)?,
        }))?;
        Ok(cfg)
    }

    /// Overlays the camelCase keys present in `raw`. Used both for stored
    /// settings and for per-request overrides. A null scalar leaves the value
    /// as it is; `teacherSubjects: null` clears the attribution.
    pub fn apply(&mut self, raw: &serde_json::Value) -> Result<(), CalcError> {
        let given = |key: &str| raw.get(key).filter(|v| !v.is_null());
        if let Some(t) = calc::parse_threshold(given("passThreshold").or(given("threshold")))? {
            self.pass_threshold = t;
        }
        if let Some(ms) = parse_interval(given("refreshIntervalMs").or(given("intervalMs")))? {
            self.refresh_interval_ms = ms;
        }
        match raw.get("teacherSubjects") {
            None => {}
            Some(v) if v.is_null() => self.teacher_subjects = None,
            Some(v) => self.teacher_subjects = Some(calc::parse_teacher_subjects(v)?),
        }
        Ok(())
    }

    pub fn save(&self, conn: &Connection) -> Result<(), CalcError> {
        let store_err = |e: anyhow::Error| CalcError::Store(e.to_string());
        db::settings_set_json(conn, KEY_PASS_THRESHOLD, &json!(self.pass_threshold))
            .map_err(store_err)?;
        db::settings_set_json(conn, KEY_REFRESH_INTERVAL_MS, &json!(self.refresh_interval_ms))
            .map_err(store_err)?;
        match &self.teacher_subjects {
            Some(map) => {
                let obj: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(id, names)| (id.to_string(), json!(names)))
                    .collect();
                db::settings_set_json(conn, KEY_TEACHER_SUBJECTS, &serde_json::Value::Object(obj))
                    .map_err(store_err)?;
            }
            None => db::settings_delete(conn, KEY_TEACHER_SUBJECTS).map_err(store_err)?,
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            pass_threshold: self.pass_threshold,
            teacher_subjects: self.teacher_subjects.clone(),
        }
    }
}

fn parse_interval(raw: Option<&serde_json::Value>) -> Result<Option<u64>, CalcError> {
    match raw {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_u64() {
            Some(ms) if ms > 0 => Ok(Some(ms)),
            _ => Err(CalcError::validation(
                "refresh interval must be a positive number of milliseconds",
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gradebookd-{tag}-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn defaults_without_settings() {
        let dir = temp_workspace("cfg-defaults");
        let conn = db::open_db(&dir).expect("open db");
        let cfg = EngineConfig::load(&conn).expect("load config");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(35));
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_then_load_keeps_teacher_subjects() {
        let dir = temp_workspace("cfg-save");
        let conn = db::open_db(&dir).expect("open db");
        let mut cfg = EngineConfig::default();
        cfg.apply(&json!({
            "passThreshold": 3.5,
            "teacherSubjects": { "4": ["Math"] }
        }))
        .expect("apply");
        cfg.save(&conn).expect("save");

        let loaded = EngineConfig::load(&conn).expect("load");
        assert_eq!(loaded.pass_threshold, 3.5);
        let map = loaded.teacher_subjects.expect("teacher subjects");
        assert!(map[&4].contains("Math"));
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn null_primary_key_falls_back_to_alias() {
        let mut cfg = EngineConfig::default();
        cfg.apply(&json!({ "passThreshold": null, "threshold": 3.5 }))
            .expect("apply");
        assert_eq!(cfg.pass_threshold, 3.5);
        cfg.apply(&json!({ "refreshIntervalMs": null, "intervalMs": 1000 }))
            .expect("apply");
        assert_eq!(cfg.refresh_interval_ms, 1000);
        cfg.apply(&json!({ "passThreshold": null })).expect("apply");
        assert_eq!(cfg.pass_threshold, 3.5);
    }

    #[test]
    fn null_teacher_subjects_clears_stored_mapping() {
        let dir = temp_workspace("cfg-clear");
        let conn = db::open_db(&dir).expect("open db");
        let mut cfg = EngineConfig::default();
        cfg.apply(&json!({ "teacherSubjects": { "4": ["Math"] } }))
            .expect("apply");
        cfg.save(&conn).expect("save");
        assert!(EngineConfig::load(&conn).expect("load").teacher_subjects.is_some());

        cfg.apply(&json!({ "teacherSubjects": null })).expect("apply");
        assert_eq!(cfg.teacher_subjects, None);
        cfg.save(&conn).expect("save");
        assert!(db::settings_get_json(&conn, KEY_TEACHER_SUBJECTS)
            .expect("read setting")
            .is_none());
        assert_eq!(EngineConfig::load(&conn).expect("load").teacher_subjects, None);
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn apply_rejects_zero_interval() {
        let mut cfg = EngineConfig::default();
        let err = cfg.apply(&json!({ "intervalMs": 0 })).expect_err("zero interval");
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(cfg.refresh_interval_ms, DEFAULT_REFRESH_INTERVAL_MS);
    }
}
