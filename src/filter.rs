use serde::Serialize;

use crate::calc::CalcError;
use crate::model::{EntityId, Grade, Student, Subject, Teacher};

/// Conjunctive record filters. `None` (or an empty string) leaves a
/// criterion inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilters {
    pub student_id: Option<EntityId>,
    pub subject_id: Option<EntityId>,
    pub class_name: Option<String>,
    pub name_contains: Option<String>,
    pub quarter: Option<u8>,
}

/// Fields a record exposes to the filter engine. A record that lacks a field
/// never satisfies an active predicate on it.
pub trait Filterable {
    fn student_id(&self) -> Option<EntityId> {
        None
    }
    fn subject_id(&self) -> Option<EntityId> {
        None
    }
    fn class_name(&self) -> Option<&str> {
        None
    }
    fn name(&self) -> Option<&str> {
        None
    }
    fn quarter(&self) -> Option<u8> {
        None
    }
}

impl Filterable for Student {
    fn student_id(&self) -> Option<EntityId> {
        Some(self.id)
    }
    fn class_name(&self) -> Option<&str> {
        Some(&self.class_name)
    }
    fn name(&self) -> Option<&str> {
        Some(&self.full_name)
    }
}

impl Filterable for Grade {
    fn student_id(&self) -> Option<EntityId> {
        Some(Grade::student_id(self))
    }
    fn subject_id(&self) -> Option<EntityId> {
        Some(Grade::subject_id(self))
    }
    fn quarter(&self) -> Option<u8> {
        Some(Grade::quarter(self))
    }
}

impl Filterable for Teacher {
    fn name(&self) -> Option<&str> {
        Some(&self.full_name)
    }
}

impl Filterable for Subject {
    fn subject_id(&self) -> Option<EntityId> {
        Some(self.id)
    }
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl RecordFilters {
    pub fn is_empty(&self) -> bool {
        self.student_id.is_none()
            && self.subject_id.is_none()
            && self.class_name.is_none()
            && self.name_contains.is_none()
            && self.quarter.is_none()
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        let id_ok = |want: Option<EntityId>, have: Option<EntityId>| {
            want.map(|w| have == Some(w)).unwrap_or(true)
        };
        if !id_ok(self.student_id, record.student_id()) {
            return false;
        }
        if !id_ok(self.subject_id, record.subject_id()) {
            return false;
        }
        if let Some(class_name) = &self.class_name {
            if record.class_name() != Some(class_name.as_str()) {
                return false;
            }
        }
        if let Some(q) = self.quarter {
            if record.quarter() != Some(q) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            let Some(name) = record.name() else {
                return false;
            };
            if !name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Stable filter: the result keeps the relative order of `records`, which is
/// never modified.
pub fn filter_records<T: Filterable + Clone>(records: &[T], filters: &RecordFilters) -> Vec<T> {
    if filters.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| filters.matches(*r))
        .cloned()
        .collect()
}

fn optional_id(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<EntityId>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| CalcError::bad_params(format!("filters.{key} must be an integer id or null"))),
    }
}

fn optional_text(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<String>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalcError::bad_params(format!(
                    "filters.{key} must be string or null"
                )));
            };
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
    }
}

pub fn parse_record_filters(raw: Option<&serde_json::Value>) -> Result<RecordFilters, CalcError> {
    let Some(raw) = raw else {
        return Ok(RecordFilters::default());
    };
    if raw.is_null() {
        return Ok(RecordFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::bad_params("filters must be an object"));
    };

    let quarter = match optional_id(obj, "quarter")? {
        None => None,
        Some(q) if (1..=4).contains(&q) => Some(q as u8),
        Some(q) => {
            return Err(CalcError::validation(format!(
                "filters.quarter {q} outside 1..=4"
            )))
        }
    };

    Ok(RecordFilters {
        student_id: optional_id(obj, "studentId")?,
        subject_id: optional_id(obj, "subjectId")?,
        class_name: optional_text(obj, "className")?,
        name_contains: optional_text(obj, "search")?,
        quarter,
    })
}
