use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::calc::CalcError;

pub type EntityId = i64;

pub const MIN_GRADE: i64 = 2;
pub const MAX_GRADE: i64 = 5;
pub const MIN_QUARTER: i64 = 1;
pub const MAX_QUARTER: i64 = 4;

/// The four collections a snapshot is cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Students,
    Teachers,
    Subjects,
    Grades,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Subjects => "subjects",
            Collection::Grades => "grades",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "students" => Some(Collection::Students),
            "teachers" => Some(Collection::Teachers),
            "subjects" => Some(Collection::Subjects),
            "grades" => Some(Collection::Grades),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: EntityId,
    pub full_name: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: EntityId,
    pub full_name: String,
    #[serde(default)]
    pub room_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: EntityId,
    pub name: String,
}

/// A single mark. Only constructible through [`Grade::new`], so every `Grade`
/// in a snapshot has `value` in 2..=5 and `quarter` in 1..=4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrade")]
pub struct Grade {
    id: EntityId,
    student_id: EntityId,
    subject_id: EntityId,
    #[serde(rename = "grade")]
    value: u8,
    quarter: u8,
}

/// Wire shape of a grade row before domain checks.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGrade {
    pub id: EntityId,
    pub student_id: EntityId,
    pub subject_id: EntityId,
    #[serde(alias = "value")]
    pub grade: i64,
    pub quarter: i64,
}

impl Grade {
    pub fn new(
        id: EntityId,
        student_id: EntityId,
        subject_id: EntityId,
        value: i64,
        quarter: i64,
    ) -> Result<Self, CalcError> {
        if !(MIN_GRADE..=MAX_GRADE).contains(&value) {
            return Err(CalcError::validation(format!(
                "grade {id}: value {value} outside {MIN_GRADE}..={MAX_GRADE}"
            )));
        }
        if !(MIN_QUARTER..=MAX_QUARTER).contains(&quarter) {
            return Err(CalcError::validation(format!(
                "grade {id}: quarter {quarter} outside {MIN_QUARTER}..={MAX_QUARTER}"
            )));
        }
        Ok(Self {
            id,
            student_id,
            subject_id,
            value: value as u8,
            quarter: quarter as u8,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn student_id(&self) -> EntityId {
        self.student_id
    }

    pub fn subject_id(&self) -> EntityId {
        self.subject_id
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }
}

impl TryFrom<RawGrade> for Grade {
    type Error = CalcError;

    fn try_from(raw: RawGrade) -> Result<Self, Self::Error> {
        Grade::new(raw.id, raw.student_id, raw.subject_id, raw.grade, raw.quarter)
    }
}

/// Keeps the first row for every subject id, preserving source order.
pub fn dedup_subjects(subjects: Vec<Subject>) -> Vec<Subject> {
    let mut seen: HashSet<EntityId> = HashSet::new();
    subjects
        .into_iter()
        .filter(|s| seen.insert(s.id))
        .collect()
}

/// A consistent, read-only cut of all four collections.
///
/// Subjects are deduplicated by id on construction; every computation in
/// `calc` and `filter` only ever sees the normalized list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    students: Vec<Student>,
    teachers: Vec<Teacher>,
    subjects: Vec<Subject>,
    grades: Vec<Grade>,
}

impl Snapshot {
    pub fn new(
        students: Vec<Student>,
        teachers: Vec<Teacher>,
        subjects: Vec<Subject>,
        grades: Vec<Grade>,
    ) -> Self {
        Self {
            students,
            teachers,
            subjects: dedup_subjects(subjects),
            grades,
        }
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn teachers(&self) -> &[Teacher] {
        &self.teachers
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn grades(&self) -> &[Grade] {
        &self.grades
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    teachers: Vec<Teacher>,
    #[serde(default)]
    subjects: Vec<Subject>,
    #[serde(default)]
    grades: Vec<serde_json::Value>,
}

/// Parses an inline `params.snapshot` object. Grade rows are checked one by
/// one so a domain violation surfaces as `validation_failed`, not as a
/// generic JSON error.
pub fn parse_snapshot(raw: &serde_json::Value) -> Result<Snapshot, CalcError> {
    let parsed: RawSnapshot = serde_json::from_value(raw.clone())
        .map_err(|e| CalcError::bad_params(format!("snapshot: {e}")))?;
    let mut grades = Vec::with_capacity(parsed.grades.len());
    for row in parsed.grades {
        let raw_grade: RawGrade = serde_json::from_value(row)
            .map_err(|e| CalcError::bad_params(format!("snapshot.grades: {e}")))?;
        grades.push(Grade::try_from(raw_grade)?);
    }
    Ok(Snapshot::new(
        parsed.students,
        parsed.teachers,
        parsed.subjects,
        grades,
    ))
}
