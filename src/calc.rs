use serde::{Serialize, Serializer};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::model::{Collection, EntityId, Snapshot};

pub const DEFAULT_PASS_THRESHOLD: f64 = 3.0;

/// 2-decimal display rounding: `Int(100*x + 0.5) / 100`.
/// Averages are carried at full precision and only rounded on output.
pub fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

fn serialize_rounded<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_off_2_decimal(*v))
}

fn serialize_rounded_opt<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(x) => s.serialize_some(&round_off_2_decimal(*x)),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFailure {
    pub collection: Collection,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum CalcError {
    #[error("{0}")]
    Validation(String),
    #[error("incomplete snapshot: {} failed to load", failed_names(.failures))]
    IncompleteSnapshot { failures: Vec<CollectionFailure> },
    #[error("no subject attribution configured for teacher(s) {teacher_ids:?}")]
    AmbiguousAttribution { teacher_ids: Vec<EntityId> },
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    Store(String),
}

fn failed_names(failures: &[CollectionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.collection.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CalcError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            CalcError::Validation(_) => "validation_failed",
            CalcError::IncompleteSnapshot { .. } => "incomplete_snapshot",
            CalcError::AmbiguousAttribution { .. } => "ambiguous_attribution",
            CalcError::BadParams(_) => "bad_params",
            CalcError::Store(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CalcError::IncompleteSnapshot { failures } => Some(json!({ "failed": failures })),
            CalcError::AmbiguousAttribution { teacher_ids } => {
                Some(json!({ "teacherIds": teacher_ids }))
            }
            _ => None,
        }
    }
}

/// Running arithmetic mean over integer grade values. Integer sums keep
/// repeated runs over the same snapshot bit-identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mean {
    sum: u64,
    count: u64,
}

impl Mean {
    pub fn push(&mut self, value: u8) {
        self.sum += u64::from(value);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` for an empty group: no data is not zero.
    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

/// Teacher id → subject names that teacher is credited with.
pub type TeacherSubjectMap = BTreeMap<EntityId, BTreeSet<String>>;

pub fn parse_teacher_subjects(raw: &serde_json::Value) -> Result<TeacherSubjectMap, CalcError> {
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::bad_params(
            "teacherSubjects must be an object of teacherId -> [subject names]",
        ));
    };
    let mut out = TeacherSubjectMap::new();
    for (key, names) in obj {
        let Ok(teacher_id) = key.trim().parse::<EntityId>() else {
            return Err(CalcError::bad_params(format!(
                "teacherSubjects key '{key}' is not a teacher id"
            )));
        };
        let Some(arr) = names.as_array() else {
            return Err(CalcError::bad_params(format!(
                "teacherSubjects.{key} must be an array of subject names"
            )));
        };
        let mut set = BTreeSet::new();
        for v in arr {
            let Some(name) = v.as_str() else {
                return Err(CalcError::bad_params(format!(
                    "teacherSubjects.{key} must contain only strings"
                )));
            };
            let t = name.trim();
            if !t.is_empty() {
                set.insert(t.to_string());
            }
        }
        out.insert(teacher_id, set);
    }
    Ok(out)
}

pub fn parse_threshold(raw: Option<&serde_json::Value>) -> Result<Option<f64>, CalcError> {
    match raw {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(t) = v.as_f64() else {
                return Err(CalcError::bad_params("threshold must be a number"));
            };
            check_threshold(t)?;
            Ok(Some(t))
        }
    }
}

pub fn check_threshold(t: f64) -> Result<(), CalcError> {
    if t.is_finite() {
        Ok(())
    } else {
        Err(CalcError::validation("pass threshold must be a finite number"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassSubjectKey {
    pub class_name: String,
    pub subject_id: EntityId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAverage {
    pub subject_name: String,
    pub average: f64,
    pub grade_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectAverageRow {
    pub class_name: String,
    pub subject_id: EntityId,
    pub subject_name: String,
    #[serde(serialize_with = "serialize_rounded")]
    pub average: f64,
    pub grade_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRanking {
    pub class_name: String,
    #[serde(serialize_with = "serialize_rounded")]
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassExtremes {
    pub top_class: Option<ClassRanking>,
    pub worst_class: Option<ClassRanking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRanking {
    pub teacher_id: EntityId,
    pub teacher_name: String,
    #[serde(serialize_with = "serialize_rounded")]
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherExtremes {
    pub best_teacher: Option<TeacherRanking>,
    pub worst_teacher: Option<TeacherRanking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPerformancePoint {
    pub name: String,
    #[serde(serialize_with = "serialize_rounded")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingEntry {
    pub subject_id: EntityId,
    /// `None` when the grade points at a subject id missing from the
    /// snapshot; the entry is still reported.
    pub subject_name: Option<String>,
    pub quarter: u8,
    #[serde(serialize_with = "serialize_rounded")]
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingStudent {
    pub student_id: EntityId,
    pub full_name: String,
    pub class_name: String,
    pub entries: Vec<FailingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub students_count: usize,
    pub teachers_count: usize,
    pub subjects_count: usize,
    pub grades_count: usize,
    #[serde(serialize_with = "serialize_rounded_opt")]
    pub average_grade: Option<f64>,
}

/// Everything one refresh cycle publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub overview: Overview,
    pub class_subject_averages: Vec<ClassSubjectAverageRow>,
    pub class_performance: Vec<ClassPerformancePoint>,
    pub class_extremes: ClassExtremes,
    pub failing_students: Vec<FailingStudent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_extremes: Option<TeacherExtremes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub pass_threshold: f64,
    /// Teacher ranking is only computed when an attribution is configured.
    pub teacher_subjects: Option<TeacherSubjectMap>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            teacher_subjects: None,
        }
    }
}

// First row wins when a student or subject id repeats.
fn class_by_student(snap: &Snapshot) -> HashMap<EntityId, &str> {
    let mut out = HashMap::new();
    for s in snap.students() {
        out.entry(s.id).or_insert(s.class_name.as_str());
    }
    out
}

fn subject_names(snap: &Snapshot) -> HashMap<EntityId, &str> {
    snap.subjects()
        .iter()
        .map(|s| (s.id, s.name.as_str()))
        .collect()
}

pub fn compute_class_subject_averages(snap: &Snapshot) -> BTreeMap<ClassSubjectKey, SubjectAverage> {
    let classes = class_by_student(snap);
    let subjects = subject_names(snap);

    let mut groups: BTreeMap<ClassSubjectKey, (&str, Mean)> = BTreeMap::new();
    for g in snap.grades() {
        let Some(class_name) = classes.get(&g.student_id()) else {
            continue;
        };
        let Some(subject_name) = subjects.get(&g.subject_id()) else {
            continue;
        };
        let key = ClassSubjectKey {
            class_name: (*class_name).to_string(),
            subject_id: g.subject_id(),
        };
        groups
            .entry(key)
            .or_insert((subject_name, Mean::default()))
            .1
            .push(g.value());
    }

    groups
        .into_iter()
        .filter_map(|(key, (subject_name, mean))| {
            let average = mean.value()?;
            Some((
                key,
                SubjectAverage {
                    subject_name: subject_name.to_string(),
                    average,
                    grade_count: mean.count(),
                },
            ))
        })
        .collect()
}

pub fn class_subject_rows(
    averages: &BTreeMap<ClassSubjectKey, SubjectAverage>,
) -> Vec<ClassSubjectAverageRow> {
    averages
        .iter()
        .map(|(key, avg)| ClassSubjectAverageRow {
            class_name: key.class_name.clone(),
            subject_id: key.subject_id,
            subject_name: avg.subject_name.clone(),
            average: avg.average,
            grade_count: avg.grade_count,
        })
        .collect()
}

/// Grand mean of every grade held by a student of each class, keyed by
/// class name. Classes without grades do not appear.
fn class_means(snap: &Snapshot) -> BTreeMap<String, Mean> {
    let classes = class_by_student(snap);
    let mut out: BTreeMap<String, Mean> = BTreeMap::new();
    for g in snap.grades() {
        let Some(class_name) = classes.get(&g.student_id()) else {
            continue;
        };
        out.entry((*class_name).to_string())
            .or_default()
            .push(g.value());
    }
    out
}

/// (class name, overall average) pairs in ascending class-name order.
pub fn compute_class_performance(snap: &Snapshot) -> impl Iterator<Item = (String, f64)> {
    class_means(snap)
        .into_iter()
        .filter_map(|(name, mean)| mean.value().map(|v| (name, v)))
}

/// Ties: "best" goes to the first class name in sort order, "worst" to the
/// last.
pub fn compute_class_extremes(snap: &Snapshot) -> ClassExtremes {
    let mut top: Option<(String, f64)> = None;
    let mut worst: Option<(String, f64)> = None;

    for (name, avg) in compute_class_performance(snap) {
        if top.as_ref().map(|(_, best)| avg > *best).unwrap_or(true) {
            top = Some((name.clone(), avg));
        }
        if worst.as_ref().map(|(_, low)| avg <= *low).unwrap_or(true) {
            worst = Some((name, avg));
        }
    }

    ClassExtremes {
        top_class: top.map(|(class_name, average)| ClassRanking {
            class_name,
            average,
        }),
        worst_class: worst.map(|(class_name, average)| ClassRanking {
            class_name,
            average,
        }),
    }
}

/// Ranks teachers by the mean of every grade in a subject they are credited
/// with. Every teacher in the snapshot must have an entry in `assignments`;
/// attribution is never guessed. Ties: best goes to the lowest teacher id,
/// worst to the highest.
pub fn compute_teacher_extremes(
    snap: &Snapshot,
    assignments: &TeacherSubjectMap,
) -> Result<TeacherExtremes, CalcError> {
    let mut teachers: BTreeMap<EntityId, &str> = BTreeMap::new();
    for t in snap.teachers() {
        teachers.entry(t.id).or_insert(t.full_name.as_str());
    }

    let missing: Vec<EntityId> = teachers
        .keys()
        .filter(|id| !assignments.contains_key(id))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CalcError::AmbiguousAttribution {
            teacher_ids: missing,
        });
    }

    let mut means_by_subject_id: HashMap<EntityId, Mean> = HashMap::new();
    for g in snap.grades() {
        means_by_subject_id
            .entry(g.subject_id())
            .or_default()
            .push(g.value());
    }

    let mut best: Option<TeacherRanking> = None;
    let mut worst: Option<TeacherRanking> = None;

    for (teacher_id, teacher_name) in &teachers {
        let names = &assignments[teacher_id];
        let mut total = Mean::default();
        for subject in snap.subjects() {
            if !names.contains(&subject.name) {
                continue;
            }
            if let Some(m) = means_by_subject_id.get(&subject.id) {
                total.sum += m.sum;
                total.count += m.count;
            }
        }
        let Some(average) = total.value() else {
            tracing::debug!(teacher_id, "no grades attributable to teacher");
            continue;
        };
        let ranking = TeacherRanking {
            teacher_id: *teacher_id,
            teacher_name: (*teacher_name).to_string(),
            average,
        };
        if best.as_ref().map(|b| average > b.average).unwrap_or(true) {
            best = Some(ranking.clone());
        }
        if worst.as_ref().map(|w| average <= w.average).unwrap_or(true) {
            worst = Some(ranking);
        }
    }

    Ok(TeacherExtremes {
        best_teacher: best,
        worst_teacher: worst,
    })
}

/// Students with at least one (subject, quarter) average strictly below
/// `threshold`, in snapshot order. Only the failing entries are listed.
pub fn compute_failing_students(
    snap: &Snapshot,
    threshold: f64,
) -> Result<Vec<FailingStudent>, CalcError> {
    check_threshold(threshold)?;
    let subjects = subject_names(snap);

    let mut per_student: HashMap<EntityId, BTreeMap<(EntityId, u8), Mean>> = HashMap::new();
    for g in snap.grades() {
        per_student
            .entry(g.student_id())
            .or_default()
            .entry((g.subject_id(), g.quarter()))
            .or_default()
            .push(g.value());
    }

    let mut seen: HashSet<EntityId> = HashSet::new();
    let mut out = Vec::new();
    for s in snap.students() {
        if !seen.insert(s.id) {
            continue;
        }
        let Some(groups) = per_student.get(&s.id) else {
            continue;
        };
        let mut entries: Vec<FailingEntry> = groups
            .iter()
            .filter_map(|((subject_id, quarter), mean)| {
                let average = mean.value()?;
                if average >= threshold {
                    return None;
                }
                Some(FailingEntry {
                    subject_id: *subject_id,
                    subject_name: subjects.get(subject_id).map(|n| (*n).to_string()),
                    quarter: *quarter,
                    average,
                })
            })
            .collect();
        if entries.is_empty() {
            continue;
        }
        // Unknown subjects sort after named ones.
        entries.sort_by(|a, b| {
            a.subject_name
                .is_none()
                .cmp(&b.subject_name.is_none())
                .then_with(|| a.subject_name.cmp(&b.subject_name))
                .then(a.subject_id.cmp(&b.subject_id))
                .then(a.quarter.cmp(&b.quarter))
        });
        out.push(FailingStudent {
            student_id: s.id,
            full_name: s.full_name.clone(),
            class_name: s.class_name.clone(),
            entries,
        });
    }
    Ok(out)
}

pub fn compute_overview(snap: &Snapshot) -> Overview {
    let mut all = Mean::default();
    for g in snap.grades() {
        all.push(g.value());
    }
    Overview {
        students_count: snap.students().len(),
        teachers_count: snap.teachers().len(),
        subjects_count: snap.subjects().len(),
        grades_count: snap.grades().len(),
        average_grade: all.value(),
    }
}

pub fn compute_stats_report(
    snap: &Snapshot,
    opts: &ReportOptions,
) -> Result<StatsReport, CalcError> {
    let teacher_extremes = match &opts.teacher_subjects {
        Some(map) => Some(compute_teacher_extremes(snap, map)?),
        None => None,
    };
    Ok(StatsReport {
        overview: compute_overview(snap),
        class_subject_averages: class_subject_rows(&compute_class_subject_averages(snap)),
        class_performance: compute_class_performance(snap)
            .map(|(name, value)| ClassPerformancePoint { name, value })
            .collect(),
        class_extremes: compute_class_extremes(snap),
        failing_students: compute_failing_students(snap, opts.pass_threshold)?,
        teacher_extremes,
    })
}
