use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::calc::{CalcError, CollectionFailure};
use crate::model::{Collection, Grade, Snapshot, Student, Subject, Teacher};

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

/// Opens (and if needed creates) the workspace database.
///
/// Entity rows are owned by whatever populates the workspace; this process
/// only reads them. Grade values are deliberately not CHECK-constrained so
/// that out-of-domain rows are rejected at load time with a typed error.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            class_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            room_number TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            grade INTEGER NOT NULL,
            quarter INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

pub fn load_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare("SELECT id, full_name, class_name FROM students ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                full_name: r.get(1)?,
                class_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_teachers(conn: &Connection) -> anyhow::Result<Vec<Teacher>> {
    let mut stmt =
        conn.prepare("SELECT id, full_name, COALESCE(room_number, '') FROM teachers ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Teacher {
                id: r.get(0)?,
                full_name: r.get(1)?,
                room_number: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Outer error is a query failure; inner is a row outside the grade domain.
pub fn load_grades(conn: &Connection) -> anyhow::Result<Result<Vec<Grade>, CalcError>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, subject_id, grade, quarter FROM grades ORDER BY id",
    )?;
    let rows: Vec<(i64, i64, i64, i64, i64)> = stmt
        .query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, student_id, subject_id, value, quarter)| {
            Grade::new(id, student_id, subject_id, value, quarter)
        })
        .collect())
}

/// Synchronous snapshot read used by one-shot IPC requests. A collection
/// that cannot be queried fails the whole read, as in `store::fetch_snapshot`.
pub fn load_snapshot(conn: &Connection) -> Result<Snapshot, CalcError> {
    let mut failures = Vec::new();
    let mut failed = |collection: Collection, e: anyhow::Error| {
        failures.push(CollectionFailure {
            collection,
            message: e.to_string(),
        });
    };
    let students = load_students(conn).map_err(|e| failed(Collection::Students, e)).ok();
    let teachers = load_teachers(conn).map_err(|e| failed(Collection::Teachers, e)).ok();
    let subjects = load_subjects(conn).map_err(|e| failed(Collection::Subjects, e)).ok();
    let grades = load_grades(conn).map_err(|e| failed(Collection::Grades, e)).ok();

    match (students, teachers, subjects, grades) {
        (Some(students), Some(teachers), Some(subjects), Some(grades)) => {
            Ok(Snapshot::new(students, teachers, subjects, grades?))
        }
        _ => Err(CalcError::IncompleteSnapshot { failures }),
    }
}
