use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::calc::{CalcError, CollectionFailure};
use crate::db;
use crate::model::{Collection, Grade, Snapshot, Student, Subject, Teacher};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The collection could not be read at all (transport, I/O, query).
    #[error("{0}")]
    Unavailable(String),
    /// The collection was read but contains rows outside their domain.
    #[error("{0}")]
    Invalid(String),
}

/// Read access to the four entity collections. Each fetch may fail on its
/// own; retries are left to whoever drives the store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn students(&self) -> Result<Vec<Student>, StoreError>;
    async fn teachers(&self) -> Result<Vec<Teacher>, StoreError>;
    async fn subjects(&self) -> Result<Vec<Subject>, StoreError>;
    async fn grades(&self) -> Result<Vec<Grade>, StoreError>;
}

/// Fetches all four collections together. Any failure fails the whole
/// snapshot; an unavailable collection is never treated as empty.
pub async fn fetch_snapshot(store: &dyn EntityStore) -> Result<Snapshot, CalcError> {
    let (students, teachers, subjects, grades) = tokio::join!(
        store.students(),
        store.teachers(),
        store.subjects(),
        store.grades()
    );

    let mut failures = Vec::new();
    let mut invalid = Vec::new();
    let mut note = |collection: Collection, e: &StoreError| match e {
        StoreError::Invalid(msg) => invalid.push(msg.clone()),
        StoreError::Unavailable(msg) => failures.push(CollectionFailure {
            collection,
            message: msg.clone(),
        }),
    };
    if let Err(e) = &students {
        note(Collection::Students, e);
    }
    if let Err(e) = &teachers {
        note(Collection::Teachers, e);
    }
    if let Err(e) = &subjects {
        note(Collection::Subjects, e);
    }
    if let Err(e) = &grades {
        note(Collection::Grades, e);
    }

    if !failures.is_empty() {
        return Err(CalcError::IncompleteSnapshot { failures });
    }
    if !invalid.is_empty() {
        return Err(CalcError::validation(invalid.join("; ")));
    }

    match (students, teachers, subjects, grades) {
        (Ok(students), Ok(teachers), Ok(subjects), Ok(grades)) => {
            Ok(Snapshot::new(students, teachers, subjects, grades))
        }
        // Every error was recorded above.
        _ => Err(CalcError::Store("snapshot fetch failed".to_string())),
    }
}

/// Reads the workspace database on the blocking pool, one connection per
/// fetch so the four reads can run side by side.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn for_workspace(workspace: &Path) -> Self {
        Self {
            db_path: db::db_path(workspace),
        }
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)
                .map_err(|e| StoreError::Unavailable(format!("open {}: {e}", path.display())))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("reader task failed: {e}")))?
    }
}

fn unavailable(e: anyhow::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn students(&self) -> Result<Vec<Student>, StoreError> {
        self.read(|conn| db::load_students(conn).map_err(unavailable))
            .await
    }

    async fn teachers(&self) -> Result<Vec<Teacher>, StoreError> {
        self.read(|conn| db::load_teachers(conn).map_err(unavailable))
            .await
    }

    async fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
        self.read(|conn| db::load_subjects(conn).map_err(unavailable))
            .await
    }

    async fn grades(&self) -> Result<Vec<Grade>, StoreError> {
        self.read(|conn| {
            db::load_grades(conn)
                .map_err(unavailable)?
                .map_err(|e| StoreError::Invalid(e.to_string()))
        })
        .await
    }
}
