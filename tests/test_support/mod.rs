#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const WAIT: Duration = Duration::from_secs(20);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running gradebookd. Output lines are pumped on a thread so tests can
/// wait with a timeout and so refresh events interleaved with responses are
/// kept aside instead of being mistaken for replies.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    events: VecDeque<serde_json::Value>,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env("GRADEBOOKD_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    Sidecar {
        child,
        stdin,
        lines: rx,
        events: VecDeque::new(),
    }
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
    }

    /// Next output line of any kind.
    pub fn next_line(&mut self) -> serde_json::Value {
        let line = self.lines.recv_timeout(WAIT).expect("sidecar output line");
        serde_json::from_str(line.trim()).expect("parse output json")
    }

    pub fn request(&mut self, id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let payload = json!({ "id": id, "method": method, "params": params });
        self.send_raw(&payload.to_string());
        loop {
            let value = self.next_line();
            if value.get("event").is_some() {
                self.events.push_back(value);
                continue;
            }
            assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
            return value;
        }
    }

    pub fn request_ok(&mut self, id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(id, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    pub fn request_err(&mut self, id: &str, method: &str, params: serde_json::Value) -> String {
        let value = self.request(id, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Next refresh event with the given name, skipping others.
    pub fn next_event(&mut self, name: &str) -> serde_json::Value {
        loop {
            let value = match self.events.pop_front() {
                Some(v) => v,
                None => self.next_line(),
            };
            if value.get("event").and_then(|v| v.as_str()) == Some(name) {
                return value;
            }
        }
    }
}

/// The two-class scenario: 9A has a single 5 in Math, 9B a single 2.
pub fn two_class_snapshot() -> serde_json::Value {
    json!({
        "students": [
            { "id": 1, "full_name": "Ivanov Ivan", "class_name": "9A" },
            { "id": 2, "full_name": "Petrova Anna", "class_name": "9B" }
        ],
        "teachers": [
            { "id": 1, "full_name": "Smirnova O.", "room_number": "12" }
        ],
        "subjects": [
            { "id": 1, "name": "Math" }
        ],
        "grades": [
            { "id": 1, "student_id": 1, "subject_id": 1, "grade": 5, "quarter": 1 },
            { "id": 2, "student_id": 2, "subject_id": 1, "grade": 2, "quarter": 1 }
        ]
    })
}

/// Fills a workspace already opened by `workspace.select` (which creates the
/// schema). Each grade row is (id, student, subject, value, quarter).
pub fn seed_workspace(
    workspace: &Path,
    students: &[(i64, &str, &str)],
    teachers: &[(i64, &str, &str)],
    subjects: &[(i64, &str)],
    grades: &[(i64, i64, i64, i64, i64)],
) {
    let conn = Connection::open(workspace.join("gradebook.sqlite3")).expect("open workspace db");
    for (id, name, class_name) in students {
        conn.execute(
            "INSERT INTO students(id, full_name, class_name) VALUES (?, ?, ?)",
            (id, name, class_name),
        )
        .expect("insert student");
    }
    for (id, name, room) in teachers {
        conn.execute(
            "INSERT INTO teachers(id, full_name, room_number) VALUES (?, ?, ?)",
            (id, name, room),
        )
        .expect("insert teacher");
    }
    for (id, name) in subjects {
        conn.execute("INSERT INTO subjects(id, name) VALUES (?, ?)", (id, name))
            .expect("insert subject");
    }
    for (id, student_id, subject_id, value, quarter) in grades {
        conn.execute(
            "INSERT INTO grades(id, student_id, subject_id, grade, quarter) VALUES (?, ?, ?, ?, ?)",
            (id, student_id, subject_id, value, quarter),
        )
        .expect("insert grade");
    }
}

pub fn open_workspace(sidecar: &mut Sidecar, prefix: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = sidecar.request_ok(
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}
