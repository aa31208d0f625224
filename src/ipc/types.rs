use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use super::outbox::Outbox;
use crate::refresh::RefreshHandle;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub runtime: tokio::runtime::Handle,
    pub outbox: Outbox,
    pub refreshes: HashMap<String, RefreshHandle>,
    /// Stopped refresh ids, oldest first. They stay queryable through
    /// `refresh.latest` until evicted.
    pub stopped_refreshes: VecDeque<String>,
}

/// How many stopped refreshes keep their last report around.
pub const MAX_STOPPED_REFRESHES: usize = 8;

impl AppState {
    pub fn new(runtime: tokio::runtime::Handle, outbox: Outbox) -> Self {
        Self {
            workspace: None,
            db: None,
            runtime,
            outbox,
            refreshes: HashMap::new(),
            stopped_refreshes: VecDeque::new(),
        }
    }

    /// Records a just-stopped refresh and drops the oldest stopped ones
    /// beyond [`MAX_STOPPED_REFRESHES`].
    pub fn retire_refresh(&mut self, refresh_id: &str) {
        self.stopped_refreshes.push_back(refresh_id.to_string());
        while self.stopped_refreshes.len() > MAX_STOPPED_REFRESHES {
            let Some(oldest) = self.stopped_refreshes.pop_front() else {
                break;
            };
            if self.refreshes.remove(&oldest).is_some() {
                tracing::debug!(refresh_id = %oldest, "evicted stopped refresh");
            }
        }
    }
}
