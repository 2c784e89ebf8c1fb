//! Process-wide service state and the HTTP surface above the repositories.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;

use filedepot_revision::RevisionStore;

use crate::{repository, repository::Repositories, visibility::GroupFilter};

pub struct ServiceState {
    pub repositories: Repositories,
    pub store: RevisionStore,
    pub filter: GroupFilter,
    pub host: String,
    pub proxy: Option<String>,
    /// Wall clock of the last successful mutation, in milliseconds.
    updated: AtomicI64,
    /// Serializes request handling; see the dispatch path.
    pub(crate) serial: Mutex<()>,
}

impl ServiceState {
    pub fn new(
        repositories: Repositories,
        filter: GroupFilter,
        host: &str,
        proxy: Option<&str>,
    ) -> Self {
        Self {
            repositories,
            store: RevisionStore::new(host, proxy),
            filter,
            host: host.to_string(),
            proxy: proxy.map(str::to_string),
            updated: AtomicI64::new(now_millis()),
            serial: Mutex::new(()),
        }
    }

    /// Records that a mutation just succeeded.
    pub fn touch(&self) {
        self.updated.store(now_millis(), Ordering::Relaxed);
    }

    pub fn updated(&self) -> i64 {
        self.updated.load(Ordering::Relaxed)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Builds the full request router: the two fixed endpoints, then
/// longest-prefix dispatch for everything else.
pub fn router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/depot/all", get(depot_all))
        .route("/depot/check", get(depot_check))
        .fallback(repository::dispatch)
        .with_state(state)
}

#[derive(Serialize)]
struct AllDoc {
    host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<String>,
    timestamp: i64,
    repositories: Vec<String>,
}

async fn depot_all(State(state): State<Arc<ServiceState>>) -> Json<AllDoc> {
    Json(AllDoc {
        host: state.host.clone(),
        proxy: state.proxy.clone(),
        timestamp: now_seconds(),
        repositories: state
            .repositories
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

#[derive(Serialize)]
struct CheckDoc {
    host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<String>,
    timestamp: i64,
    updated: i64,
}

async fn depot_check(State(state): State<Arc<ServiceState>>) -> Json<CheckDoc> {
    Json(CheckDoc {
        host: state.host.clone(),
        proxy: state.proxy.clone(),
        timestamp: now_seconds(),
        updated: state.updated(),
    })
}
