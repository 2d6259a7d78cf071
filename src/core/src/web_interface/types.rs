use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotator, Language, RetryPolicy};
use crate::auth::{ActivityLog, AuthService};
use crate::dashboard::DashboardStats;
use crate::inspection::DetailCoordinator;
use crate::monitor::LiveMonitor;
use crate::storage::Storage;
use crate::telemetry::{ResourceFeed, ResourceTiming};

/// API error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Shared handles given to every route.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Mutex<LiveMonitor>>,
    pub coordinator: Arc<DetailCoordinator>,
    pub auth: Arc<AuthService>,
    pub annotator: Arc<dyn Annotator>,
    pub storage: Arc<dyn Storage>,
    pub dashboard: Arc<Mutex<DashboardStats>>,
    pub resources: ResourceFeed,
    pub retry: RetryPolicy,
    pub language: Language,
}

impl AppState {
    pub fn monitor(&self) -> MutexGuard<'_, LiveMonitor> {
        self.monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dashboard(&self) -> MutexGuard<'_, DashboardStats> {
        self.dashboard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `GET /api/records` query string
#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub sequence: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct InterfaceRequest {
    pub interface: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TrafficAnalysisRequest {
    pub traffic: String,
}

#[derive(Debug, Serialize)]
pub struct TrafficAnalysisResponse {
    pub analysis: String,
    pub dashboard: DashboardStats,
}

#[derive(Debug, Deserialize)]
pub struct SecurityReportRequest {
    pub infrastructure: String,
}

#[derive(Debug, Deserialize)]
pub struct LogAnalysisRequest {
    pub contents: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportLogsRequest {
    pub logs: Vec<ActivityLog>,
}

#[derive(Debug, Deserialize)]
pub struct ResourcesRequest {
    pub entries: Vec<ResourceTiming>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}
