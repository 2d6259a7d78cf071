use serde::Serialize;

use crate::telemetry::Record;

pub const IDLE_MESSAGE: &str = "Select a packet";
pub const PENDING_MESSAGE: &str = "Analyzing...";
pub const FAILED_MESSAGE: &str = "Analysis unavailable. Please try again later.";
pub const RESTRICTED_MESSAGE: &str = "Action restricted for viewer accounts.";

/// Identity of one `select` call. Only the newest token may resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SelectionToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailState {
    Idle,
    Pending,
    Annotated(String),
    Failed,
    Restricted,
}

impl DetailState {
    pub fn label(&self) -> &'static str {
        match self {
            DetailState::Idle => "idle",
            DetailState::Pending => "pending",
            DetailState::Annotated(_) => "annotated",
            DetailState::Failed => "failed",
            DetailState::Restricted => "restricted",
        }
    }

    /// Text shown in the detail panel; the annotation itself once annotated.
    pub fn message(&self) -> &str {
        match self {
            DetailState::Idle => IDLE_MESSAGE,
            DetailState::Pending => PENDING_MESSAGE,
            DetailState::Annotated(text) => text,
            DetailState::Failed => FAILED_MESSAGE,
            DetailState::Restricted => RESTRICTED_MESSAGE,
        }
    }
}

/// What the detail panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub state: &'static str,
    pub token: SelectionToken,
    /// Copy of the selected record, `annotation` set only when annotated
    pub record: Option<Record>,
    pub message: String,
}
