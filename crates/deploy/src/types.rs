//! Progress model and event types for the deploy flow.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What a progress event is measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Install,
    FileCopy,
    Extraction,
    General,
}

/// Normalized progress tick.
///
/// `percent` never decreases within one operation. Byte counters are zero
/// when the operation has no byte-level signal (package installs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation: Uuid,
    pub kind: ProgressKind,
    pub percent: u8,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_file: String,
}

/// Operation boundary a status event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Milestone {
    Started,
    Finished,
    Failed,
    Cancelled,
}

/// Human-readable milestone, emitted at operation boundaries only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub operation: Uuid,
    pub milestone: Milestone,
    pub message: String,
}

/// Anything broadcast to orchestrator subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeployEvent {
    Status(StatusEvent),
    Progress(ProgressEvent),
}

/// Lifecycle of one operation instance. There is no resume: a failed or
/// cancelled operation is restarted by a fresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Local inputs of a full deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub package_path: PathBuf,
    pub content_path: PathBuf,
    /// Device path the content archive is pushed to. Not validated.
    pub destination: String,
}

/// Per-call progress receiver and cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    pub progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    pub cancel: Option<CancellationToken>,
}

impl OperationOptions {
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
