//! Background tasks: funding and swap operations tracked by polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a background task is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Funding,
    Swap,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Funding => write!(f, "funding"),
            Self::Swap => write!(f, "swap"),
        }
    }
}

/// Status of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An in-flight funding or swap operation.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// External handle returned on submission (faucet request id, tx hash, swap id).
    /// `None` while the submission itself is still in flight.
    pub reference: Option<String>,
    /// Number of status queries issued so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl BackgroundTask {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TaskStatus::Pending,
            reference: None,
            attempts: 0,
            created_at: Utc::now(),
            last_polled_at: None,
            failure: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Record one status query.
    pub fn record_poll(&mut self) {
        self.attempts += 1;
        self.last_polled_at = Some(Utc::now());
    }
}

/// Result of a finished poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed(String),
    /// The task was cancelled (reset or session dropped) before resolving.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending() {
        let task = BackgroundTask::new(TaskKind::Funding);
        assert!(task.is_pending());
        assert_eq!(task.attempts, 0);
        assert!(task.reference.is_none());
        assert!(task.last_polled_at.is_none());
    }

    #[test]
    fn record_poll_counts_attempts() {
        let mut task = BackgroundTask::new(TaskKind::Swap);
        task.record_poll();
        task.record_poll();
        assert_eq!(task.attempts, 2);
        assert!(task.last_polled_at.is_some());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}
