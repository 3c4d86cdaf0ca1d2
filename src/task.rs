//! # Task Model
//!
//! Unità di lavoro: la conversione di una singola texture PNG in DDS.
//!
//! Un `Task` viene creato dallo stage di discovery (scanner + inspector),
//! consumato da un solo worker e, una volta in coda, cambia solo `status`.
//! Le transizioni sono solo in avanti:
//!
//! ```text
//! Pending -> Preprocessing -> Compressing -> Succeeded | Failed | Skipped
//! ```

use crate::error::InvalidTransition;
use crate::inspector::Inspection;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable reason codes reported for failed and skipped tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    InvalidSource,
    PreprocessError,
    BackendError,
    WriteError,
    Cancelled,
    WorkerPanic,
    /// Another source in the same run already maps to this destination
    DuplicateDestination,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidSource => "invalid-source",
            ReasonCode::PreprocessError => "preprocess-error",
            ReasonCode::BackendError => "backend-error",
            ReasonCode::WriteError => "write-error",
            ReasonCode::Cancelled => "cancelled",
            ReasonCode::WorkerPanic => "worker-panic",
            ReasonCode::DuplicateDestination => "duplicate-destination",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended in `Failed` or `Skipped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub detail: String,
}

impl Reason {
    pub fn new(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.detail)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Preprocessing,
    Compressing,
    Succeeded,
    Failed(Reason),
    Skipped(Reason),
}

impl TaskStatus {
    /// Position in the lifecycle; terminal states share the last rank
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Preprocessing => 1,
            TaskStatus::Compressing => 2,
            TaskStatus::Succeeded | TaskStatus::Failed(_) | TaskStatus::Skipped(_) => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Preprocessing => "preprocessing",
            TaskStatus::Compressing => "compressing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed(_) => "failed",
            TaskStatus::Skipped(_) => "skipped",
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            TaskStatus::Failed(reason) | TaskStatus::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

/// One source texture and its conversion plan
#[derive(Debug, Clone)]
pub struct Task {
    id: usize,
    source: PathBuf,
    destination: PathBuf,
    width: u32,
    height: u32,
    has_alpha: bool,
    needs_upscale: bool,
    needs_flip: bool,
    status: TaskStatus,
}

impl Task {
    /// Task for a source whose header was inspected successfully
    pub fn planned(id: usize, source: PathBuf, destination: PathBuf, inspection: &Inspection) -> Self {
        Self {
            id,
            source,
            destination,
            width: inspection.width,
            height: inspection.height,
            has_alpha: inspection.has_alpha,
            needs_upscale: inspection.needs_upscale,
            needs_flip: inspection.needs_flip,
            status: TaskStatus::Pending,
        }
    }

    /// Task for a source that cannot be converted; born `Skipped`
    pub fn rejected(id: usize, source: PathBuf, destination: PathBuf, reason: Reason) -> Self {
        Self {
            id,
            source,
            destination,
            width: 0,
            height: 0,
            has_alpha: false,
            needs_upscale: false,
            needs_flip: false,
            status: TaskStatus::Skipped(reason),
        }
    }

    /// Discovery order index
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn needs_upscale(&self) -> bool {
        self.needs_upscale
    }

    pub fn needs_flip(&self) -> bool {
        self.needs_flip
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Move the task forward. Terminal states and regressions are rejected.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return Err(InvalidTransition {
                from: self.status.label(),
                to: next.label(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        let inspection = Inspection {
            width: 64,
            height: 32,
            has_alpha: true,
            needs_upscale: true,
            needs_flip: true,
        };
        Task::planned(
            0,
            PathBuf::from("/mods/A/Textures/wall.png"),
            PathBuf::from("/mods/A/Textures/wall.dds"),
            &inspection,
        )
    }

    #[test]
    fn test_forward_transitions() {
        let mut task = task();
        assert_eq!(task.status(), &TaskStatus::Pending);
        assert!(task.transition(TaskStatus::Preprocessing).is_ok());
        assert!(task.transition(TaskStatus::Compressing).is_ok());
        assert!(task.transition(TaskStatus::Succeeded).is_ok());
        assert!(task.status().is_terminal());
    }

    #[test]
    fn test_regression_is_rejected() {
        let mut task = task();
        task.transition(TaskStatus::Compressing).unwrap();
        let err = task.transition(TaskStatus::Preprocessing).unwrap_err();
        assert_eq!(err.from, "compressing");
        assert_eq!(err.to, "preprocessing");
        assert_eq!(task.status(), &TaskStatus::Compressing);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut task = task();
        task.transition(TaskStatus::Preprocessing).unwrap();
        task.transition(TaskStatus::Failed(Reason::new(ReasonCode::BackendError, "boom")))
            .unwrap();
        assert!(task.transition(TaskStatus::Succeeded).is_err());
        assert!(task
            .transition(TaskStatus::Skipped(Reason::new(ReasonCode::Cancelled, "")))
            .is_err());
        assert_eq!(task.status().reason().unwrap().code, ReasonCode::BackendError);
    }

    #[test]
    fn test_rejected_task_is_born_skipped() {
        let task = Task::rejected(
            3,
            PathBuf::from("bad.png"),
            PathBuf::from("bad.dds"),
            Reason::new(ReasonCode::InvalidSource, "not a png"),
        );
        assert!(task.status().is_terminal());
        assert_eq!(task.status().label(), "skipped");
        assert_eq!(task.status().reason().unwrap().to_string(), "invalid-source: not a png");
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(ReasonCode::InvalidSource.as_str(), "invalid-source");
        assert_eq!(ReasonCode::PreprocessError.as_str(), "preprocess-error");
        assert_eq!(
            serde_json::to_string(&ReasonCode::WriteError).unwrap(),
            "\"write-error\""
        );
    }
}
