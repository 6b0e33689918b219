//! Core types for the task framework

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Submission-ordered task identifier, unique within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle: `Pending -> Running -> {Done, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// One unit of work and its recorded outcome
#[derive(Debug, Clone)]
pub struct Task<T> {
    pub id: TaskId,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<T>,
    pub error: Option<TaskError>,
}

impl<T> Task<T> {
    pub fn pending(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, outcome: std::result::Result<T, TaskError>) {
        self.finished_at = Some(Utc::now());
        match outcome {
            Ok(value) => {
                self.status = TaskStatus::Done;
                self.result = Some(value);
            },
            Err(err) => {
                self.status = TaskStatus::Failed;
                self.error = Some(err);
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// Wall-clock execution time, if the task ran
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Handle returned for a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    id: TaskId,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

/// Terminal tasks of one scheduler, in submission order
#[derive(Debug)]
pub struct TaskReport<T> {
    tasks: Vec<Task<T>>,
}

impl<T> TaskReport<T> {
    pub(crate) fn new(mut tasks: Vec<Task<T>>) -> Self {
        tasks.sort_by_key(|t| t.id);
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task<T>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task results in submission order.
    ///
    /// Failed tasks are dropped when `skip_failed` is set, otherwise they
    /// appear as `None` in their submission slot.
    pub fn results(&self, skip_failed: bool) -> Vec<Option<&T>> {
        self.tasks
            .iter()
            .filter(|t| !(skip_failed && t.is_failed()))
            .map(|t| t.result.as_ref())
            .collect()
    }

    /// Successful results in submission order
    pub fn into_results(self) -> Vec<T> {
        self.tasks.into_iter().filter_map(|t| t.result).collect()
    }

    pub fn failed(&self) -> impl Iterator<Item = &Task<T>> {
        self.tasks.iter().filter(|t| t.is_failed())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: u64, outcome: std::result::Result<u32, TaskError>) -> Task<u32> {
        let mut task = Task::pending(TaskId(id));
        task.start();
        task.finish(outcome);
        task
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task: Task<u32> = Task::pending(TaskId(0));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.duration().is_none());

        task.start();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(!task.status.is_terminal());

        task.finish(Ok(7));
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.result, Some(7));
        assert!(task.duration().is_some());
    }

    #[test]
    fn test_report_orders_by_submission() {
        let report = TaskReport::new(vec![
            finished(2, Ok(20)),
            finished(0, Ok(0)),
            finished(1, Err(TaskError::Failed("boom".into()))),
        ]);

        assert_eq!(report.results(false), vec![Some(&0), None, Some(&20)]);
        assert_eq!(report.results(true), vec![Some(&0), Some(&20)]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.into_results(), vec![0, 20]);
    }
}
