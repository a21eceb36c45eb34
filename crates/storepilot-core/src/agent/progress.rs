//! Task plan state and progress accounting

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Snapshot emitted whenever a task changes status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub index: usize,
    pub status: TaskStatus,
    /// Whole percent of completed tasks
    pub progress: u32,
    pub completed: usize,
    pub total: usize,
}

/// Task currently being worked on, tied to the tool call that started it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub index: usize,
    pub call_id: String,
}

/// Tasks derived from the first planning message of a session.
///
/// `statuses` always has one entry per task.
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    tasks: Vec<String>,
    statuses: Vec<TaskStatus>,
    active: Option<ActiveTask>,
}

impl TaskPlan {
    pub fn new(tasks: Vec<String>) -> Self {
        let tasks: Vec<String> = tasks
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let statuses = vec![TaskStatus::Pending; tasks.len()];
        Self {
            tasks,
            statuses,
            active: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    pub fn active(&self) -> Option<&ActiveTask> {
        self.active.as_ref()
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == TaskStatus::Completed)
            .count()
    }

    pub fn progress(&self) -> u32 {
        match self.total() {
            0 => 0,
            total => (100.0 * self.completed() as f64 / total as f64).round() as u32,
        }
    }

    /// Set one task's status. `None` if the index is out of range.
    pub fn set_status(&mut self, index: usize, status: TaskStatus) -> Option<ProgressUpdate> {
        *self.statuses.get_mut(index)? = status;
        Some(ProgressUpdate {
            index,
            status,
            progress: self.progress(),
            completed: self.completed(),
            total: self.total(),
        })
    }

    /// A mutating call was issued: move the next pending task to in progress.
    ///
    /// Nothing happens while another task is still active or when every task
    /// has already been started.
    pub fn start(&mut self, call_id: &str) -> Option<ProgressUpdate> {
        if self.active.is_some() {
            return None;
        }
        let index = self.statuses.iter().position(|s| *s == TaskStatus::Pending)?;
        self.active = Some(ActiveTask {
            index,
            call_id: call_id.to_string(),
        });
        self.set_status(index, TaskStatus::InProgress)
    }

    /// The result for `call_id` arrived. Only the call that started the
    /// active task finishes it.
    pub fn finish(&mut self, call_id: &str, success: bool) -> Option<ProgressUpdate> {
        if self.active.as_ref()?.call_id != call_id {
            return None;
        }
        let active = self.active.take()?;
        let status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.set_status(active.index, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> TaskPlan {
        TaskPlan::new(vec!["a".into(), " ".into(), "b".into(), "c".into()])
    }

    #[test]
    fn test_new_drops_blank_tasks() {
        let plan = plan();
        assert_eq!(plan.tasks(), ["a", "b", "c"]);
        assert_eq!(plan.statuses().len(), plan.total());
        assert_eq!(plan.progress(), 0);
    }

    #[test]
    fn test_start_and_finish() {
        let mut plan = plan();

        let started = plan.start("call_1").unwrap();
        assert_eq!(started.index, 0);
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(plan.start("call_2").is_none());

        assert!(plan.finish("call_2", true).is_none());
        let done = plan.finish("call_1", true).unwrap();
        assert_eq!(
            done,
            ProgressUpdate {
                index: 0,
                status: TaskStatus::Completed,
                progress: 33,
                completed: 1,
                total: 3
            }
        );
        assert!(plan.active().is_none());

        assert_eq!(plan.start("call_3").unwrap().index, 1);
        let failed = plan.finish("call_3", false).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.completed, 1);
        assert_eq!(plan.start("call_4").unwrap().index, 2);
        assert_eq!(plan.finish("call_4", true).unwrap().progress, 67);
        assert!(plan.start("call_5").is_none());
    }

    #[test]
    fn test_empty_plan_never_starts() {
        let mut plan = TaskPlan::default();
        assert!(plan.start("call_1").is_none());
        assert!(plan.finish("call_1", true).is_none());
        assert!(plan.set_status(0, TaskStatus::Completed).is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
