//! Per-shell session context. Lives only in memory; the core never sees it.

use crate::client::TaskView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRef {
    pub category: String,
    pub index: usize,
}

impl TaskRef {
    pub fn new(category: &str, index: usize) -> Self {
        Self {
            category: category.to_string(),
            index,
        }
    }

    /// A delete at `(category, index)` removes this task or shifts it.
    fn invalidated_by_delete(&self, category: &str, index: usize) -> bool {
        self.category == category && self.index >= index
    }
}

/// A task picked by position, remembered with the title it had when picked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinnedTask {
    pub task: TaskRef,
    pub title: String,
}

impl PinnedTask {
    pub fn new(category: &str, index: usize, title: &str) -> Self {
        Self {
            task: TaskRef::new(category, index),
            title: title.to_string(),
        }
    }

    /// The slot in a fresh listing of the category still holds this task.
    pub fn still_in(&self, tasks: &[TaskView]) -> bool {
        tasks
            .iter()
            .find(|t| t.index == self.task.index)
            .is_some_and(|t| t.title == self.title)
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub user: Option<String>,
    pub edit_target: Option<PinnedTask>,
    pub timer: Option<PinnedTask>,
    pub random_fact: String,
}

impl Session {
    pub fn login(&mut self, user: &str) {
        *self = Session {
            user: Some(user.to_string()),
            ..Session::default()
        };
    }

    pub fn logout(&mut self) {
        *self = Session::default();
    }

    pub fn user(&self) -> anyhow::Result<&str> {
        self.user
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not logged in (use: login <name>)"))
    }

    /// Drops edit/timer targets whose position a delete just removed or shifted.
    pub fn after_delete(&mut self, category: &str, index: usize) {
        if self
            .edit_target
            .as_ref()
            .is_some_and(|t| t.task.invalidated_by_delete(category, index))
        {
            self.edit_target = None;
        }
        if self
            .timer
            .as_ref()
            .is_some_and(|t| t.task.invalidated_by_delete(category, index))
        {
            self.timer = None;
        }
    }
}
