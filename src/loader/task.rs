//! Task Entity
//!
//! A `Task` is one `require` call: a dependency list, a countdown, and a
//! callback that fires once. Tasks are never memoized and nothing can depend
//! on them. They stay in the registry after finishing so late notifications
//! find them and are ignored.

use super::module::ErrorCallback;

/// Unique identifier for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// Receives the dependency exports, in declaration order.
pub type TaskCallback<V> = Box<dyn FnOnce(Vec<V>)>;

/// Where a task is in its single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Completed,
    Failed,
}

/// A pending or finished `require` call.
pub struct Task<V> {
    id: TaskId,
    deps: Vec<String>,
    remaining: usize,
    state: TaskState,
    callback: Option<TaskCallback<V>>,
    on_error: Option<ErrorCallback>,
}

impl<V> Task<V> {
    pub fn new(
        id: TaskId,
        deps: Vec<String>,
        callback: TaskCallback<V>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            id,
            remaining: deps.len(),
            deps,
            state: TaskState::Pending,
            callback: Some(callback),
            on_error,
        }
    }

    /// Count one resolved dependency. Returns true when none remain.
    pub fn decrement(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    /// Mark the task completed and hand out its callback.
    ///
    /// Returns `None` if the task already finished either way.
    pub fn complete(&mut self) -> Option<TaskCallback<V>> {
        if self.state != TaskState::Pending {
            return None;
        }
        self.state = TaskState::Completed;
        self.on_error = None;
        self.callback.take()
    }

    /// Mark the task failed and hand out its error callback.
    ///
    /// The outer `Option` is `None` if the task already finished; the inner
    /// one is `None` if the caller supplied no error callback.
    pub fn fail(&mut self) -> Option<Option<ErrorCallback>> {
        if self.state != TaskState::Pending {
            return None;
        }
        self.state = TaskState::Failed;
        self.callback = None;
        Some(self.on_error.take())
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == TaskState::Pending
    }
}

impl<V> std::fmt::Debug for Task<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .field("remaining", &self.remaining)
            .field("state", &self.state)
            .finish()
    }
}
