//! Module and Task Registry
//!
//! Two append-only mappings: module name -> module, task id -> task.
//! Entries are never removed; a finished task stays reachable by id.

use std::collections::HashMap;

use super::module::{Module, ModuleId};
use super::task::{Task, TaskId};

/// Storage for every module and task a loader has seen.
pub struct Registry<V> {
    /// All modules by ID.
    modules: Vec<Module<V>>,

    /// Module name -> ModuleId.
    by_name: HashMap<String, ModuleId>,

    /// All tasks by ID.
    tasks: Vec<Task<V>>,
}

impl<V> Registry<V> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            by_name: HashMap::new(),
            tasks: Vec::new(),
        }
    }

    /// Look a module up by name.
    pub fn lookup(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Get a module by ID.
    pub fn module(&self, id: ModuleId) -> Option<&Module<V>> {
        self.modules.get(id.value() as usize)
    }

    /// Get a mutable reference to a module by ID.
    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module<V>> {
        self.modules.get_mut(id.value() as usize)
    }

    /// Get a module by name.
    pub fn module_named(&self, name: &str) -> Option<&Module<V>> {
        self.lookup(name).and_then(|id| self.module(id))
    }

    /// Register a placeholder module under `name`.
    ///
    /// The caller checks `lookup` first; a second insert under the same name
    /// rebinds the name to the new module.
    pub fn insert_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId::new(self.modules.len() as u64);
        self.modules.push(Module::placeholder(id, name));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Get the module called `name`, registering a placeholder if missing.
    pub fn module_entry(&mut self, name: &str) -> &mut Module<V> {
        let id = match self.lookup(name) {
            Some(id) => id,
            None => self.insert_module(name),
        };
        // `by_name` only holds ids from `insert_module`, which pushes first.
        match self.modules.get_mut(id.value() as usize) {
            Some(module) => module,
            None => unreachable!("name index points past the module table"),
        }
    }

    /// The id the next task will receive.
    pub fn next_task_id(&self) -> TaskId {
        TaskId::new(self.tasks.len() as u64)
    }

    /// Store a task built with `next_task_id`.
    pub fn insert_task(&mut self, task: Task<V>) -> TaskId {
        let id = task.id();
        debug_assert_eq!(id, self.next_task_id());
        self.tasks.push(task);
        id
    }

    /// Get a task by ID.
    pub fn task(&self, id: TaskId) -> Option<&Task<V>> {
        self.tasks.get(id.value() as usize)
    }

    /// Get a mutable reference to a task by ID.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task<V>> {
        self.tasks.get_mut(id.value() as usize)
    }

    /// Get the number of modules, placeholders included.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Get the number of tasks ever created.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Iterate over all modules in creation order.
    pub fn modules(&self) -> impl Iterator<Item = &Module<V>> {
        self.modules.iter()
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("module_count", &self.modules.len())
            .field("task_count", &self.tasks.len())
            .finish()
    }
}
