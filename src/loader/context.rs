//! Loader Context
//!
//! The context owns the registry, the base path used to turn module names
//! into script paths, and a queue of jobs. Every dependency walk and every
//! notification runs here, synchronously, without calling user code. Anything
//! that leaves the context (fetching a script, running a factory, calling a
//! task or error callback) becomes a `Job` that `Loader` runs once the
//! context is no longer borrowed.
//!
//! # Counting protocol
//!
//! A module or task starts with `remaining = deps.len()`. Each dependency
//! that reaches `Success` decrements it once per edge; the decrement that
//! hits zero moves a module to `Ready` (queueing its factory) or completes a
//! task. A dependency that reaches `Error` fails its dependents immediately,
//! without waiting for the other dependencies.

use std::collections::VecDeque;

use tracing::{debug, error, trace, warn};

use super::error::{LoadError, LoadResult};
use super::module::{Dependent, ErrorCallback, Factory, FactoryError, Module, ModuleId, Outcome};
use super::registry::Registry;
use super::status::{Effect, Status};
use super::task::{Task, TaskCallback, TaskId};
use super::transport::{FetchKind, FetchRequest, SCRIPT_EXTENSION};

/// Work that has to run outside the context borrow.
pub(crate) enum Job<V> {
    Fetch(FetchRequest),
    Evaluate(ModuleId),
    ModuleFailed {
        handler: ErrorCallback,
        error: LoadError,
    },
    TaskCompleted {
        callback: TaskCallback<V>,
        values: Vec<V>,
    },
    TaskFailed {
        handler: ErrorCallback,
        error: LoadError,
    },
    Unhandled(LoadError),
}

/// A factory taken out of a `Ready` module, with its arguments.
pub(crate) struct Evaluation<V> {
    pub name: String,
    pub factory: Factory<V>,
    pub args: Vec<V>,
}

/// Shared environment for every module and task of one loader.
pub struct Context<V> {
    base_path: String,
    registry: Registry<V>,
    jobs: VecDeque<Job<V>>,
}

impl<V: Clone> Context<V> {
    /// Create an empty context resolving names against `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            registry: Registry::new(),
            jobs: VecDeque::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Turn a module name into the path its script is fetched from.
    pub fn resolve_path(&self, name: &str) -> String {
        format!("{}{}{}", self.base_path, name, SCRIPT_EXTENSION)
    }

    pub fn registry(&self) -> &Registry<V> {
        &self.registry
    }

    pub fn get_module(&self, name: &str) -> Option<&Module<V>> {
        self.registry.module_named(name)
    }

    pub fn get_task(&self, id: TaskId) -> Option<&Task<V>> {
        self.registry.task(id)
    }

    /// Whether jobs are waiting to run.
    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Find the module called `name` and attach `dependent` to it.
    ///
    /// A missing name gets a placeholder module that immediately moves to
    /// `Fetching`, which queues the script fetch.
    pub fn get_or_create_module(&mut self, name: &str, dependent: Dependent) -> ModuleId {
        if let Some(id) = self.registry.lookup(name) {
            if let Some(module) = self.registry.module_mut(id) {
                module.attach(dependent);
            }
            return id;
        }

        let id = self.registry.insert_module(name);
        if let Some(module) = self.registry.module_mut(id) {
            module.attach(dependent);
        }
        self.enter(id, Status::Fetching);
        id
    }

    /// Queue a transport fetch for the module called `name`.
    pub fn fetch(&mut self, name: &str) {
        let request = FetchRequest::module(name, self.resolve_path(name));
        debug!(
            target: "modloader::transport",
            name,
            path = %request.path,
            "Fetching module script"
        );
        self.jobs.push_back(Job::Fetch(request));
    }

    /// Queue the fetch of the page's entry script.
    pub fn fetch_entry(&mut self, name: &str, file: &str) {
        let request = FetchRequest::entry(name, format!("{}{}", self.base_path, file));
        debug!(
            target: "modloader::bootstrap",
            path = %request.path,
            "Fetching entry script"
        );
        self.jobs.push_back(Job::Fetch(request));
    }

    /// Register or re-register a module and start its dependency walk.
    ///
    /// A pending or failed module is re-initialized in place and keeps its
    /// id and its dependents. A module that is evaluating or already has its
    /// export is left untouched.
    pub fn define(
        &mut self,
        name: &str,
        deps: Vec<String>,
        factory: Factory<V>,
        on_error: Option<ErrorCallback>,
    ) -> LoadResult<ModuleId> {
        let module = self.registry.module_entry(name);
        let id = module.id();

        if matches!(module.status(), Status::Ready | Status::Success) {
            warn!(
                target: "modloader::module",
                name,
                status = %module.status(),
                "Ignoring re-definition of a module that already resolved"
            );
            return Err(LoadError::AlreadyDefined(name.to_string()));
        }

        if let Err(err) = module.init(deps, factory, on_error) {
            warn!(target: "modloader::module", name, error = %err, "Cannot re-define module");
            return Err(LoadError::AlreadyDefined(name.to_string()));
        }

        debug!(
            target: "modloader::module",
            name,
            id = id.value(),
            epoch = module.epoch(),
            deps = ?module.deps(),
            "Module defined"
        );

        let epoch = module.epoch();
        self.resolve(Dependent::Module { id, epoch });
        Ok(id)
    }

    /// Create a task for `deps` and start its dependency walk.
    pub fn require(
        &mut self,
        deps: Vec<String>,
        callback: TaskCallback<V>,
        on_error: Option<ErrorCallback>,
    ) -> TaskId {
        let id = self.registry.next_task_id();
        debug!(target: "modloader::task", id = id.value(), deps = ?deps, "Task created");
        self.registry
            .insert_task(Task::new(id, deps, callback, on_error));
        self.resolve(Dependent::Task(id));
        id
    }

    /// Walk the dependency list of `requester`.
    ///
    /// Resolved dependencies are counted immediately, failed ones fail the
    /// requester with their retained error, everything else gets the
    /// requester attached (creating and fetching placeholders as needed).
    pub fn resolve(&mut self, requester: Dependent) {
        let Some(deps) = self.pending_deps(requester) else {
            return;
        };

        if deps.is_empty() {
            self.all_resolved(requester);
            return;
        }

        for name in deps {
            if !self.can_progress(requester) {
                // Failed part-way through; the rest of the walk is moot.
                break;
            }
            let state = self
                .registry
                .module_named(&name)
                .map(|module| (module.status(), module.error().cloned()));
            match state {
                Some((Status::Success, _)) => {
                    self.notify(requester, Outcome::Success);
                }
                Some((Status::Error, Some(error))) => {
                    self.notify(requester, Outcome::Error(error));
                }
                _ => {
                    self.get_or_create_module(&name, requester);
                }
            }
        }
    }

    /// Deliver a dependency's outcome to one dependent.
    ///
    /// Notifications to finished tasks, to modules that already left
    /// `Waiting`, or along edges of a superseded definition are dropped.
    /// Returns whether the dependent was still listening.
    pub fn notify(&mut self, target: Dependent, outcome: Outcome) -> bool {
        match target {
            Dependent::Module { id, epoch } => {
                let Some(module) = self.registry.module_mut(id) else {
                    return false;
                };
                if module.epoch() != epoch || module.status() != Status::Waiting {
                    trace!(
                        target: "modloader::module",
                        name = module.name(),
                        status = %module.status(),
                        "Dropping notification for settled definition"
                    );
                    return false;
                }
                match outcome {
                    Outcome::Success => {
                        if module.decrement() {
                            self.enter(id, Status::Ready);
                        }
                    }
                    Outcome::Error(error) => self.fail_module(id, error),
                }
                true
            }
            Dependent::Task(id) => {
                let Some(task) = self.registry.task_mut(id) else {
                    return false;
                };
                if !task.is_pending() {
                    return false;
                }
                match outcome {
                    Outcome::Success => {
                        if task.decrement() {
                            self.complete_task(id);
                        }
                    }
                    Outcome::Error(error) => self.fail_task(id, error),
                }
                true
            }
        }
    }

    /// The transport could not load a script.
    pub fn fetch_failed(&mut self, request: &FetchRequest, reason: String) {
        let error = LoadError::FetchFailed {
            name: request.name.clone(),
            path: request.path.clone(),
            reason,
        };

        if request.kind == FetchKind::Entry {
            error!(target: "modloader::bootstrap", %error, "Entry script failed to load");
            self.jobs.push_back(Job::Unhandled(error));
            return;
        }

        let fetching = self
            .registry
            .lookup(&request.name)
            .filter(|id| {
                self.registry
                    .module(*id)
                    .is_some_and(|module| module.status() == Status::Fetching)
            });
        match fetching {
            Some(id) => self.fail_module(id, error),
            None => debug!(
                target: "modloader::transport",
                %error,
                "Ignoring fetch error for a module that is no longer fetching"
            ),
        }
    }

    /// The transport finished running a script.
    pub fn fetch_loaded(&mut self, request: &FetchRequest) {
        if request.kind == FetchKind::Entry {
            debug!(target: "modloader::bootstrap", path = %request.path, "Entry script loaded");
            return;
        }
        let still_fetching = self
            .registry
            .module_named(&request.name)
            .is_some_and(|module| module.status() == Status::Fetching);
        if still_fetching {
            warn!(
                target: "modloader::transport",
                name = %request.name,
                path = %request.path,
                "Script loaded without defining its module"
            );
        } else {
            trace!(target: "modloader::transport", path = %request.path, "Script loaded");
        }
    }

    pub(crate) fn next_job(&mut self) -> Option<Job<V>> {
        self.jobs.pop_front()
    }

    /// Take the factory of a `Ready` module along with its arguments.
    pub(crate) fn begin_evaluation(&mut self, id: ModuleId) -> Option<Evaluation<V>> {
        let module = self.registry.module(id)?;
        if module.status() != Status::Ready {
            return None;
        }
        let args = match self.collect_exports(module.deps()) {
            Ok(args) => args,
            Err(missing) => {
                let name = module.name().to_string();
                self.fail_module(
                    id,
                    LoadError::FactoryFailed {
                        name,
                        message: format!("dependency '{}' has no export", missing),
                    },
                );
                return None;
            }
        };

        let module = self.registry.module_mut(id)?;
        let factory = module.take_factory()?;
        Some(Evaluation {
            name: module.name().to_string(),
            factory,
            args,
        })
    }

    /// Record what a factory produced.
    pub(crate) fn finish_evaluation(
        &mut self,
        id: ModuleId,
        result: Result<Option<V>, FactoryError>,
    ) {
        let Some(module) = self.registry.module_mut(id) else {
            return;
        };
        if module.status() != Status::Ready {
            return;
        }
        let name = module.name().to_string();
        match result {
            Ok(Some(value)) => {
                module.set_export(value);
                debug!(target: "modloader::module", name = %name, "Module resolved");
                self.enter(id, Status::Success);
            }
            Ok(None) => self.fail_module(id, LoadError::NoExport(name)),
            Err(err) => self.fail_module(
                id,
                LoadError::FactoryFailed {
                    name,
                    message: err.to_string(),
                },
            ),
        }
    }

    /// Whether a requester still waits on its dependencies.
    fn can_progress(&self, requester: Dependent) -> bool {
        match requester {
            Dependent::Module { id, epoch } => self
                .registry
                .module(id)
                .is_some_and(|m| m.epoch() == epoch && m.status() == Status::Waiting),
            Dependent::Task(id) => self.registry.task(id).is_some_and(Task::is_pending),
        }
    }

    /// Dependencies of a requester that can still make progress.
    fn pending_deps(&self, requester: Dependent) -> Option<Vec<String>> {
        if !self.can_progress(requester) {
            return None;
        }
        match requester {
            Dependent::Module { id, .. } => self.registry.module(id).map(|m| m.deps().to_vec()),
            Dependent::Task(id) => self.registry.task(id).map(|t| t.deps().to_vec()),
        }
    }

    fn all_resolved(&mut self, requester: Dependent) {
        match requester {
            Dependent::Module { id, .. } => {
                self.enter(id, Status::Ready);
            }
            Dependent::Task(id) => self.complete_task(id),
        }
    }

    /// Read the memoized exports of `deps`, in order.
    fn collect_exports(&self, deps: &[String]) -> Result<Vec<V>, String> {
        deps.iter()
            .map(|name| {
                self.registry
                    .module_named(name)
                    .and_then(|module| module.export())
                    .cloned()
                    .ok_or_else(|| name.clone())
            })
            .collect()
    }

    fn complete_task(&mut self, id: TaskId) {
        let Some(task) = self.registry.task(id) else {
            return;
        };
        match self.collect_exports(task.deps()) {
            Ok(values) => {
                let Some(callback) = self.registry.task_mut(id).and_then(Task::complete) else {
                    return;
                };
                debug!(target: "modloader::task", id = id.value(), "Task completed");
                self.jobs.push_back(Job::TaskCompleted { callback, values });
            }
            Err(missing) => self.fail_task(
                id,
                LoadError::FactoryFailed {
                    name: missing.clone(),
                    message: format!("dependency '{}' has no export", missing),
                },
            ),
        }
    }

    fn fail_task(&mut self, id: TaskId, error: LoadError) {
        let Some(handler) = self.registry.task_mut(id).and_then(Task::fail) else {
            return;
        };
        debug!(target: "modloader::task", id = id.value(), %error, "Task failed");
        match handler {
            Some(handler) => self.jobs.push_back(Job::TaskFailed { handler, error }),
            None => self.jobs.push_back(Job::Unhandled(error)),
        }
    }

    /// Put a module into `Error`, retaining `error` for late dependents.
    fn fail_module(&mut self, id: ModuleId, error: LoadError) {
        let Some(module) = self.registry.module_mut(id) else {
            return;
        };
        if !module.status().can_transition(Status::Error) {
            return;
        }
        debug!(target: "modloader::module", name = module.name(), %error, "Module failed");
        module.set_error(error.clone());
        // Edges can be stale or lead to finished tasks, so count actual deliveries.
        if !self.enter(id, Status::Error) {
            self.jobs.push_back(Job::Unhandled(error));
        }
    }

    /// Transition a module and carry out the resulting effects.
    ///
    /// Returns whether an error reached a callback or a live dependent.
    fn enter(&mut self, id: ModuleId, to: Status) -> bool {
        let Some(module) = self.registry.module_mut(id) else {
            return false;
        };
        let effects = match module.transition(to) {
            Ok(effects) => effects,
            Err(err) => {
                warn!(target: "modloader::module", name = module.name(), error = %err, "Transition rejected");
                return false;
            }
        };
        let mut delivered = false;
        for effect in effects {
            delivered |= self.apply(id, effect);
        }
        delivered
    }

    fn apply(&mut self, id: ModuleId, effect: Effect) -> bool {
        let Some(module) = self.registry.module_mut(id) else {
            return false;
        };
        match effect {
            Effect::Fetch => {
                let name = module.name().to_string();
                self.fetch(&name);
                false
            }
            Effect::InvokeFactory => {
                self.jobs.push_back(Job::Evaluate(id));
                false
            }
            Effect::InvokeErrorHandler => {
                let error = module.error().cloned();
                match (module.take_error_callback(), error) {
                    (Some(handler), Some(error)) => {
                        self.jobs.push_back(Job::ModuleFailed { handler, error });
                        true
                    }
                    _ => false,
                }
            }
            Effect::NotifyDependents => {
                let outcome = match module.status() {
                    Status::Success => Outcome::Success,
                    _ => match module.error() {
                        Some(error) => Outcome::Error(error.clone()),
                        None => return false,
                    },
                };
                let dependents = module.take_dependents();
                trace!(
                    target: "modloader::module",
                    name = module.name(),
                    count = dependents.len(),
                    "Notifying dependents"
                );
                let mut delivered = false;
                for dependent in dependents {
                    delivered |= self.notify(dependent, outcome.clone());
                }
                delivered
            }
        }
    }
}

impl<V> std::fmt::Debug for Context<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("base_path", &self.base_path)
            .field("registry", &self.registry)
            .field("queued_jobs", &self.jobs.len())
            .finish()
    }
}
