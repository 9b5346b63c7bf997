//! Module Entity
//!
//! A `Module` is the named, memoized unit of work. It exists either as a
//! placeholder (someone referenced the name, the script is on its way) or as
//! a definition (factory and dependency list known). The same instance, and
//! therefore the same `ModuleId`, survives re-definition so dependents that
//! attached early stay attached.

use smallvec::SmallVec;
use tracing::trace;

use super::error::LoadError;
use super::status::{Effects, Status, TransitionError};
use super::task::TaskId;

/// Unique identifier for a module.
///
/// Assigned sequentially as modules are created, placeholders included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u64);

impl ModuleId {
    /// Create a new ModuleId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

/// Something waiting on a module.
///
/// Module edges carry the definition epoch they were recorded under; an edge
/// from a superseded definition is dropped when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dependent {
    Module { id: ModuleId, epoch: u32 },
    Task(TaskId),
}

/// What a finished dependency reports to its dependents.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success,
    Error(LoadError),
}

/// Boxed error type a factory may return.
pub type FactoryError = Box<dyn std::error::Error>;

/// Builds a module's export from its dependencies' exports.
///
/// `Ok(None)` means the factory ran but produced nothing, which is an error.
pub type Factory<V> = Box<dyn FnOnce(Vec<V>) -> Result<Option<V>, FactoryError>>;

/// Receives the error that ended a module or task.
pub type ErrorCallback = Box<dyn FnOnce(LoadError)>;

/// A named module and its loading state.
pub struct Module<V> {
    id: ModuleId,
    name: String,
    status: Status,
    epoch: u32,
    deps: Vec<String>,
    remaining: usize,
    factory: Option<Factory<V>>,
    on_error: Option<ErrorCallback>,
    export: Option<V>,
    error: Option<LoadError>,
    dependents: SmallVec<[Dependent; 4]>,
}

impl<V> Module<V> {
    /// Create a module with no definition yet.
    pub fn placeholder(id: ModuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: Status::Waiting,
            epoch: 0,
            deps: Vec::new(),
            remaining: 0,
            factory: None,
            on_error: None,
            export: None,
            error: None,
            dependents: SmallVec::new(),
        }
    }

    /// Record a (re)definition.
    ///
    /// Overwrites the factory and dependency list, resets the remaining count
    /// and returns the module to `Waiting`. Attached dependents are kept.
    pub fn init(
        &mut self,
        deps: Vec<String>,
        factory: Factory<V>,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), TransitionError> {
        if self.status != Status::Waiting {
            self.transition(Status::Waiting)?;
        }
        self.remaining = deps.len();
        self.deps = deps;
        self.factory = Some(factory);
        self.on_error = on_error;
        self.error = None;
        self.epoch += 1;
        Ok(())
    }

    /// Move to `to`, returning the effects the caller must perform.
    pub fn transition(&mut self, to: Status) -> Result<Effects, TransitionError> {
        let effects = self.status.transition(to)?;
        trace!(
            target: "modloader::module",
            name = %self.name,
            id = self.id.value(),
            from = %self.status,
            to = %to,
            "Status transition"
        );
        self.status = to;
        Ok(effects)
    }

    /// Count one resolved dependency. Returns true when none remain.
    pub fn decrement(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    /// Register interest in this module's outcome.
    pub fn attach(&mut self, dependent: Dependent) {
        self.dependents.push(dependent);
    }

    /// Hand over the dependents list, leaving it empty.
    pub fn take_dependents(&mut self) -> SmallVec<[Dependent; 4]> {
        std::mem::take(&mut self.dependents)
    }

    pub fn take_factory(&mut self) -> Option<Factory<V>> {
        self.factory.take()
    }

    pub fn take_error_callback(&mut self) -> Option<ErrorCallback> {
        self.on_error.take()
    }

    /// Memoize the export. Only the first value is kept.
    pub fn set_export(&mut self, value: V) {
        if self.export.is_none() {
            self.export = Some(value);
        }
    }

    pub fn set_error(&mut self, error: LoadError) {
        self.error = Some(error);
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Definition generation; bumps on every `init`, 0 for a bare placeholder.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn export(&self) -> Option<&V> {
        self.export.as_ref()
    }

    /// The error retained after the module failed.
    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    pub fn has_error_callback(&self) -> bool {
        self.on_error.is_some()
    }

    pub fn dependents(&self) -> &[Dependent] {
        &self.dependents
    }
}

impl<V> std::fmt::Debug for Module<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("epoch", &self.epoch)
            .field("deps", &self.deps)
            .field("remaining", &self.remaining)
            .field("dependents", &self.dependents.len())
            .field("has_export", &self.export.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: &'static str) -> Factory<String> {
        Box::new(move |_| Ok(Some(value.to_string())))
    }

    #[test]
    fn test_module_id() {
        let id1 = ModuleId::new(1);
        let id2 = ModuleId::new(1);
        let id3 = ModuleId::new(2);

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1.value(), 1);
        assert_eq!(id3.to_string(), "ModuleId(2)");
    }

    #[test]
    fn test_placeholder_starts_waiting() {
        let module: Module<String> = Module::placeholder(ModuleId::new(0), "util");
        assert_eq!(module.status(), Status::Waiting);
        assert_eq!(module.name(), "util");
        assert_eq!(module.epoch(), 0);
        assert!(module.export().is_none());
    }

    #[test]
    fn test_init_from_fetching() {
        let mut module = Module::placeholder(ModuleId::new(0), "util");
        module.transition(Status::Fetching).unwrap();
        module.attach(Dependent::Task(TaskId::new(7)));

        module
            .init(vec!["a".to_string(), "b".to_string()], constant("u"), None)
            .unwrap();

        assert_eq!(module.status(), Status::Waiting);
        assert_eq!(module.remaining(), 2);
        assert_eq!(module.epoch(), 1);
        // Early dependents survive the definition.
        assert_eq!(module.dependents(), &[Dependent::Task(TaskId::new(7))]);
    }

    #[test]
    fn test_init_rejected_after_success() {
        let mut module = Module::placeholder(ModuleId::new(0), "util");
        module.init(Vec::new(), constant("u"), None).unwrap();
        module.transition(Status::Ready).unwrap();
        module.transition(Status::Success).unwrap();

        assert!(module.init(Vec::new(), constant("v"), None).is_err());
    }

    #[test]
    fn test_redefinition_after_error_clears_error() {
        let mut module = Module::placeholder(ModuleId::new(0), "util");
        module.transition(Status::Fetching).unwrap();
        module.transition(Status::Error).unwrap();
        module.set_error(LoadError::NoExport("util".to_string()));

        module.init(Vec::new(), constant("u"), None).unwrap();
        assert_eq!(module.status(), Status::Waiting);
        assert!(module.error().is_none());
    }

    #[test]
    fn test_decrement_reaches_zero_once() {
        let mut module = Module::placeholder(ModuleId::new(0), "app");
        module
            .init(vec!["a".to_string(), "b".to_string()], constant("x"), None)
            .unwrap();

        assert!(!module.decrement());
        assert!(module.decrement());
        assert_eq!(module.remaining(), 0);
    }

    #[test]
    fn test_export_memoized_once() {
        let mut module: Module<String> = Module::placeholder(ModuleId::new(0), "app");
        module.set_export("first".to_string());
        module.set_export("second".to_string());
        assert_eq!(module.export().map(String::as_str), Some("first"));
    }

    #[test]
    fn test_take_dependents_clears() {
        let mut module: Module<String> = Module::placeholder(ModuleId::new(0), "app");
        module.attach(Dependent::Task(TaskId::new(1)));
        module.attach(Dependent::Module {
            id: ModuleId::new(3),
            epoch: 1,
        });

        let taken = module.take_dependents();
        assert_eq!(taken.len(), 2);
        assert!(module.dependents().is_empty());
    }
}
