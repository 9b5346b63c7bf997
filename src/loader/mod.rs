//! Asynchronous Module Loader
//!
//! This module provides the dependency-resolution engine:
//! - `Status` - Module state machine and the effects each transition requires
//! - `Module` / `ModuleId` - Named, memoized unit of work
//! - `Task` / `TaskId` - One-shot `require` request
//! - `Registry` - Name -> module and id -> task mappings
//! - `Context` - Base path, registry, dependency walk and notification
//! - `Loader` - Host-facing handle exposing `define` and `require`
//! - `Transport` / `Completion` - Injected script fetching
//! - `EntryPoint` - `data-main` parsing for bootstrap

mod context;
mod entry;
mod error;
mod module;
mod registry;
mod runtime;
mod status;
mod task;
mod transport;

pub use context::Context;
pub use entry::EntryPoint;
pub use error::{LoadError, LoadResult};
pub use module::{
    Dependent, ErrorCallback, Factory, FactoryError, Module, ModuleId, Outcome,
};
pub use registry::Registry;
pub use runtime::{Loader, WeakLoader};
pub use status::{Effect, Effects, Status, TransitionError};
pub use task::{Task, TaskCallback, TaskId, TaskState};
pub use transport::{Completion, FetchKind, FetchRequest, Transport, SCRIPT_EXTENSION};
