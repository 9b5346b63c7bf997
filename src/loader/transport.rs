//! Script Transport
//!
//! The loader never loads scripts itself. It hands a `FetchRequest` to a
//! `Transport` together with a `Completion`, and the transport reports back
//! through the completion once the script has run or failed. Running the
//! script is what registers the module: the script calls `define` on the
//! loader it gets from `Completion::loader`.

use std::rc::Rc;

use tracing::debug;

use super::runtime::{Loader, WeakLoader};

/// File extension appended to module names when building fetch paths.
pub const SCRIPT_EXTENSION: &str = ".js";

/// Why a script is being fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchKind {
    /// The page's entry script. Not a module; nothing waits on it.
    Entry,
    /// A module script requested by a dependent.
    Module,
}

/// A script the loader wants loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Module name, or the entry file's stem for `FetchKind::Entry`.
    pub name: String,
    /// Path built from the base path, the name and `SCRIPT_EXTENSION`.
    pub path: String,
    pub kind: FetchKind,
}

impl FetchRequest {
    pub fn module(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: FetchKind::Module,
        }
    }

    pub fn entry(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: FetchKind::Entry,
        }
    }
}

/// Loads scripts on the loader's behalf.
///
/// `fetch` must not block waiting for the script. It either starts the load
/// and returns, or runs the script immediately; in both cases it reports the
/// result exactly once through `completion`.
pub trait Transport<V> {
    fn fetch(&self, request: FetchRequest, completion: Completion<V>);
}

impl<V, T: Transport<V> + ?Sized> Transport<V> for Rc<T> {
    fn fetch(&self, request: FetchRequest, completion: Completion<V>) {
        (**self).fetch(request, completion)
    }
}

impl<V, T: Transport<V> + ?Sized> Transport<V> for Box<T> {
    fn fetch(&self, request: FetchRequest, completion: Completion<V>) {
        (**self).fetch(request, completion)
    }
}

/// One-shot result channel for a single fetch.
///
/// Consumed by `loaded` or `failed`. Dropping it without reporting leaves the
/// module pending.
pub struct Completion<V> {
    loader: WeakLoader<V>,
    request: FetchRequest,
}

impl<V: Clone + 'static> Completion<V> {
    pub(crate) fn new(loader: WeakLoader<V>, request: FetchRequest) -> Self {
        Self { loader, request }
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// The loader that issued the fetch, if it is still alive.
    pub fn loader(&self) -> Option<Loader<V>> {
        self.loader.upgrade()
    }

    /// The script ran to completion.
    pub fn loaded(self) {
        match self.loader.upgrade() {
            Some(loader) => loader.script_loaded(&self.request),
            None => debug!(
                target: "modloader::transport",
                path = %self.request.path,
                "Loader dropped before script finished loading"
            ),
        }
    }

    /// The script could not be loaded.
    pub fn failed(self, reason: impl Into<String>) {
        match self.loader.upgrade() {
            Some(loader) => loader.script_failed(&self.request, reason.into()),
            None => debug!(
                target: "modloader::transport",
                path = %self.request.path,
                "Loader dropped before script failed"
            ),
        }
    }
}

impl<V> std::fmt::Debug for Completion<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("request", &self.request)
            .finish()
    }
}
