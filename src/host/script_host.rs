//! In-Process Script Host
//!
//! A `Transport` whose scripts are closures registered by path. Fetches are
//! queued, not run: the caller decides when each one completes and in which
//! order, the way a browser delivers script loads whenever the network
//! finishes them. Fetching a path with no registered script fails, like a
//! 404.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::loader::{Completion, FetchRequest, Loader, Transport};

/// A script body. Running it usually calls `define` or `require`.
pub type Script<V> = Rc<dyn Fn(&Loader<V>)>;

/// Order in which `run_to_idle` completes queued fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompletionOrder {
    /// Oldest fetch first.
    #[default]
    Fifo,
    /// Newest fetch first.
    Lifo,
}

/// Reason reported for paths without a registered script.
pub const NOT_FOUND: &str = "script not found";

/// Script table plus the queue of fetches not yet completed.
pub struct ScriptHost<V> {
    scripts: RefCell<HashMap<String, Script<V>>>,
    pending: RefCell<VecDeque<Completion<V>>>,
    history: RefCell<Vec<FetchRequest>>,
}

impl<V: Clone + 'static> ScriptHost<V> {
    pub fn new() -> Self {
        Self {
            scripts: RefCell::new(HashMap::new()),
            pending: RefCell::new(VecDeque::new()),
            history: RefCell::new(Vec::new()),
        }
    }

    /// Make `script` the body served for `path`.
    pub fn register(&self, path: impl Into<String>, script: impl Fn(&Loader<V>) + 'static) {
        self.scripts.borrow_mut().insert(path.into(), Rc::new(script));
    }

    /// Paths of fetches still waiting to complete, oldest first.
    pub fn pending_paths(&self) -> Vec<String> {
        self.pending
            .borrow()
            .iter()
            .map(|completion| completion.request().path.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Every request received so far, in arrival order.
    pub fn fetch_log(&self) -> Vec<FetchRequest> {
        self.history.borrow().clone()
    }

    /// Number of requests received for `path`.
    pub fn fetch_count(&self, path: &str) -> usize {
        self.history
            .borrow()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    /// Complete the oldest pending fetch of `path`. Returns false if none.
    pub fn complete(&self, path: &str) -> bool {
        match self.take_pending(path) {
            Some(completion) => {
                self.deliver(completion);
                true
            }
            None => false,
        }
    }

    /// Fail the oldest pending fetch of `path` with `reason`.
    pub fn fail(&self, path: &str, reason: &str) -> bool {
        match self.take_pending(path) {
            Some(completion) => {
                debug!(target: "modloader::host", path, reason, "Failing fetch");
                completion.failed(reason);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest pending fetch.
    pub fn complete_next(&self) -> bool {
        let completion = self.pending.borrow_mut().pop_front();
        completion.map(|c| self.deliver(c)).is_some()
    }

    /// Complete the newest pending fetch.
    pub fn complete_latest(&self) -> bool {
        let completion = self.pending.borrow_mut().pop_back();
        completion.map(|c| self.deliver(c)).is_some()
    }

    /// Complete fetches until the queue stays empty. Returns how many ran.
    pub fn run_to_idle(&self, order: CompletionOrder) -> usize {
        let mut completed = 0;
        loop {
            let progressed = match order {
                CompletionOrder::Fifo => self.complete_next(),
                CompletionOrder::Lifo => self.complete_latest(),
            };
            if !progressed {
                return completed;
            }
            completed += 1;
        }
    }

    fn take_pending(&self, path: &str) -> Option<Completion<V>> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .position(|completion| completion.request().path == path)?;
        pending.remove(index)
    }

    /// Run the script behind `completion` and report the outcome.
    fn deliver(&self, completion: Completion<V>) {
        let path = completion.request().path.clone();
        let script = self.scripts.borrow().get(&path).cloned();
        let Some(script) = script else {
            debug!(target: "modloader::host", path = %path, "No script registered");
            completion.failed(NOT_FOUND);
            return;
        };
        if let Some(loader) = completion.loader() {
            debug!(target: "modloader::host", path = %path, "Running script");
            script(&loader);
        }
        completion.loaded();
    }
}

impl<V: Clone + 'static> Default for ScriptHost<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> Transport<V> for ScriptHost<V> {
    fn fetch(&self, request: FetchRequest, completion: Completion<V>) {
        self.history.borrow_mut().push(request);
        self.pending.borrow_mut().push_back(completion);
    }
}

impl<V> std::fmt::Debug for ScriptHost<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("scripts", &self.scripts.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .field("fetched", &self.history.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FetchKind, LoadError, Status};

    fn host() -> Rc<ScriptHost<u32>> {
        Rc::new(ScriptHost::new())
    }

    #[test]
    fn test_fetches_queue_until_completed() {
        let host = host();
        host.register("lib/a.js", |loader| {
            loader.define("a", Vec::<String>::new(), |_| Ok(Some(1))).unwrap();
        });
        let loader = Loader::new("lib/", host.clone());

        loader.require(["a"], |_| {});
        assert_eq!(host.pending_paths(), vec!["lib/a.js".to_string()]);
        assert_eq!(loader.module_status("a"), Some(Status::Fetching));

        assert!(host.complete("lib/a.js"));
        assert_eq!(loader.module_status("a"), Some(Status::Success));
        assert_eq!(host.pending_count(), 0);
        assert!(!host.complete("lib/a.js"));
    }

    #[test]
    fn test_unregistered_path_fails() {
        let host = host();
        let loader = Loader::new("", host.clone());
        loader.require(["ghost"], |_| {});

        assert!(host.complete_next());
        assert!(matches!(
            loader.module_error("ghost"),
            Some(LoadError::FetchFailed { reason, .. }) if reason == NOT_FOUND
        ));
    }

    #[test]
    fn test_run_to_idle_follows_new_fetches() {
        let host = host();
        host.register("a.js", |loader| {
            loader.define("a", ["b"], |deps| Ok(Some(deps[0] + 1))).unwrap();
        });
        host.register("b.js", |loader| {
            loader.define("b", Vec::<String>::new(), |_| Ok(Some(1))).unwrap();
        });
        let loader = Loader::new("", host.clone());
        loader.require(["a"], |_| {});

        assert_eq!(host.run_to_idle(CompletionOrder::Lifo), 2);
        assert_eq!(loader.export("a"), Some(2));
        let log = host.fetch_log();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|r| r.kind == FetchKind::Module));
    }

    #[test]
    fn test_fail_reports_reason() {
        let host = host();
        let loader = Loader::new("", host.clone());
        loader.require(["net"], |_| {});

        assert!(host.fail("net.js", "connection reset"));
        assert_eq!(loader.module_status("net"), Some(Status::Error));
        assert!(!host.fail("net.js", "again"));
    }
}
