//! Tokio Local-Task Host
//!
//! Each fetch becomes a `spawn_local` task that yields once before running
//! its script, so completions arrive from the runtime instead of the caller.
//! Must be used inside a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::script_host::{Script, NOT_FOUND};
use crate::loader::{Completion, FetchRequest, Loader, Transport};

/// Transport that serves registered scripts from tokio local tasks.
pub struct LocalTaskHost<V> {
    scripts: Rc<RefCell<HashMap<String, Script<V>>>>,
}

impl<V: Clone + 'static> LocalTaskHost<V> {
    pub fn new() -> Self {
        Self {
            scripts: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Make `script` the body served for `path`.
    pub fn register(&self, path: impl Into<String>, script: impl Fn(&Loader<V>) + 'static) {
        self.scripts.borrow_mut().insert(path.into(), Rc::new(script));
    }
}

impl<V: Clone + 'static> Default for LocalTaskHost<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> Transport<V> for LocalTaskHost<V> {
    fn fetch(&self, request: FetchRequest, completion: Completion<V>) {
        let script = self.scripts.borrow().get(&request.path).cloned();
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            let Some(script) = script else {
                debug!(target: "modloader::host", path = %request.path, "No script registered");
                completion.failed(NOT_FOUND);
                return;
            };
            if let Some(loader) = completion.loader() {
                debug!(target: "modloader::host", path = %request.path, "Running script");
                script(&loader);
            }
            completion.loaded();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadError, Status};
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn test_require_async_resolves_through_local_tasks() {
        LocalSet::new()
            .run_until(async {
                let host = LocalTaskHost::new();
                host.register("lib/a.js", |loader: &Loader<u32>| {
                    let _ = loader.define("a", ["b"], |deps| Ok(Some(deps[0] + 1)));
                });
                host.register("lib/b.js", |loader: &Loader<u32>| {
                    let _ = loader.define("b", Vec::<String>::new(), |_| Ok(Some(41)));
                });
                let loader = Loader::new("lib/", host);

                let values = loader.require_async(["a"]).await;
                assert_eq!(values, Ok(vec![42]));
                assert_eq!(loader.module_status("b"), Some(Status::Success));
            })
            .await;
    }

    #[tokio::test]
    async fn test_require_async_reports_missing_script() {
        LocalSet::new()
            .run_until(async {
                let loader: Loader<u32> = Loader::new("", LocalTaskHost::new());

                let result = loader.require_async(["nowhere"]).await;
                assert!(matches!(
                    result,
                    Err(LoadError::FetchFailed { ref name, .. }) if name == "nowhere"
                ));
            })
            .await;
    }

    #[tokio::test]
    async fn test_require_async_empty_is_ready() {
        let loader: Loader<u32> = Loader::new("", LocalTaskHost::new());
        assert_eq!(loader.require_async(Vec::<String>::new()).await, Ok(vec![]));
    }
}
