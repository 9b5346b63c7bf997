/// modloader - Asynchronous Module Loader
///
/// A dependency-resolving loader for named modules whose source arrives
/// asynchronously, in the style of an AMD script loader. Modules are
/// declared with `define(name, deps, factory)`; one-shot consumers ask for
/// modules with `require(deps, callback)`. Missing modules are fetched
/// through an injected `Transport`, factories run once every dependency has
/// produced its export, and failures propagate to every dependent.
///
/// # Architecture
///
/// 1. **Loader** (`loader` module)
///    - Module state machine: waiting, fetching, ready, success, error
///    - Registry of modules by name and tasks by id
///    - Dependency walk, memoized exports, error propagation
///    - `data-main` entry-point parsing for bootstrap
///
/// 2. **Hosts** (`host` module)
///    - `ScriptHost`: in-process scripts completed in any order
///    - `LocalTaskHost`: scripts completed from tokio local tasks
///    - `GraphManifest`: TOML-described module graphs
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use modloader::{CompletionOrder, Loader, ScriptHost};
///
/// let host = Rc::new(ScriptHost::new());
/// host.register("lib/greeting.js", |loader: &Loader<String>| {
///     let _ = loader.define("greeting", Vec::<String>::new(), |_| {
///         Ok(Some("hello".to_string()))
///     });
/// });
///
/// let loader = Loader::new("lib/", host.clone());
/// loader.require(["greeting"], |values| assert_eq!(values, vec!["hello"]));
/// host.run_to_idle(CompletionOrder::Fifo);
/// assert_eq!(loader.export("greeting").as_deref(), Some("hello"));
/// ```
///
/// # Threading
///
/// A loader is single-threaded (`Rc`/`RefCell`). Callbacks run after the
/// loader releases its internal state, so they may call `define` and
/// `require` again.
pub mod host;
pub mod loader;

pub use host::{CompletionOrder, GraphManifest, ManifestError, ScriptHost};
#[cfg(feature = "async")]
pub use host::LocalTaskHost;
pub use loader::{
    EntryPoint, FetchRequest, LoadError, LoadResult, Loader, ModuleId, Status, TaskId, TaskState,
    Transport,
};
