//! Loader Handle
//!
//! `Loader` is what host code holds. It wraps the `Context` in a `RefCell`
//! and owns the transport. Each public entry point mutates the context, then
//! drains the job queue: fetches, factories and callbacks run one at a time
//! with the context released, so they may call back into the loader. A call
//! made from inside a callback only queues work; the outermost drain runs it
//! before returning.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use super::context::{Context, Evaluation, Job};
use super::entry::EntryPoint;
use super::error::{LoadError, LoadResult};
use super::module::{FactoryError, ModuleId};
use super::status::Status;
use super::task::{TaskId, TaskState};
use super::transport::{Completion, FetchRequest, Transport};

type UnhandledErrorHandler = Rc<dyn Fn(&LoadError)>;

struct Inner<V> {
    context: RefCell<Context<V>>,
    transport: Box<dyn Transport<V>>,
    draining: Cell<bool>,
    error_handler: RefCell<Option<UnhandledErrorHandler>>,
    unhandled: RefCell<Vec<LoadError>>,
}

/// Shared handle to one module graph.
///
/// Cloning is cheap and every clone drives the same graph. Not `Send`: all
/// loading happens on one thread.
pub struct Loader<V> {
    inner: Rc<Inner<V>>,
}

/// Non-owning handle held by in-flight fetches.
pub struct WeakLoader<V> {
    inner: Weak<Inner<V>>,
}

impl<V> Clone for Loader<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> Clone for WeakLoader<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V> WeakLoader<V> {
    pub fn upgrade(&self) -> Option<Loader<V>> {
        self.inner.upgrade().map(|inner| Loader { inner })
    }
}

/// Resets the draining flag even if a callback panics.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<V: Clone + 'static> Loader<V> {
    /// Create a loader resolving module names against `base_path`.
    pub fn new(base_path: impl Into<String>, transport: impl Transport<V> + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                context: RefCell::new(Context::new(base_path)),
                transport: Box::new(transport),
                draining: Cell::new(false),
                error_handler: RefCell::new(None),
                unhandled: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Parse a `data-main` style declaration and start the page's entry script.
    ///
    /// A malformed declaration is fatal: no loader is created.
    pub fn bootstrap(
        data_main: &str,
        transport: impl Transport<V> + 'static,
    ) -> LoadResult<Self> {
        let entry = EntryPoint::parse(data_main)?;
        Ok(Self::with_entry(&entry, transport))
    }

    /// Create a loader rooted at `entry` and fetch the entry script.
    pub fn with_entry(entry: &EntryPoint, transport: impl Transport<V> + 'static) -> Self {
        let loader = Self::new(entry.base_path(), transport);
        loader
            .inner
            .context
            .borrow_mut()
            .fetch_entry(entry.module_name(), &entry.entry_file());
        loader.drain();
        loader
    }

    /// Register (or re-register) a module.
    ///
    /// The factory runs once every dependency has resolved and receives their
    /// exports in the order `deps` lists them.
    pub fn define<I, S, F>(&self, name: &str, deps: I, factory: F) -> LoadResult<ModuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<V>) -> Result<Option<V>, FactoryError> + 'static,
    {
        self.define_inner(name, collect_names(deps), Box::new(factory), None)
    }

    /// Like `define`, with a callback for the module's own failure.
    pub fn define_with_error<I, S, F, E>(
        &self,
        name: &str,
        deps: I,
        factory: F,
        on_error: E,
    ) -> LoadResult<ModuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<V>) -> Result<Option<V>, FactoryError> + 'static,
        E: FnOnce(LoadError) + 'static,
    {
        self.define_inner(
            name,
            collect_names(deps),
            Box::new(factory),
            Some(Box::new(on_error)),
        )
    }

    /// Ask for `deps` without becoming a module.
    ///
    /// `callback` receives the exports in declaration order once all of them
    /// resolved. A failure nobody handles goes to the unhandled-error path.
    pub fn require<I, S, C>(&self, deps: I, callback: C) -> TaskId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        C: FnOnce(Vec<V>) + 'static,
    {
        self.require_inner(collect_names(deps), Box::new(callback), None)
    }

    /// Like `require`, with a callback receiving the first failure.
    pub fn require_with_error<I, S, C, E>(&self, deps: I, callback: C, on_error: E) -> TaskId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        C: FnOnce(Vec<V>) + 'static,
        E: FnOnce(LoadError) + 'static,
    {
        self.require_inner(
            collect_names(deps),
            Box::new(callback),
            Some(Box::new(on_error)),
        )
    }

    /// Resolve `deps` as a future.
    ///
    /// The future completes once the loader's transport has delivered every
    /// script; it does not drive the transport itself.
    #[cfg(feature = "async")]
    pub fn require_async<I, S>(
        &self,
        deps: I,
    ) -> impl std::future::Future<Output = LoadResult<Vec<V>>> + 'static
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let on_success = Rc::new(RefCell::new(Some(tx)));
        let on_failure = Rc::clone(&on_success);
        self.require_with_error(
            deps,
            move |values| {
                if let Some(tx) = on_success.borrow_mut().take() {
                    let _ = tx.send(Ok(values));
                }
            },
            move |error| {
                if let Some(tx) = on_failure.borrow_mut().take() {
                    let _ = tx.send(Err(error));
                }
            },
        );
        async move { rx.await.unwrap_or(Err(LoadError::LoaderDropped)) }
    }

    /// Install the handler for failures no callback claimed.
    ///
    /// Without one they are collected for `take_unhandled_errors`.
    pub fn set_error_handler(&self, handler: impl Fn(&LoadError) + 'static) {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Drain failures collected while no error handler was installed.
    pub fn take_unhandled_errors(&self) -> Vec<LoadError> {
        std::mem::take(&mut *self.inner.unhandled.borrow_mut())
    }

    /// Read access to the context.
    pub fn inspect<R>(&self, f: impl FnOnce(&Context<V>) -> R) -> R {
        f(&self.inner.context.borrow())
    }

    pub fn module_status(&self, name: &str) -> Option<Status> {
        self.inspect(|ctx| ctx.get_module(name).map(|m| m.status()))
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.inspect(|ctx| ctx.registry().lookup(name))
    }

    /// The memoized export of `name`, once it resolved.
    pub fn export(&self, name: &str) -> Option<V> {
        self.inspect(|ctx| ctx.get_module(name).and_then(|m| m.export().cloned()))
    }

    /// The error retained by a failed module.
    pub fn module_error(&self, name: &str) -> Option<LoadError> {
        self.inspect(|ctx| ctx.get_module(name).and_then(|m| m.error().cloned()))
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.inspect(|ctx| ctx.get_task(id).map(|t| t.state()))
    }

    pub fn module_count(&self) -> usize {
        self.inspect(|ctx| ctx.registry().module_count())
    }

    pub fn task_count(&self) -> usize {
        self.inspect(|ctx| ctx.registry().task_count())
    }

    pub fn base_path(&self) -> String {
        self.inspect(|ctx| ctx.base_path().to_string())
    }

    pub fn resolve_path(&self, name: &str) -> String {
        self.inspect(|ctx| ctx.resolve_path(name))
    }

    pub fn downgrade(&self) -> WeakLoader<V> {
        WeakLoader {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn script_loaded(&self, request: &FetchRequest) {
        self.inner.context.borrow_mut().fetch_loaded(request);
        self.drain();
    }

    pub(crate) fn script_failed(&self, request: &FetchRequest, reason: String) {
        self.inner
            .context
            .borrow_mut()
            .fetch_failed(request, reason);
        self.drain();
    }

    fn define_inner(
        &self,
        name: &str,
        deps: Vec<String>,
        factory: super::module::Factory<V>,
        on_error: Option<super::module::ErrorCallback>,
    ) -> LoadResult<ModuleId> {
        let result = self
            .inner
            .context
            .borrow_mut()
            .define(name, deps, factory, on_error);
        self.drain();
        result
    }

    fn require_inner(
        &self,
        deps: Vec<String>,
        callback: super::task::TaskCallback<V>,
        on_error: Option<super::module::ErrorCallback>,
    ) -> TaskId {
        let id = self
            .inner
            .context
            .borrow_mut()
            .require(deps, callback, on_error);
        self.drain();
        id
    }

    /// Run queued jobs until none are left. Re-entrant calls return at once.
    fn drain(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&self.inner.draining);
        loop {
            let job = self.inner.context.borrow_mut().next_job();
            let Some(job) = job else {
                break;
            };
            self.run(job);
        }
    }

    fn run(&self, job: Job<V>) {
        match job {
            Job::Fetch(request) => {
                let completion = Completion::new(self.downgrade(), request.clone());
                self.inner.transport.fetch(request, completion);
            }
            Job::Evaluate(id) => {
                let evaluation = self.inner.context.borrow_mut().begin_evaluation(id);
                if let Some(Evaluation {
                    name,
                    factory,
                    args,
                }) = evaluation
                {
                    trace!(target: "modloader::module", name = %name, args = args.len(), "Invoking factory");
                    let result = factory(args);
                    self.inner
                        .context
                        .borrow_mut()
                        .finish_evaluation(id, result);
                }
            }
            Job::ModuleFailed { handler, error } => handler(error),
            Job::TaskCompleted { callback, values } => callback(values),
            Job::TaskFailed { handler, error } => handler(error),
            Job::Unhandled(error) => self.report_unhandled(error),
        }
    }

    fn report_unhandled(&self, error: LoadError) {
        error!(target: "modloader::loader", %error, "Unhandled load failure");
        let handler = self.inner.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(&error),
            None => self.inner.unhandled.borrow_mut().push(error),
        }
    }
}

impl<V> std::fmt::Debug for Loader<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("context", &self.inner.context)
            .field("draining", &self.inner.draining.get())
            .finish()
    }
}

fn collect_names<I, S>(deps: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    deps.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records requests; scripts are run by hand.
    #[derive(Default)]
    struct Recorder {
        fetched: RefCell<Vec<Completion<u32>>>,
    }

    impl Transport<u32> for Recorder {
        fn fetch(&self, _request: FetchRequest, completion: Completion<u32>) {
            self.fetched.borrow_mut().push(completion);
        }
    }

    #[test]
    fn test_empty_require_runs_before_returning() {
        let loader: Loader<u32> = Loader::new("lib/", Recorder::default());
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();

        let id = loader.require(Vec::<String>::new(), move |values| {
            assert!(values.is_empty());
            flag.set(true);
        });

        assert!(called.get());
        assert_eq!(loader.task_state(id), Some(TaskState::Completed));
        assert!(!loader.inspect(|ctx| ctx.has_pending_jobs()));
    }

    #[test]
    fn test_factory_can_reenter_loader() {
        let loader: Loader<u32> = Loader::new("", Recorder::default());
        let inner = loader.clone();
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();

        loader
            .define("outer", Vec::<String>::new(), move |_| {
                inner.define("inner", Vec::<String>::new(), |_| Ok(Some(5)))?;
                inner.require(["inner"], move |values| sink.set(values[0]));
                Ok(Some(1))
            })
            .unwrap();

        assert_eq!(loader.export("outer"), Some(1));
        assert_eq!(loader.export("inner"), Some(5));
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn test_unhandled_errors_collected() {
        let loader: Loader<u32> = Loader::new("", Recorder::default());
        loader
            .define("empty", Vec::<String>::new(), |_| Ok(None))
            .unwrap();

        let errors = loader.take_unhandled_errors();
        assert_eq!(errors, vec![LoadError::NoExport("empty".to_string())]);
        assert!(loader.take_unhandled_errors().is_empty());
    }

    #[test]
    fn test_error_handler_receives_unhandled() {
        let recorder = Rc::new(Recorder::default());
        let loader: Loader<u32> = Loader::new("", recorder.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        loader.set_error_handler(move |error| sink.borrow_mut().push(error.clone()));

        loader.require(["missing"], |_| panic!("must not complete"));
        let completion = recorder.fetched.borrow_mut().pop().unwrap();
        assert_eq!(completion.request().path, "missing.js");
        completion.failed("404");

        assert!(loader.take_unhandled_errors().is_empty());
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(
            &seen.borrow()[0],
            LoadError::FetchFailed { name, reason, .. } if name == "missing" && reason == "404"
        ));
    }
}
