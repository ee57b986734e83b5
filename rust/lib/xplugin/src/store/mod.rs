//! Store contract and module descriptors.
//!
//! The wiring and emitter machinery only ever talks to a store through the
//! [`Store`] trait: `commit`, `dispatch`, `watch`, `register_module`, plus
//! read access to the state tree and the getters map. [`ReactiveStore`] is
//! the bundled implementation; hosts may bring their own.

mod deferred;
mod reactive;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::XError;
use crate::scheduler::Scheduler;
use crate::value::SubscriptionId;

pub use deferred::Deferred;
pub use reactive::{ActionContext, ReactiveStore};

/// Shared handle to a store.
pub type StoreRef = Arc<dyn Store>;

/// A boxed, `Send`-able future returned by actions.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, XError>> + Send>>;

/// Derived, read-only view: `(module state, module getters) -> value`.
pub type Getter = Arc<dyn Fn(&Value, &dyn Getters) -> Value + Send + Sync>;

/// Synchronous state transition on the module's own state.
pub type Mutation = Arc<dyn Fn(&mut Value, Option<Value>) + Send + Sync>;

/// Possibly asynchronous orchestration. The closure body runs synchronously
/// on dispatch; the returned future carries the rest.
pub type Action = Arc<dyn Fn(ActionContext, Option<Value>) -> ActionFuture + Send + Sync>;

/// Watch selector over the root state and root getters.
pub type WatchSelector = Box<dyn Fn(&Value, &dyn Getters) -> Value + Send + Sync>;

/// Watch callback: `(new, old)`.
pub type WatchCallback = Box<dyn Fn(&Value, &Value) + Send + Sync>;

/// Returns `true` when two selected values count as unchanged.
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Named lookup of derived values.
pub trait Getters {
    fn get(&self, name: &str) -> Option<Value>;
}

/// Getters view that reads through a store's namespaced getter keys.
pub struct StoreGetters<'a>(pub &'a dyn Store);

impl Getters for StoreGetters<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.getter(name)
    }
}

/// Getters view with nothing in it.
pub struct NoGetters;

impl Getters for NoGetters {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Options passed through to [`Store::watch`].
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Replaces the default value-equality check. Return `true` for "unchanged".
    pub comparator: Option<Comparator>,
}

impl WatchOptions {
    pub fn with_comparator<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            comparator: Some(Arc::new(f)),
        }
    }

    /// Whether `new` differs from `old` under these options.
    pub fn changed(&self, new: &Value, old: &Value) -> bool {
        match &self.comparator {
            Some(same) => !same(new, old),
            None => new != old,
        }
    }
}

/// The store handle contract consumed by wires, emitters and the installer.
pub trait Store: Send + Sync {
    /// Run the mutation(s) registered under `name` with `payload`.
    fn commit(&self, name: &str, payload: Option<Value>) -> Result<(), XError>;

    /// Run the action(s) registered under `name`. The result is always deferred.
    fn dispatch(&self, name: &str, payload: Option<Value>) -> Deferred;

    /// Observe `selector` and call `callback` whenever its value changes.
    fn watch(
        &self,
        selector: WatchSelector,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> SubscriptionId;

    /// Stop a watch. Returns `true` if it was active.
    fn unwatch(&self, id: SubscriptionId) -> bool;

    /// Register `module` at `path` in the state tree.
    fn register_module(&self, path: &[&str], module: StoreModule) -> Result<(), XError>;

    /// Whether a module is registered at `path`.
    fn has_module(&self, path: &[&str]) -> bool;

    /// Snapshot of the whole state tree.
    fn state(&self) -> Value;

    /// Snapshot of the state at `path`, if any.
    fn state_at(&self, path: &[&str]) -> Option<Value>;

    /// Evaluate a getter by its full (namespaced) key.
    fn getter(&self, key: &str) -> Option<Value>;

    /// Tick the store flushes its watchers on, if it has one. The installer
    /// runs the bus on it so emitters fire once per tick.
    fn scheduler(&self) -> Option<&Scheduler> {
        None
    }
}

/// A reactive state container: state, getters, mutations, actions.
///
/// ```ignore
/// let module = StoreModule::new(json!({"query": ""}))
///     .getter("trimmedQuery", |state, _| json!(state["query"].as_str().unwrap_or("").trim()))
///     .mutation("setQuery", |state, payload| state["query"] = payload.unwrap_or_default());
/// ```
#[derive(Clone, Default)]
pub struct StoreModule {
    pub state: Value,
    pub getters: IndexMap<String, Getter>,
    pub mutations: IndexMap<String, Mutation>,
    pub actions: IndexMap<String, Action>,
    /// Namespaced modules expose their members as `<path>/<name>`.
    pub namespaced: bool,
}

impl StoreModule {
    pub fn new(state: Value) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn getter<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, &dyn Getters) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn mutation<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Value, Option<Value>) + Send + Sync + 'static,
    {
        self.mutations.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn action<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> ActionFuture + Send + Sync + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    pub fn getter_names(&self) -> Vec<String> {
        self.getters.keys().cloned().collect()
    }
}

/// Namespace prefix for a module registered at `path`: `a/b/` or empty.
pub fn namespace_for<S: AsRef<str>>(path: &[S], namespaced: bool) -> String {
    if !namespaced || path.is_empty() {
        return String::new();
    }
    let mut ns = crate::value::join_path(path);
    ns.push('/');
    ns
}
