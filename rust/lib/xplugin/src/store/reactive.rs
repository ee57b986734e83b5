use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::XError;
use crate::scheduler::Scheduler;
use crate::value::{at_path, at_path_mut, empty_object, join_path, SubscriptionId};

use super::{
    namespace_for, Action, ActionFuture, Deferred, Getter, Getters, Mutation, Store, StoreModule,
    StoreRef, WatchCallback, WatchOptions, WatchSelector,
};

/// A registered member bound to the state path of its module.
#[derive(Clone)]
struct Bound<T> {
    path: Vec<String>,
    namespace: String,
    handler: T,
}

#[derive(Default)]
struct Registry {
    modules: BTreeSet<String>,
    getters: HashMap<String, Bound<Getter>>,
    mutations: HashMap<String, Vec<Bound<Mutation>>>,
    actions: HashMap<String, Vec<Bound<Action>>>,
}

struct Watcher {
    id: SubscriptionId,
    selector: WatchSelector,
    callback: WatchCallback,
    options: WatchOptions,
    last: Mutex<Value>,
    active: AtomicBool,
}

/// In-memory reactive store.
///
/// - `commit(name, payload)` runs the named mutation(s) on the module state
///   and schedules a watcher flush on the scheduler.
/// - `dispatch(name, payload)` runs the named action(s); the result is a
///   [`Deferred`].
/// - `watch(selector, callback)` seeds the selector's current value and calls
///   back on the next flush in which the selected value changed.
///
/// Watchers never run inside a commit. They run when the scheduler's
/// outermost batch ends, after every mutation of the tick has applied.
pub struct ReactiveStore {
    this: Weak<ReactiveStore>,
    state: RwLock<Value>,
    registry: RwLock<Registry>,
    watchers: RwLock<Vec<Arc<Watcher>>>,
    scheduler: Scheduler,
    flush_scheduled: AtomicBool,
    next_id: AtomicU64,
}

impl ReactiveStore {
    /// Create an empty store with its own scheduler.
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Scheduler::new())
    }

    /// Create an empty store whose watcher flushes run on `scheduler`.
    pub fn with_scheduler(scheduler: Scheduler) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: RwLock::new(empty_object()),
            registry: RwLock::new(Registry::default()),
            watchers: RwLock::new(Vec::new()),
            scheduler,
            flush_scheduled: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        })
    }

    /// Number of active watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().unwrap().len()
    }

    /// Full mutation keys currently registered, sorted.
    pub fn mutation_names(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap();
        let mut names: Vec<String> = registry.mutations.keys().cloned().collect();
        names.sort();
        names
    }

    // ====================================================================
    // Watchers
    // ====================================================================

    fn schedule_flush(&self) {
        if self.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.this.clone();
        self.scheduler.defer(move || {
            if let Some(store) = this.upgrade() {
                store.flush_watchers();
            }
        });
    }

    fn flush_watchers(&self) {
        self.flush_scheduled.store(false, Ordering::Release);
        let watchers: Vec<Arc<Watcher>> = self.watchers.read().unwrap().clone();
        if watchers.is_empty() {
            return;
        }

        let (state, getters) = self.snapshot();
        let view = SnapshotGetters {
            state: &state,
            getters: &getters,
        };
        trace!(watchers = watchers.len(), "flushing store watchers");

        for watcher in watchers {
            if !watcher.active.load(Ordering::Acquire) {
                continue;
            }
            let new = (watcher.selector)(&state, &view);
            let old = {
                let mut last = watcher.last.lock().unwrap();
                if !watcher.options.changed(&new, &last) {
                    continue;
                }
                std::mem::replace(&mut *last, new.clone())
            };
            (watcher.callback)(&new, &old);
        }
    }

    fn snapshot(&self) -> (Value, HashMap<String, Bound<Getter>>) {
        let state = self.state.read().unwrap().clone();
        let getters = self.registry.read().unwrap().getters.clone();
        (state, getters)
    }

    fn store_ref(&self) -> Option<StoreRef> {
        self.this.upgrade().map(|store| store as StoreRef)
    }
}

impl Store for ReactiveStore {
    fn commit(&self, name: &str, payload: Option<Value>) -> Result<(), XError> {
        let handlers = {
            let registry = self.registry.read().unwrap();
            registry.mutations.get(name).cloned()
        };
        let Some(handlers) = handlers else {
            warn!(mutation = %name, "unknown mutation type");
            return Err(XError::UnknownMutation(name.to_string()));
        };
        trace!(mutation = %name, "commit");

        self.scheduler.batch(|| -> Result<(), XError> {
            {
                let mut state = self.state.write().unwrap();
                for bound in &handlers {
                    let local = at_path_mut(&mut state, &bound.path).ok_or_else(|| {
                        XError::InvalidPath {
                            path: join_path(&bound.path),
                            reason: "module state is missing".to_string(),
                        }
                    })?;
                    (bound.handler)(local, payload.clone());
                }
            }
            self.schedule_flush();
            Ok(())
        })
    }

    fn dispatch(&self, name: &str, payload: Option<Value>) -> Deferred {
        let handlers = {
            let registry = self.registry.read().unwrap();
            registry.actions.get(name).cloned()
        };
        let Some(handlers) = handlers else {
            warn!(action = %name, "unknown action type");
            return Deferred::ready(Err(XError::UnknownAction(name.to_string())));
        };
        let Some(store) = self.store_ref() else {
            return Deferred::ready(Err(XError::ActionDropped(name.to_string())));
        };
        trace!(action = %name, handlers = handlers.len(), "dispatch");

        let pending: Vec<ActionFuture> = self.scheduler.batch(|| {
            handlers
                .iter()
                .map(|bound| {
                    let context = ActionContext {
                        store: store.clone(),
                        path: bound.path.clone(),
                        namespace: bound.namespace.clone(),
                    };
                    (bound.handler)(context, payload.clone())
                })
                .collect()
        });

        let combined: ActionFuture = if pending.len() == 1 {
            pending
                .into_iter()
                .next()
                .unwrap_or_else(|| Box::pin(async { Ok(Value::Null) }))
        } else {
            Box::pin(async move {
                let mut results = Vec::with_capacity(pending.len());
                for future in pending {
                    results.push(future.await?);
                }
                Ok::<_, XError>(Value::Array(results))
            })
        };
        Deferred::spawn(name, combined)
    }

    fn watch(
        &self,
        selector: WatchSelector,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let initial = {
            let (state, getters) = self.snapshot();
            selector(
                &state,
                &SnapshotGetters {
                    state: &state,
                    getters: &getters,
                },
            )
        };
        let watcher = Arc::new(Watcher {
            id,
            selector,
            callback,
            options,
            last: Mutex::new(initial),
            active: AtomicBool::new(true),
        });
        self.watchers.write().unwrap().push(watcher);
        id
    }

    fn unwatch(&self, id: SubscriptionId) -> bool {
        let mut watchers = self.watchers.write().unwrap();
        let Some(pos) = watchers.iter().position(|w| w.id == id) else {
            return false;
        };
        let watcher = watchers.remove(pos);
        watcher.active.store(false, Ordering::Release);
        true
    }

    fn register_module(&self, path: &[&str], module: StoreModule) -> Result<(), XError> {
        let key = join_path(path);
        if path.is_empty() {
            return Err(XError::InvalidPath {
                path: key,
                reason: "module path must not be empty".to_string(),
            });
        }
        let owned_path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let namespace = namespace_for(path, module.namespaced);

        {
            let mut registry = self.registry.write().unwrap();
            if registry.modules.contains(&key) {
                return Err(XError::DuplicateModule(key));
            }

            {
                let mut state = self.state.write().unwrap();
                insert_at(&mut state, path, module.state.clone())?;
            }
            registry.modules.insert(key.clone());

            for (name, getter) in &module.getters {
                let full = format!("{namespace}{name}");
                if registry.getters.contains_key(&full) {
                    warn!(getter = %full, "duplicate getter key, keeping the first");
                    continue;
                }
                registry.getters.insert(
                    full,
                    Bound {
                        path: owned_path.clone(),
                        namespace: namespace.clone(),
                        handler: getter.clone(),
                    },
                );
            }
            for (name, mutation) in &module.mutations {
                registry
                    .mutations
                    .entry(format!("{namespace}{name}"))
                    .or_default()
                    .push(Bound {
                        path: owned_path.clone(),
                        namespace: namespace.clone(),
                        handler: mutation.clone(),
                    });
            }
            for (name, action) in &module.actions {
                registry
                    .actions
                    .entry(format!("{namespace}{name}"))
                    .or_default()
                    .push(Bound {
                        path: owned_path.clone(),
                        namespace: namespace.clone(),
                        handler: action.clone(),
                    });
            }
        }

        debug!(
            path = %key,
            getters = module.getters.len(),
            mutations = module.mutations.len(),
            actions = module.actions.len(),
            "store module registered"
        );
        self.scheduler.batch(|| self.schedule_flush());
        Ok(())
    }

    fn scheduler(&self) -> Option<&Scheduler> {
        Some(&self.scheduler)
    }

    fn has_module(&self, path: &[&str]) -> bool {
        self.registry
            .read()
            .unwrap()
            .modules
            .contains(&join_path(path))
    }

    fn state(&self) -> Value {
        self.state.read().unwrap().clone()
    }

    fn state_at(&self, path: &[&str]) -> Option<Value> {
        let state = self.state.read().unwrap();
        at_path(&state, path).cloned()
    }

    fn getter(&self, key: &str) -> Option<Value> {
        let (state, getters) = self.snapshot();
        SnapshotGetters {
            state: &state,
            getters: &getters,
        }
        .get(key)
    }
}

/// Place `value` at `path`, creating intermediate objects.
fn insert_at(root: &mut Value, path: &[&str], value: Value) -> Result<(), XError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };
    let mut node = root;
    for segment in parents {
        let obj = node.as_object_mut().ok_or_else(|| XError::InvalidPath {
            path: join_path(path),
            reason: format!("parent of {segment} is not an object"),
        })?;
        node = obj
            .entry(segment.to_string())
            .or_insert_with(empty_object);
    }
    let obj = node.as_object_mut().ok_or_else(|| XError::InvalidPath {
        path: join_path(path),
        reason: format!("parent of {last} is not an object"),
    })?;
    obj.insert(last.to_string(), value);
    Ok(())
}

/// Getters evaluated against a frozen copy of the state.
struct SnapshotGetters<'a> {
    state: &'a Value,
    getters: &'a HashMap<String, Bound<Getter>>,
}

impl Getters for SnapshotGetters<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        let bound = self.getters.get(name)?;
        let local_state = at_path(self.state, &bound.path).unwrap_or(&Value::Null);
        let local = LocalGetters {
            root: self,
            namespace: &bound.namespace,
        };
        Some((bound.handler)(local_state, &local))
    }
}

/// A module's own getters, addressed without their namespace.
struct LocalGetters<'a> {
    root: &'a SnapshotGetters<'a>,
    namespace: &'a str,
}

impl Getters for LocalGetters<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        self.root.get(&format!("{}{}", self.namespace, name))
    }
}

/// What an action receives: a store handle scoped to its module.
///
/// `commit` and `dispatch` resolve names inside the module's namespace;
/// the `_root` variants take full keys.
#[derive(Clone)]
pub struct ActionContext {
    store: StoreRef,
    path: Vec<String>,
    namespace: String,
}

impl ActionContext {
    pub fn commit(&self, name: &str, payload: Option<Value>) -> Result<(), XError> {
        self.store
            .commit(&format!("{}{}", self.namespace, name), payload)
    }

    pub fn dispatch(&self, name: &str, payload: Option<Value>) -> Deferred {
        self.store
            .dispatch(&format!("{}{}", self.namespace, name), payload)
    }

    pub fn commit_root(&self, name: &str, payload: Option<Value>) -> Result<(), XError> {
        self.store.commit(name, payload)
    }

    pub fn dispatch_root(&self, name: &str, payload: Option<Value>) -> Deferred {
        self.store.dispatch(name, payload)
    }

    /// Snapshot of the module's own state.
    pub fn state(&self) -> Value {
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        self.store.state_at(&path).unwrap_or(Value::Null)
    }

    /// One of the module's own getters, by local name.
    pub fn getter(&self, name: &str) -> Option<Value> {
        self.store.getter(&format!("{}{}", self.namespace, name))
    }

    pub fn root_state(&self) -> Value {
        self.store.state()
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }
}
