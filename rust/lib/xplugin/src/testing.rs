//! Test doubles for feature packages exercising their wiring.
//!
//! ```ignore
//! let store = RecordingStore::new();
//! let bus = XBus::new();
//! wire_commit("setQuery")(&bus.on(XEvent::UserTypedAQuery), &store.as_store_ref());
//! bus.emit(XEvent::UserTypedAQuery, "pizza", None);
//! assert_eq!(store.commits(), vec![("setQuery".into(), Some(json!("pizza")))]);
//! ```

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::Value;

use crate::adapter::{AdapterConfigListener, XAdapter};
use crate::error::XError;
use crate::scheduler::Scheduler;
use crate::store::{
    Deferred, ReactiveStore, Store, StoreModule, StoreRef, WatchCallback, WatchOptions,
    WatchSelector,
};
use crate::value::{join_path, SubscriptionId};

/// One recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Commit { name: String, payload: Option<Value> },
    Dispatch { name: String, payload: Option<Value> },
}

/// A [`Store`] that records every commit, dispatch and module registration.
///
/// Everything is forwarded to an inner [`ReactiveStore`], so registered
/// modules behave normally. Names the inner store does not know are
/// accepted silently instead of failing.
pub struct RecordingStore {
    inner: Arc<ReactiveStore>,
    calls: Mutex<Vec<StoreCall>>,
    registrations: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Scheduler::new())
    }

    pub fn with_scheduler(scheduler: Scheduler) -> Arc<Self> {
        Arc::new(Self {
            inner: ReactiveStore::with_scheduler(scheduler),
            calls: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
        })
    }

    pub fn as_store_ref(self: &Arc<Self>) -> StoreRef {
        self.clone()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded commits as `(name, payload)`.
    pub fn commits(&self) -> Vec<(String, Option<Value>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Commit { name, payload } => Some((name, payload)),
                StoreCall::Dispatch { .. } => None,
            })
            .collect()
    }

    /// Recorded dispatches as `(name, payload)`.
    pub fn dispatches(&self) -> Vec<(String, Option<Value>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Dispatch { name, payload } => Some((name, payload)),
                StoreCall::Commit { .. } => None,
            })
            .collect()
    }

    /// Paths passed to `register_module`, in call order, joined with `/`.
    pub fn registrations(&self) -> Vec<String> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Store for RecordingStore {
    fn commit(&self, name: &str, payload: Option<Value>) -> Result<(), XError> {
        self.record(StoreCall::Commit {
            name: name.to_string(),
            payload: payload.clone(),
        });
        match self.inner.commit(name, payload) {
            Err(XError::UnknownMutation(_)) => Ok(()),
            other => other,
        }
    }

    fn dispatch(&self, name: &str, payload: Option<Value>) -> Deferred {
        self.record(StoreCall::Dispatch {
            name: name.to_string(),
            payload: payload.clone(),
        });
        let deferred = self.inner.dispatch(name, payload);
        if !deferred.is_ready() {
            return deferred;
        }
        match deferred.now_or_never() {
            Some(Err(XError::UnknownAction(_))) | None => Deferred::ready(Ok(Value::Null)),
            Some(result) => Deferred::ready(result),
        }
    }

    fn watch(
        &self,
        selector: WatchSelector,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> SubscriptionId {
        self.inner.watch(selector, callback, options)
    }

    fn unwatch(&self, id: SubscriptionId) -> bool {
        self.inner.unwatch(id)
    }

    fn register_module(&self, path: &[&str], module: StoreModule) -> Result<(), XError> {
        self.registrations.lock().unwrap().push(join_path(path));
        self.inner.register_module(path, module)
    }

    fn has_module(&self, path: &[&str]) -> bool {
        self.inner.has_module(path)
    }

    fn scheduler(&self) -> Option<&Scheduler> {
        self.inner.scheduler()
    }

    fn state(&self) -> Value {
        self.inner.state()
    }

    fn state_at(&self, path: &[&str]) -> Option<Value> {
        self.inner.state_at(path)
    }

    fn getter(&self, key: &str) -> Option<Value> {
        self.inner.getter(key)
    }
}

/// An adapter whose config-changed hook is driven by the test.
pub struct TestAdapter {
    name: String,
    config_hook: bool,
    listeners: Mutex<Vec<AdapterConfigListener>>,
}

impl TestAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            name: "test".to_string(),
            config_hook: true,
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// An adapter that reports no config-changed hook.
    pub fn without_config_hook() -> Arc<Self> {
        Arc::new(Self {
            name: "test".to_string(),
            config_hook: false,
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Simulate an adapter config change.
    pub fn change_config(&self, config: Value) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(config.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl XAdapter for TestAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_config_changed_listener(&self, listener: AdapterConfigListener) -> bool {
        if !self.config_hook {
            return false;
        }
        self.listeners.lock().unwrap().push(listener);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_commits_and_accepts_unknown_names() {
        let store = RecordingStore::new();
        store.commit("setQuery", Some(json!("pizza"))).unwrap();
        store.commit("clear", None).unwrap();

        assert_eq!(
            store.commits(),
            vec![
                ("setQuery".to_string(), Some(json!("pizza"))),
                ("clear".to_string(), None),
            ]
        );
        assert!(store.dispatches().is_empty());
    }

    #[test]
    fn forwards_to_registered_modules() {
        let store = RecordingStore::new();
        store
            .register_module(
                &["x", "searchBox"],
                StoreModule::new(json!({"query": ""}))
                    .mutation("setQuery", |state, payload| {
                        state["query"] = payload.unwrap_or_default();
                    })
                    .namespaced(true),
            )
            .unwrap();

        store
            .commit("x/searchBox/setQuery", Some(json!("sushi")))
            .unwrap();

        assert_eq!(store.state_at(&["x", "searchBox", "query"]), Some(json!("sushi")));
        assert_eq!(store.registrations(), vec!["x/searchBox"]);
    }

    #[test]
    fn unknown_dispatch_resolves_to_null() {
        let store = RecordingStore::new();
        let result = futures::executor::block_on(store.dispatch("fetch", Some(json!(1))));
        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(store.dispatches(), vec![("fetch".to_string(), Some(json!(1)))]);
    }

    #[test]
    fn test_adapter_delivers_config_changes() {
        let adapter = TestAdapter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        assert!(adapter.add_config_changed_listener(Arc::new(move |config| {
            seen_c.lock().unwrap().push(config);
        })));

        adapter.change_config(json!({"lang": "es"}));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"lang": "es"})]);

        let plain = TestAdapter::without_config_hook();
        assert!(!plain.add_config_changed_listener(Arc::new(|_| {})));
        assert_eq!(plain.listener_count(), 0);
    }
}
