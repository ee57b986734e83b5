//! Wire factory.
//!
//! A [`Wire`] connects one event stream to one effect, usually a store
//! commit or dispatch. Wires are plain values until invoked with a stream and
//! a store; invoking one subscribes immediately and returns the listener id.
//!
//! ```ignore
//! let wiring = Wiring::new()
//!     .wire(XEvent::UserTypedAQuery, "setQuery", wire_commit("setQuery"))
//!     .wire(XEvent::UserClearedQuery, "clear", with_module("searchBox").wire_commit_without_payload("clear"));
//! ```
//!
//! Effects return `Result`; a failure goes to the bus error handler and
//! never stops sibling wires of the same event.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::bus::{BusMessage, EventStream};
use crate::error::XError;
use crate::events::WireMetadata;
use crate::module::X_ROOT;
use crate::store::StoreRef;
use crate::value::{is_truthy, SubscriptionId};

/// Binds an event stream to an effect against a store.
pub type Wire = Arc<dyn Fn(&EventStream, &StoreRef) -> SubscriptionId + Send + Sync>;

/// What a function wire receives for every emission.
pub struct WireParams<'a> {
    pub store: &'a StoreRef,
    pub payload: &'a Value,
    pub metadata: Option<&'a WireMetadata>,
}

/// Wire that calls `f` with the store and every payload.
pub fn create_wire_from_function<F>(f: F) -> Wire
where
    F: Fn(WireParams<'_>) -> Result<(), XError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |stream: &EventStream, store: &StoreRef| {
        let f = f.clone();
        let store = store.clone();
        stream.subscribe(move |message: &BusMessage| {
            f(WireParams {
                store: &store,
                payload: &message.payload,
                metadata: message.metadata.as_ref(),
            })
        })
    })
}

// ============================================================================
// Commit / dispatch
// ============================================================================

/// Commit `mutation` with the observed payload.
pub fn wire_commit(mutation: impl Into<String>) -> Wire {
    let mutation = mutation.into();
    create_wire_from_function(move |params| {
        params.store.commit(&mutation, Some(params.payload.clone()))
    })
}

/// Commit `mutation` with `payload`, ignoring the observed one.
pub fn wire_commit_with(mutation: impl Into<String>, payload: impl Into<Value>) -> Wire {
    let mutation = mutation.into();
    let payload = payload.into();
    create_wire_from_function(move |params| params.store.commit(&mutation, Some(payload.clone())))
}

/// Commit `mutation` with no payload whenever the event fires.
pub fn wire_commit_without_payload(mutation: impl Into<String>) -> Wire {
    let mutation = mutation.into();
    create_wire_from_function(move |params| params.store.commit(&mutation, None))
}

/// Dispatch `action` with the observed payload. The result is not awaited.
pub fn wire_dispatch(action: impl Into<String>) -> Wire {
    let action = action.into();
    create_wire_from_function(move |params| {
        params
            .store
            .dispatch(&action, Some(params.payload.clone()))
            .detach()
    })
}

pub fn wire_dispatch_with(action: impl Into<String>, payload: impl Into<Value>) -> Wire {
    let action = action.into();
    let payload = payload.into();
    create_wire_from_function(move |params| {
        params.store.dispatch(&action, Some(payload.clone())).detach()
    })
}

pub fn wire_dispatch_without_payload(action: impl Into<String>) -> Wire {
    let action = action.into();
    create_wire_from_function(move |params| params.store.dispatch(&action, None).detach())
}

/// Factories whose commits and dispatches target `x/<module>/<name>`.
pub fn with_module(module: impl Into<String>) -> NamespacedWireFactory {
    NamespacedWireFactory {
        module: module.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedWireFactory {
    module: String,
}

impl NamespacedWireFactory {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Full store key for `name` in this module.
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}/{}", X_ROOT, self.module, name)
    }

    pub fn wire_commit(&self, mutation: &str) -> Wire {
        wire_commit(self.key(mutation))
    }

    pub fn wire_commit_with(&self, mutation: &str, payload: impl Into<Value>) -> Wire {
        wire_commit_with(self.key(mutation), payload)
    }

    pub fn wire_commit_without_payload(&self, mutation: &str) -> Wire {
        wire_commit_without_payload(self.key(mutation))
    }

    pub fn wire_dispatch(&self, action: &str) -> Wire {
        wire_dispatch(self.key(action))
    }

    pub fn wire_dispatch_with(&self, action: &str, payload: impl Into<Value>) -> Wire {
        wire_dispatch_with(self.key(action), payload)
    }

    pub fn wire_dispatch_without_payload(&self, action: &str) -> Wire {
        wire_dispatch_without_payload(self.key(action))
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Only pass emissions for which `predicate` holds on to `wire`.
pub fn filter<F>(wire: Wire, predicate: F) -> Wire
where
    F: Fn(&BusMessage) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Arc::new(move |stream: &EventStream, store: &StoreRef| {
        let predicate = predicate.clone();
        wire(&stream.filter(move |message| predicate(message)), store)
    })
}

/// Drop emissions whose payload is falsy (`null`, `false`, `0`, `""`).
pub fn filter_truthy_payload(wire: Wire) -> Wire {
    filter(wire, |message| is_truthy(&message.payload))
}

/// Drop emissions whose payload is truthy.
pub fn filter_falsy_payload(wire: Wire) -> Wire {
    filter(wire, |message| !is_truthy(&message.payload))
}

/// Transform every payload before `wire` sees it.
pub fn map_wire<F>(wire: Wire, f: F) -> Wire
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |stream: &EventStream, store: &StoreRef| {
        let f = f.clone();
        wire(&stream.map(move |payload| f(payload)), store)
    })
}

/// Only pass emissions whose metadata names one of `modules`.
pub fn filter_whitelisted_modules<I, S>(wire: Wire, modules: I) -> Wire
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let modules: HashSet<String> = modules.into_iter().map(Into::into).collect();
    filter(wire, move |message| {
        origin_module(message).is_some_and(|name| modules.contains(name))
    })
}

/// Drop emissions whose metadata names one of `modules`.
pub fn filter_blacklisted_modules<I, S>(wire: Wire, modules: I) -> Wire
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let modules: HashSet<String> = modules.into_iter().map(Into::into).collect();
    filter(wire, move |message| {
        !origin_module(message).is_some_and(|name| modules.contains(name))
    })
}

fn origin_module(message: &BusMessage) -> Option<&str> {
    message.metadata.as_ref()?.module_name.as_deref()
}
