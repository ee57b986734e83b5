//! Store emitters: state changes re-emitted as bus events.
//!
//! Each entry watches a selector over the module's own state and emits its
//! event with the new value whenever the selected value changes. Selectors
//! see the module state (not the root state) and a [`SafeGetters`] view
//! exposing only the module's getters under their local names.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::bus::XBus;
use crate::events::{WireMetadata, XEvent};
use crate::module::{StoreEmitters, X_ROOT};
use crate::store::{namespace_for, Getters, StoreGetters, StoreModule, StoreRef, WatchOptions};
use crate::value::{at_path, SubscriptionId};

/// `(module state, module getters) -> selected value`.
pub type Selector = Arc<dyn Fn(&Value, &dyn Getters) -> Value + Send + Sync>;

/// `(new, old) -> should emit`.
pub type IsDifferent = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// One emitter entry: a bare selector, or a selector with options.
#[derive(Clone)]
pub enum StoreEmitter {
    Simple(Selector),
    Options(SelectorOptions),
}

impl StoreEmitter {
    pub fn simple<F>(selector: F) -> Self
    where
        F: Fn(&Value, &dyn Getters) -> Value + Send + Sync + 'static,
    {
        StoreEmitter::Simple(Arc::new(selector))
    }

    fn options(&self) -> SelectorOptions {
        match self {
            StoreEmitter::Simple(selector) => SelectorOptions {
                selector: selector.clone(),
                immediate: false,
                is_different: None,
                watch: WatchOptions::default(),
            },
            StoreEmitter::Options(options) => options.clone(),
        }
    }
}

impl From<SelectorOptions> for StoreEmitter {
    fn from(options: SelectorOptions) -> Self {
        StoreEmitter::Options(options)
    }
}

#[derive(Clone)]
pub struct SelectorOptions {
    pub selector: Selector,
    /// Emit the current value once, at the end of the registering tick.
    pub immediate: bool,
    /// Extra gate on top of the watch's own change detection. Default: always emit.
    pub is_different: Option<IsDifferent>,
    /// Passed through to [`crate::store::Store::watch`].
    pub watch: WatchOptions,
}

impl SelectorOptions {
    pub fn new<F>(selector: F) -> Self
    where
        F: Fn(&Value, &dyn Getters) -> Value + Send + Sync + 'static,
    {
        Self {
            selector: Arc::new(selector),
            immediate: false,
            is_different: None,
            watch: WatchOptions::default(),
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn is_different<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.is_different = Some(Arc::new(f));
        self
    }

    pub fn watch_options(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }
}

/// A module's getters under their un-namespaced names.
pub struct SafeGetters<'a> {
    inner: &'a dyn Getters,
    namespace: &'a str,
    names: &'a HashSet<String>,
}

impl<'a> SafeGetters<'a> {
    pub fn new(inner: &'a dyn Getters, namespace: &'a str, names: &'a HashSet<String>) -> Self {
        Self {
            inner,
            namespace,
            names,
        }
    }
}

impl Getters for SafeGetters<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        if !self.names.contains(name) {
            return None;
        }
        self.inner.get(&format!("{}{}", self.namespace, name))
    }
}

/// Everything an emitter's selector needs to run against the root state.
struct ModuleView {
    path: [String; 2],
    namespace: String,
    getter_names: HashSet<String>,
}

impl ModuleView {
    fn select(&self, selector: &Selector, root: &Value, getters: &dyn Getters) -> Value {
        let state = at_path(root, &self.path).unwrap_or(&Value::Null);
        let safe = SafeGetters::new(getters, &self.namespace, &self.getter_names);
        selector(state, &safe)
    }
}

/// Watch every entry of `emitters` and emit on change.
///
/// Returns the watch ids, in entry order. Immediate emissions are held for
/// the next scheduler tick, so a listener subscribed right after the
/// registering call still sees them. They carry no metadata.
pub fn register_store_emitters(
    module_name: &str,
    store_module: &StoreModule,
    emitters: &StoreEmitters,
    store: &StoreRef,
    bus: &XBus,
) -> Vec<SubscriptionId> {
    let view = Arc::new(ModuleView {
        path: [X_ROOT.to_string(), module_name.to_string()],
        namespace: namespace_for(&[X_ROOT, module_name], true),
        getter_names: store_module.getter_names().into_iter().collect(),
    });

    bus.scheduler().batch(|| {
        emitters
            .iter()
            .map(|(event, emitter)| {
                register_one(module_name, *event, emitter.options(), &view, store, bus)
            })
            .collect()
    })
}

fn register_one(
    module_name: &str,
    event: XEvent,
    options: SelectorOptions,
    view: &Arc<ModuleView>,
    store: &StoreRef,
    bus: &XBus,
) -> SubscriptionId {
    let SelectorOptions {
        selector,
        immediate,
        is_different,
        watch,
    } = options;

    let watch_selector = {
        let view = view.clone();
        let selector = selector.clone();
        Box::new(move |root: &Value, getters: &dyn Getters| view.select(&selector, root, getters))
    };
    let callback = {
        let bus = bus.clone();
        let module_name = module_name.to_string();
        Box::new(move |new: &Value, old: &Value| {
            let emit = is_different.as_ref().map_or(true, |f| f(new, old));
            if emit {
                trace!(event = %event, module = %module_name, "store emitter fired");
                bus.emit(event, new.clone(), Some(WireMetadata::from_module(&module_name)));
            }
        })
    };
    let id = store.watch(watch_selector, callback, watch);

    if immediate {
        let view = view.clone();
        let store = store.clone();
        let bus_c = bus.clone();
        bus.scheduler().next_tick(move || {
            let value = view.select(&selector, &store.state(), &StoreGetters(&*store));
            bus_c.emit(event, value, None);
        });
    }
    debug!(event = %event, module = %module_name, immediate, "store emitter registered");
    id
}
