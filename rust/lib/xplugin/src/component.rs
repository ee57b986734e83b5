//! What a UI component gets to reach the plugin.
//!
//! A component never holds the plugin itself. It gets a narrow
//! [`XComponentApi`] scoped to the module it belongs to; emissions made
//! through it carry that module's name as metadata.

use serde_json::Value;

use crate::bus::{EventStream, XBus};
use crate::config::{SharedConfig, XConfig};
use crate::events::{WireMetadata, XEvent};
use crate::module::X_ROOT;
use crate::store::StoreRef;

#[derive(Clone)]
pub struct XComponentApi {
    module_name: Option<String>,
    bus: XBus,
    config: SharedConfig,
    store: StoreRef,
}

impl XComponentApi {
    pub fn new(
        module_name: Option<String>,
        bus: XBus,
        config: SharedConfig,
        store: StoreRef,
    ) -> Self {
        Self {
            module_name,
            bus,
            config,
            store,
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Emit with this component's module as origin.
    pub fn emit(&self, event: XEvent, payload: impl Into<Value>) {
        self.emit_with(event, payload, WireMetadata::default());
    }

    /// Emit from a specific element.
    pub fn emit_from(&self, event: XEvent, payload: impl Into<Value>, target: impl Into<String>) {
        self.emit_with(event, payload, WireMetadata::default().with_target(target));
    }

    /// Emit with extra metadata. A missing module name is filled in.
    pub fn emit_with(&self, event: XEvent, payload: impl Into<Value>, mut metadata: WireMetadata) {
        if metadata.module_name.is_none() {
            metadata.module_name = self.module_name.clone();
        }
        self.bus.emit(event, payload, Some(metadata));
    }

    pub fn on(&self, event: XEvent) -> EventStream {
        self.bus.on(event)
    }

    pub fn on_with_metadata(&self, event: XEvent) -> EventStream {
        self.bus.on_with_metadata(event)
    }

    /// Snapshot of the global config.
    pub fn config(&self) -> XConfig {
        self.config.get()
    }

    /// Snapshot of the owning module's state, if it is registered.
    pub fn state(&self) -> Option<Value> {
        let name = self.module_name.as_deref()?;
        self.store.state_at(&[X_ROOT, name])
    }

    /// One of the owning module's getters, by local name.
    pub fn getter(&self, name: &str) -> Option<Value> {
        let module = self.module_name.as_deref()?;
        self.store.getter(&format!("{X_ROOT}/{module}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusMessage;
    use crate::store::{ReactiveStore, Store, StoreModule};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn api(module: Option<&str>) -> (XComponentApi, StoreRef) {
        let bus = XBus::new();
        let store: StoreRef = ReactiveStore::with_scheduler(bus.scheduler().clone());
        let api = XComponentApi::new(
            module.map(str::to_string),
            bus,
            SharedConfig::default(),
            store.clone(),
        );
        (api, store)
    }

    fn collect(api: &XComponentApi, event: XEvent) -> Arc<Mutex<Vec<BusMessage>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        api.on_with_metadata(event).subscribe(move |message| {
            seen_c.lock().unwrap().push(message.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn emit_fills_module_name() {
        let (api, _) = api(Some("searchBox"));
        let seen = collect(&api, XEvent::UserTypedAQuery);

        api.emit(XEvent::UserTypedAQuery, "pizza");
        api.emit_from(XEvent::UserTypedAQuery, "pasta", "search-input");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].metadata, Some(WireMetadata::from_module("searchBox")));
        assert_eq!(
            seen[1].metadata,
            Some(WireMetadata::from_module("searchBox").with_target("search-input"))
        );
    }

    #[test]
    fn explicit_module_name_is_kept() {
        let (api, _) = api(Some("searchBox"));
        let seen = collect(&api, XEvent::UserAcceptedAQuery);

        api.emit_with(
            XEvent::UserAcceptedAQuery,
            "pizza",
            WireMetadata::from_module("history").with_feature("history_query"),
        );

        let meta = seen.lock().unwrap()[0].metadata.clone().unwrap();
        assert_eq!(meta.module_name.as_deref(), Some("history"));
        assert_eq!(meta.feature.as_deref(), Some("history_query"));
    }

    #[test]
    fn module_less_component_emits_without_module() {
        let (api, _) = api(None);
        let seen = collect(&api, XEvent::UserOpenedX);
        api.emit(XEvent::UserOpenedX, Value::Null);

        assert_eq!(seen.lock().unwrap()[0].metadata, Some(WireMetadata::default()));
        assert_eq!(api.state(), None);
        assert_eq!(api.module_name(), None);
    }

    #[test]
    fn reads_module_state_getters_and_config() {
        let (api, store) = api(Some("searchBox"));
        store
            .register_module(
                &["x", "searchBox"],
                StoreModule::new(json!({"query": "tea"}))
                    .getter("queryLength", |state, _| {
                        json!(state["query"].as_str().map(str::len).unwrap_or(0))
                    })
                    .namespaced(true),
            )
            .unwrap();

        assert_eq!(api.state(), Some(json!({"query": "tea"})));
        assert_eq!(api.getter("queryLength"), Some(json!(3)));
        assert!(!api.config().consent);
    }
}
