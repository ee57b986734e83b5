//! Module descriptors and user overrides.
//!
//! A feature package contributes one [`XModule`]: a unique name, its store
//! module, its wiring and its store emitters. Hosts adjust a module at
//! install time with an [`XModuleOverride`]; override entries win over the
//! module's own on conflicting keys, and state is deep-merged.

use indexmap::IndexMap;
use serde_json::Value;

use crate::emitters::StoreEmitter;
use crate::error::XError;
use crate::events::XEvent;
use crate::merge::{deep_merge, shallow_assign};
use crate::store::StoreModule;
use crate::value::empty_object;
use crate::wire::Wire;

/// Parent namespace every module's store state lives under.
pub const X_ROOT: &str = "x";

/// Name of the mutation generated for modules with a `config` state key.
pub const SET_CONFIG: &str = "setConfig";

/// Event → wire id → wire. Both levels keep insertion order.
#[derive(Clone, Default)]
pub struct Wiring(IndexMap<XEvent, IndexMap<String, Wire>>);

impl Wiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wire(mut self, event: XEvent, id: impl Into<String>, wire: Wire) -> Self {
        self.insert(event, id, wire);
        self
    }

    pub fn insert(&mut self, event: XEvent, id: impl Into<String>, wire: Wire) {
        self.0.entry(event).or_default().insert(id.into(), wire);
    }

    pub fn get(&self, event: XEvent) -> Option<&IndexMap<String, Wire>> {
        self.0.get(&event)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&XEvent, &IndexMap<String, Wire>)> {
        self.0.iter()
    }

    pub fn events(&self) -> impl Iterator<Item = XEvent> + '_ {
        self.0.keys().copied()
    }

    /// Total wires across all events.
    pub fn wire_count(&self) -> usize {
        self.0.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.wire_count() == 0
    }

    /// Merge `overrides` in, replacing wires with the same event and id.
    pub fn merge(&mut self, overrides: &Wiring) {
        for (event, wires) in overrides.iter() {
            let target = self.0.entry(*event).or_default();
            for (id, wire) in wires {
                target.insert(id.clone(), wire.clone());
            }
        }
    }
}

/// Event → emitter entry.
#[derive(Clone, Default)]
pub struct StoreEmitters(IndexMap<XEvent, StoreEmitter>);

impl StoreEmitters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, event: XEvent, emitter: impl Into<StoreEmitter>) -> Self {
        self.0.insert(event, emitter.into());
        self
    }

    pub fn get(&self, event: XEvent) -> Option<&StoreEmitter> {
        self.0.get(&event)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&XEvent, &StoreEmitter)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, overrides: &StoreEmitters) {
        for (event, emitter) in overrides.iter() {
            self.0.insert(*event, emitter.clone());
        }
    }
}

/// The unit a feature package contributes.
#[derive(Clone)]
pub struct XModule {
    pub name: String,
    pub store_module: StoreModule,
    pub wiring: Wiring,
    pub store_emitters: StoreEmitters,
}

impl std::fmt::Debug for XModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XModule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl XModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_module: StoreModule::default(),
            wiring: Wiring::default(),
            store_emitters: StoreEmitters::default(),
        }
    }

    pub fn store_module(mut self, store_module: StoreModule) -> Self {
        self.store_module = store_module;
        self
    }

    pub fn wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn store_emitters(mut self, store_emitters: StoreEmitters) -> Self {
        self.store_emitters = store_emitters;
        self
    }

    /// Apply a host override. Override entries take precedence.
    pub fn apply_override(mut self, overrides: &XModuleOverride) -> Result<Self, XError> {
        if let Some(store_module) = &overrides.store_module {
            self.merge_store_module(store_module)?;
        }
        if let Some(config) = &overrides.config {
            self.merge_config(config)?;
        }
        self.wiring.merge(&overrides.wiring);
        self.store_emitters.merge(&overrides.store_emitters);
        Ok(self)
    }

    fn merge_store_module(&mut self, overrides: &StoreModule) -> Result<(), XError> {
        if !overrides.state.is_null() {
            if !overrides.state.is_object() {
                return Err(self.malformed("state override must be an object"));
            }
            let base = &self.store_module.state;
            if !base.is_null() && !base.is_object() {
                return Err(self.malformed("module state is not an object"));
            }
            deep_merge(&mut self.store_module.state, &overrides.state);
        }
        let target = &mut self.store_module;
        for (name, getter) in &overrides.getters {
            target.getters.insert(name.clone(), getter.clone());
        }
        for (name, mutation) in &overrides.mutations {
            target.mutations.insert(name.clone(), mutation.clone());
        }
        for (name, action) in &overrides.actions {
            target.actions.insert(name.clone(), action.clone());
        }
        Ok(())
    }

    fn merge_config(&mut self, config: &Value) -> Result<(), XError> {
        if !config.is_object() {
            return Err(self.malformed("config override must be an object"));
        }
        if self.store_module.state.is_null() {
            self.store_module.state = empty_object();
        }
        let Some(state) = self.store_module.state.as_object_mut() else {
            return Err(self.malformed("module state is not an object"));
        };
        let current = state.entry("config").or_insert_with(empty_object);
        deep_merge(current, config);
        Ok(())
    }

    fn malformed(&self, reason: &str) -> XError {
        XError::MalformedOverride {
            module: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Host-supplied adjustments to one module.
#[derive(Clone, Default)]
pub struct XModuleOverride {
    pub wiring: Wiring,
    /// Members replace same-named ones; state is deep-merged.
    pub store_module: Option<StoreModule>,
    pub store_emitters: StoreEmitters,
    /// Deep-merged into the module's `state.config`.
    pub config: Option<Value>,
}

impl XModuleOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn store_module(mut self, store_module: StoreModule) -> Self {
        self.store_module = Some(store_module);
        self
    }

    pub fn store_emitters(mut self, store_emitters: StoreEmitters) -> Self {
        self.store_emitters = store_emitters;
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Add a `setConfig` mutation to modules that keep a `config` state key.
///
/// The mutation shallow-assigns its payload onto the existing config. A
/// module that defines its own `setConfig` keeps it.
pub(crate) fn with_config_mutation(mut module: StoreModule) -> StoreModule {
    let has_config = module.state.get("config").is_some();
    if has_config && !module.mutations.contains_key(SET_CONFIG) {
        module = module.mutation(SET_CONFIG, |state, payload| {
            if let (Some(config), Some(patch)) = (state.get_mut("config"), payload) {
                shallow_assign(config, &patch);
            }
        });
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitters::SelectorOptions;
    use crate::error::ErrorKind;
    use crate::wire::{wire_commit, wire_commit_without_payload};
    use serde_json::json;

    fn search_box() -> XModule {
        XModule::new("searchBox")
            .store_module(
                StoreModule::new(json!({
                    "query": "",
                    "config": {"maxLength": 64, "instant": {"enabled": true, "debounceMs": 500}},
                }))
                .mutation("setQuery", |state, payload| {
                    state["query"] = payload.unwrap_or_default();
                }),
            )
            .wiring(
                Wiring::new()
                    .wire(XEvent::UserTypedAQuery, "setQuery", wire_commit("setQuery"))
                    .wire(XEvent::UserClearedQuery, "clear", wire_commit_without_payload("clear")),
            )
            .store_emitters(StoreEmitters::new().with(
                XEvent::SearchBoxQueryChanged,
                StoreEmitter::simple(|state, _| state["query"].clone()),
            ))
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    #[test]
    fn wiring_keeps_insertion_order() {
        let wiring = Wiring::new()
            .wire(XEvent::UserTypedAQuery, "b", wire_commit("b"))
            .wire(XEvent::UserAcceptedAQuery, "x", wire_commit("x"))
            .wire(XEvent::UserTypedAQuery, "a", wire_commit("a"));

        assert_eq!(
            wiring.events().collect::<Vec<_>>(),
            vec![XEvent::UserTypedAQuery, XEvent::UserAcceptedAQuery]
        );
        let ids: Vec<&String> = wiring.get(XEvent::UserTypedAQuery).unwrap().keys().collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(wiring.wire_count(), 3);
    }

    #[test]
    fn wiring_merge_replaces_same_id_and_adds_new() {
        let mut wiring = Wiring::new().wire(XEvent::UserTypedAQuery, "setQuery", wire_commit("a"));
        let original = wiring.get(XEvent::UserTypedAQuery).unwrap()["setQuery"].clone();
        let replacement = wire_commit("b");

        wiring.merge(
            &Wiring::new()
                .wire(XEvent::UserTypedAQuery, "setQuery", replacement.clone())
                .wire(XEvent::UserTypedAQuery, "track", wire_commit("track")),
        );

        let wires = wiring.get(XEvent::UserTypedAQuery).unwrap();
        assert_eq!(wires.len(), 2);
        assert!(std::sync::Arc::ptr_eq(&wires["setQuery"], &replacement));
        assert!(!std::sync::Arc::ptr_eq(&wires["setQuery"], &original));
    }

    // ========================================================================
    // Overrides
    // ========================================================================

    #[test]
    fn empty_override_changes_nothing() {
        let module = search_box().apply_override(&XModuleOverride::new()).unwrap();
        assert_eq!(module.wiring.wire_count(), 2);
        assert_eq!(module.store_emitters.len(), 1);
        assert_eq!(module.store_module.state["config"]["maxLength"], 64);
    }

    #[test]
    fn state_override_is_deep_merged() {
        let overrides = XModuleOverride::new().store_module(StoreModule::new(json!({
            "config": {"instant": {"debounceMs": 100}},
        })));
        let module = search_box().apply_override(&overrides).unwrap();

        assert_eq!(
            module.store_module.state["config"],
            json!({"maxLength": 64, "instant": {"enabled": true, "debounceMs": 100}})
        );
        assert_eq!(module.store_module.state["query"], "");
    }

    #[test]
    fn member_overrides_replace_by_name() {
        let overrides = XModuleOverride::new().store_module(
            StoreModule::default()
                .mutation("setQuery", |state, _| state["query"] = json!("overridden"))
                .getter("upper", |state, _| {
                    json!(state["query"].as_str().unwrap_or_default().to_uppercase())
                }),
        );
        let module = search_box().apply_override(&overrides).unwrap();

        let mut state = module.store_module.state.clone();
        (module.store_module.mutations["setQuery"])(&mut state, Some(json!("pizza")));
        assert_eq!(state["query"], "overridden");
        assert_eq!(module.store_module.getter_names(), vec!["upper"]);
    }

    #[test]
    fn config_shorthand_merges_into_state_config() {
        let overrides = XModuleOverride::new().config(json!({"maxLength": 10}));
        let module = search_box().apply_override(&overrides).unwrap();
        assert_eq!(module.store_module.state["config"]["maxLength"], 10);
        assert_eq!(module.store_module.state["config"]["instant"]["enabled"], true);
    }

    #[test]
    fn config_shorthand_creates_config_key() {
        let overrides = XModuleOverride::new().config(json!({"pageSize": 24}));
        let module = XModule::new("results")
            .apply_override(&overrides)
            .unwrap();
        assert_eq!(module.store_module.state, json!({"config": {"pageSize": 24}}));
    }

    #[test]
    fn emitter_and_wiring_overrides_win() {
        let overrides = XModuleOverride::new()
            .wiring(Wiring::new().wire(XEvent::UserClearedQuery, "clear", wire_commit("reset")))
            .store_emitters(StoreEmitters::new().with(
                XEvent::SearchBoxQueryChanged,
                SelectorOptions::new(|state, _| state["query"].clone()).immediate(true),
            ));
        let module = search_box().apply_override(&overrides).unwrap();

        assert_eq!(module.wiring.wire_count(), 2);
        assert!(matches!(
            module.store_emitters.get(XEvent::SearchBoxQueryChanged),
            Some(StoreEmitter::Options(options)) if options.immediate
        ));
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        let bad_state = XModuleOverride::new().store_module(StoreModule::new(json!([1, 2])));
        let err = search_box().apply_override(&bad_state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedOverride);

        let bad_config = XModuleOverride::new().config(json!("verbose"));
        let err = search_box().apply_override(&bad_config).unwrap_err();
        assert!(matches!(err, XError::MalformedOverride { module, .. } if module == "searchBox"));

        let scalar_state = XModule::new("odd").store_module(StoreModule::new(json!(3)));
        let err = scalar_state
            .apply_override(&XModuleOverride::new().config(json!({})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedOverride);
    }

    // ========================================================================
    // setConfig injection
    // ========================================================================

    #[test]
    fn set_config_is_generated_for_config_state() {
        let module = with_config_mutation(search_box().store_module);
        let set_config = module.mutations[SET_CONFIG].clone();

        let mut state = module.state.clone();
        set_config(&mut state, Some(json!({"maxLength": 5})));

        assert_eq!(
            state["config"],
            json!({"maxLength": 5, "instant": {"enabled": true, "debounceMs": 500}})
        );
    }

    #[test]
    fn set_config_assigns_shallowly() {
        let module = with_config_mutation(search_box().store_module);
        let mut state = module.state.clone();
        (module.mutations[SET_CONFIG])(&mut state, Some(json!({"instant": {"enabled": false}})));
        assert_eq!(state["config"]["instant"], json!({"enabled": false}));
    }

    #[test]
    fn own_set_config_is_kept() {
        let module = StoreModule::new(json!({"config": {}}))
            .mutation(SET_CONFIG, |state, _| state["custom"] = json!(true));
        let module = with_config_mutation(module);

        let mut state = module.state.clone();
        (module.mutations[SET_CONFIG])(&mut state, Some(json!({"a": 1})));
        assert_eq!(state, json!({"config": {}, "custom": true}));
    }

    #[test]
    fn no_set_config_without_config_state() {
        let module = with_config_mutation(StoreModule::new(json!({"query": ""})));
        assert!(!module.mutations.contains_key(SET_CONFIG));
    }
}
