//! Process-wide plugin lifecycle through the `XPlugin` static accessors.
//!
//! The registry is global, so every test resets it first and runs serially.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use serial_test::serial;

use x_plugin::testing::{RecordingStore, TestAdapter};
use x_plugin::{
    with_module, ErrorKind, InstallOptions, PluginRegistry, StoreEmitter, StoreEmitters,
    StoreModule, Wiring, XError, XEvent, XModule, XPlugin,
};

fn fresh() {
    PluginRegistry::global().reset();
}

fn search_box() -> XModule {
    XModule::new("searchBox")
        .store_module(
            StoreModule::new(json!({"query": "", "config": {"maxLength": 64}}))
                .mutation("setQuery", |state, payload| {
                    state["query"] = payload.unwrap_or_default();
                }),
        )
        .wiring(Wiring::new().wire(
            XEvent::UserTypedAQuery,
            "setSearchBoxQuery",
            with_module("searchBox").wire_commit("setQuery"),
        ))
        .store_emitters(StoreEmitters::new().with(
            XEvent::SearchBoxQueryChanged,
            StoreEmitter::simple(|state, _| state["query"].clone()),
        ))
}

// ============================================================================
// Access before install
// ============================================================================

#[test]
#[serial]
fn accessors_fail_before_install() {
    fresh();

    let errors = [
        XPlugin::current_bus().err(),
        XPlugin::current_adapter().err(),
        XPlugin::current_config().err(),
        XPlugin::current_store().err(),
        XPlugin::instance().err(),
    ];
    for err in errors {
        let err = err.expect("accessor should fail before install");
        assert_eq!(err.kind(), ErrorKind::AccessBeforeInstall);
    }
    assert_eq!(
        XPlugin::current_adapter().err().unwrap().to_string(),
        "XPlugin must be installed before accessing the adapter"
    );
}

#[test]
#[serial]
fn accessors_return_installed_values() {
    fresh();
    let adapter = TestAdapter::new();
    let store = RecordingStore::new();

    let plugin = XPlugin::install(
        InstallOptions::new()
            .adapter(adapter.clone())
            .store(store.as_store_ref())
            .config(json!({"consent": true})),
    )
    .unwrap();

    assert_eq!(XPlugin::current_adapter().unwrap().name(), "test");
    assert!(XPlugin::current_config().unwrap().get().consent);
    assert!(XPlugin::current_config().unwrap().ptr_eq(plugin.config()));
    assert!(Arc::ptr_eq(&XPlugin::instance().unwrap(), &plugin));

    let bus = XPlugin::current_bus().unwrap();
    assert_eq!(bus.listener_count(XEvent::UserTypedAQuery), 0);

    XPlugin::current_store()
        .unwrap()
        .commit("anything", None)
        .unwrap();
    assert_eq!(store.commits(), vec![("anything".to_string(), None)]);
}

// ============================================================================
// Install failures
// ============================================================================

#[test]
#[serial]
fn install_without_adapter_fails_fast() {
    fresh();
    let err = XPlugin::install(InstallOptions::new()).unwrap_err();
    assert!(matches!(err, XError::MissingOption("adapter")));
    assert_eq!(err.kind(), ErrorKind::Installation);
    assert!(!PluginRegistry::global().is_installed());

    XPlugin::install(InstallOptions::new().adapter(TestAdapter::new())).unwrap();
    assert!(PluginRegistry::global().is_installed());
}

#[test]
#[serial]
fn second_install_fails() {
    fresh();
    XPlugin::install(InstallOptions::new().adapter(TestAdapter::new())).unwrap();
    let err = XPlugin::install(InstallOptions::new().adapter(TestAdapter::new())).unwrap_err();
    assert!(matches!(err, XError::AlreadyInstalled));
}

// ============================================================================
// Module registration
// ============================================================================

#[test]
#[serial]
fn module_queued_before_install_is_registered_once() {
    fresh();
    let store = RecordingStore::new();

    XPlugin::register_x_module(search_box()).unwrap();
    XPlugin::register_x_module(search_box()).unwrap();
    assert_eq!(PluginRegistry::global().pending_modules(), vec!["searchBox"]);

    let plugin = XPlugin::install(
        InstallOptions::new()
            .adapter(TestAdapter::new())
            .store(store.as_store_ref()),
    )
    .unwrap();
    XPlugin::register_x_module(search_box()).unwrap();

    assert_eq!(store.registrations(), vec!["x/searchBox"]);
    assert_eq!(plugin.bus().listener_count(XEvent::UserTypedAQuery), 1);
    assert_eq!(plugin.registered_modules(), vec!["searchBox"]);
}

#[test]
#[serial]
fn typed_query_flows_to_store_and_back_to_bus() {
    fresh();
    XPlugin::register_x_module(search_box()).unwrap();
    XPlugin::install(InstallOptions::new().adapter(TestAdapter::new())).unwrap();

    let bus = XPlugin::current_bus().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = seen.clone();
    bus.on_with_metadata(XEvent::SearchBoxQueryChanged)
        .subscribe(move |message| {
            seen_c
                .lock()
                .unwrap()
                .push((message.payload.clone(), message.metadata.clone()));
            Ok(())
        });

    bus.emit(XEvent::UserTypedAQuery, "pizza", None);

    let store = XPlugin::current_store().unwrap();
    assert_eq!(store.state_at(&["x", "searchBox", "query"]), Some(json!("pizza")));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, json!("pizza"));
    assert_eq!(
        seen[0].1.as_ref().and_then(|m| m.module_name.as_deref()),
        Some("searchBox")
    );
}

// ============================================================================
// Config
// ============================================================================

#[test]
#[serial]
fn config_updates_merge_in_place() {
    fresh();
    XPlugin::install(
        InstallOptions::new()
            .adapter(TestAdapter::new())
            .config(json!({
                "messages": {"searchBox": {"placeholder": "Search", "clear": "Clear"}},
                "currencyOptions": {"format": "$i,iii.dd"},
            })),
    )
    .unwrap();
    let config = XPlugin::current_config().unwrap();
    let observed = Arc::new(Mutex::new(0usize));
    let observed_c = observed.clone();
    config.subscribe(move |_| *observed_c.lock().unwrap() += 1);

    XPlugin::instance()
        .unwrap()
        .merge_config(&json!({"messages": {"searchBox": {"placeholder": "Buscar"}}}))
        .unwrap();

    let current = config.get();
    assert_eq!(
        Value::Object(current.messages),
        json!({"searchBox": {"placeholder": "Buscar", "clear": "Clear"}})
    );
    assert_eq!(current.currency_options.format, "$i,iii.dd");
    assert!(!current.currency_options.hide_integer_decimals);
    assert_eq!(*observed.lock().unwrap(), 1);
}
