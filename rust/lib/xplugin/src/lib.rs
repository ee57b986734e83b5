//! X Plugin: event wiring and reactive store orchestration.
//!
//! UI components never talk to each other directly. They emit events on a
//! shared bus; declarative wiring turns events into store mutations and
//! actions; store emitters turn state changes back into events.
//!
//! ```text
//! UI ──emit──► XBus ──wire──► Store ──watch──► emitter ──emit──► XBus
//! ```
//!
//! # Primitives
//!
//! - `XBus::emit(event, payload, metadata)`: synchronous delivery to current listeners
//! - `XBus::on(event)`: lazy stream, one listener per `subscribe`
//! - `Store::commit(name, payload)` / `Store::dispatch(name, payload)`: the only ways state changes
//! - `Store::watch(selector, callback)`: change notification, flushed once per tick
//!
//! # Modules
//!
//! A feature contributes an [`XModule`]: store module, wiring, store emitters.
//! The plugin registers each module once, under `x/<name>`:
//!
//! ```ignore
//! use x_plugin::*;
//!
//! let search_box = XModule::new("searchBox")
//!     .store_module(
//!         StoreModule::new(json!({"query": ""}))
//!             .mutation("setQuery", |state, payload| state["query"] = payload.unwrap_or_default()),
//!     )
//!     .wiring(Wiring::new().wire(
//!         XEvent::UserTypedAQuery,
//!         "setSearchBoxQuery",
//!         with_module("searchBox").wire_commit("setQuery"),
//!     ))
//!     .store_emitters(StoreEmitters::new().with(
//!         XEvent::SearchBoxQueryChanged,
//!         StoreEmitter::simple(|state, _| state["query"].clone()),
//!     ));
//!
//! XPlugin::register_x_module(search_box)?;
//! XPlugin::install(InstallOptions::new().adapter(my_adapter))?;
//!
//! XPlugin::current_bus()?.emit(XEvent::UserTypedAQuery, "pizza", None);
//! // -> commit("x/searchBox/setQuery", "pizza")
//! // -> SearchBoxQueryChanged("pizza") with metadata { moduleName: "searchBox" }
//! ```
//!
//! # Ticks
//!
//! Emissions, commits and registrations run inside a [`Scheduler`] batch.
//! Watcher flushes are deferred to the end of the outermost batch, so
//! watchers see every mutation of the tick. Immediate emitter emissions wait
//! for the next tick, so a host can subscribe after `install` returns.

pub mod adapter;
pub mod bus;
pub mod component;
pub mod config;
pub mod emitters;
pub mod error;
pub mod events;
pub mod merge;
pub mod module;
pub mod plugin;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod value;
pub mod wire;

// Re-export primary types at crate root.
pub use adapter::{AdapterConfigListener, AdapterRef, XAdapter};
pub use bus::{BusMessage, EventStream, XBus};
pub use component::XComponentApi;
pub use config::{SharedConfig, XConfig};
pub use emitters::{register_store_emitters, SelectorOptions, StoreEmitter};
pub use error::{ErrorKind, XError};
pub use events::{typed, TypedEvent, WireMetadata, XEvent};
pub use module::{StoreEmitters, Wiring, XModule, XModuleOverride, X_ROOT};
pub use plugin::{InstallOptions, PluginRegistry, XPlugin};
pub use scheduler::Scheduler;
pub use store::{
    ActionContext, Deferred, ReactiveStore, Store, StoreModule, StoreRef, WatchOptions,
};
pub use value::SubscriptionId;
pub use wire::{
    create_wire_from_function, wire_commit, wire_commit_with, wire_commit_without_payload,
    wire_dispatch, wire_dispatch_with, wire_dispatch_without_payload, with_module, Wire,
    WireParams,
};
