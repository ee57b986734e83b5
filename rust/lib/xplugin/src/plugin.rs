//! Plugin installation and the process-wide module registry.
//!
//! ```text
//!  register_x_module ──► pending (keyed by name, last writer wins)
//!                              │
//!  install ──► Uninstalled ──► Installing ──drain──► Installed
//!                                                       │
//!  register_x_module ───────────────────────────────────┴─► register now
//! ```
//!
//! Registering a module (once per name):
//! 1. apply the host override for that module, if any
//! 2. register the store module under `x/<name>`, namespaced, with a
//!    generated `setConfig` when the state has a `config` key
//! 3. run every wire against the bus stream of its event
//! 4. register the module's store emitters
//! 5. mark the name and emit `ModuleRegistered`

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::AdapterRef;
use crate::bus::XBus;
use crate::component::XComponentApi;
use crate::config::{SharedConfig, XConfig};
use crate::emitters::register_store_emitters;
use crate::error::XError;
use crate::events::{WireMetadata, XEvent};
use crate::module::{with_config_mutation, XModule, XModuleOverride, X_ROOT};
use crate::scheduler::Scheduler;
use crate::store::{ReactiveStore, StoreRef};

/// What `install` is called with. Only the adapter is required.
#[derive(Default)]
pub struct InstallOptions {
    adapter: Option<AdapterRef>,
    store: Option<StoreRef>,
    config: Option<Value>,
    x_modules: HashMap<String, XModuleOverride>,
    scheduler: Option<Scheduler>,
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter(mut self, adapter: AdapterRef) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Reuse an existing store instead of creating one.
    pub fn store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    /// Partial global config, merged over the defaults.
    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Override for the module called `name`.
    pub fn x_module(mut self, name: impl Into<String>, overrides: XModuleOverride) -> Self {
        self.x_modules.insert(name.into(), overrides);
        self
    }

    /// Tick the bus (and the default store) run on. Defaults to the scheduler
    /// of a host store that exposes one.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

/// An installed plugin: one bus, one store, one config, one adapter.
pub struct XPlugin {
    bus: XBus,
    adapter: AdapterRef,
    store: StoreRef,
    config: SharedConfig,
    overrides: HashMap<String, XModuleOverride>,
    registered: Mutex<IndexSet<String>>,
}

impl std::fmt::Debug for XPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XPlugin").finish_non_exhaustive()
    }
}

impl XPlugin {
    fn build(adapter: AdapterRef, options: InstallOptions) -> Result<Self, XError> {
        let InstallOptions {
            store,
            config,
            x_modules,
            scheduler,
            ..
        } = options;

        let scheduler = match (scheduler, store.as_ref().and_then(|store| store.scheduler())) {
            (Some(given), Some(own)) => {
                if !given.ptr_eq(own) {
                    warn!("host store runs on its own scheduler, emitters will fire once per commit");
                }
                given
            }
            (Some(given), None) => given,
            (None, Some(own)) => own.clone(),
            (None, None) => Scheduler::new(),
        };
        let bus = XBus::with_scheduler(scheduler.clone());
        let config = match &config {
            Some(partial) => XConfig::from_partial(partial)?,
            None => XConfig::default(),
        };
        let store: StoreRef = match store {
            Some(store) => store,
            None => ReactiveStore::with_scheduler(scheduler),
        };

        let bridge = bus.clone();
        let bridged = adapter.add_config_changed_listener(Arc::new(move |config: Value| {
            bridge.emit(XEvent::AdapterConfigChanged, config, None);
        }));
        debug!(adapter = %adapter.name(), bridged, "adapter config bridge");

        Ok(Self {
            bus,
            adapter,
            store,
            config: SharedConfig::new(config),
            overrides: x_modules,
            registered: Mutex::new(IndexSet::new()),
        })
    }

    pub fn bus(&self) -> &XBus {
        &self.bus
    }

    pub fn adapter(&self) -> &AdapterRef {
        &self.adapter
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Deep-merge `partial` into the live global config.
    pub fn merge_config(&self, partial: &Value) -> Result<(), XError> {
        self.config.merge(partial)
    }

    pub fn is_module_registered(&self, name: &str) -> bool {
        self.registered_guard().contains(name)
    }

    /// Registered module names, in registration order.
    pub fn registered_modules(&self) -> Vec<String> {
        self.registered_guard().iter().cloned().collect()
    }

    /// Capability handle for a component belonging to `module_name`.
    pub fn component_api(&self, module_name: Option<&str>) -> XComponentApi {
        XComponentApi::new(
            module_name.map(str::to_string),
            self.bus.clone(),
            self.config.clone(),
            self.store.clone(),
        )
    }

    /// Register `module`. Returns `false` if a module with that name was
    /// already registered.
    pub fn register_module(&self, module: XModule) -> Result<bool, XError> {
        let name = module.name.clone();
        if !self.registered_guard().insert(name.clone()) {
            debug!(module = %name, "x module already registered, skipping");
            return Ok(false);
        }

        let result = self.bus.scheduler().batch(|| self.register_steps(module));
        if let Err(err) = &result {
            self.registered_guard().shift_remove(&name);
            debug!(module = %name, error = %err, "x module registration failed");
        }
        result.map(|_| true)
    }

    fn register_steps(&self, module: XModule) -> Result<(), XError> {
        let module = match self.overrides.get(&module.name) {
            Some(overrides) => module.apply_override(overrides)?,
            None => module,
        };
        let XModule {
            name,
            store_module,
            wiring,
            store_emitters,
        } = module;

        let store_module = with_config_mutation(store_module.namespaced(true));
        self.store
            .register_module(&[X_ROOT, name.as_str()], store_module.clone())?;

        for (event, wires) in wiring.iter() {
            let stream = self.bus.on_with_metadata(*event);
            for wire in wires.values() {
                wire(&stream, &self.store);
            }
        }

        register_store_emitters(&name, &store_module, &store_emitters, &self.store, &self.bus);

        info!(
            module = %name,
            wires = wiring.wire_count(),
            emitters = store_emitters.len(),
            "x module registered"
        );
        self.bus.emit(
            XEvent::ModuleRegistered,
            name.clone(),
            Some(WireMetadata::from_module(name)),
        );
        Ok(())
    }

    fn registered_guard(&self) -> MutexGuard<'_, IndexSet<String>> {
        self.registered.lock().unwrap()
    }

    // ====================================================================
    // Process-wide access
    // ====================================================================

    /// Install the process-wide plugin.
    pub fn install(options: InstallOptions) -> Result<Arc<XPlugin>, XError> {
        PluginRegistry::global().install(options)
    }

    /// Register `module` now if installed, otherwise queue it.
    pub fn register_x_module(module: XModule) -> Result<(), XError> {
        PluginRegistry::global().register_x_module(module)
    }

    pub fn instance() -> Result<Arc<XPlugin>, XError> {
        PluginRegistry::global().instance("plugin")
    }

    pub fn current_bus() -> Result<XBus, XError> {
        Ok(PluginRegistry::global().instance("bus")?.bus.clone())
    }

    pub fn current_adapter() -> Result<AdapterRef, XError> {
        Ok(PluginRegistry::global().instance("adapter")?.adapter.clone())
    }

    pub fn current_config() -> Result<SharedConfig, XError> {
        Ok(PluginRegistry::global().instance("config")?.config.clone())
    }

    pub fn current_store() -> Result<StoreRef, XError> {
        Ok(PluginRegistry::global().instance("store")?.store.clone())
    }
}

enum Lifecycle {
    Uninstalled,
    Installing,
    Installed(Arc<XPlugin>),
}

struct RegistryState {
    lifecycle: Lifecycle,
    pending: IndexMap<String, XModule>,
}

/// Holds at most one installed plugin plus the modules waiting for it.
pub struct PluginRegistry {
    state: Mutex<RegistryState>,
}

static GLOBAL: OnceLock<PluginRegistry> = OnceLock::new();

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                lifecycle: Lifecycle::Uninstalled,
                pending: IndexMap::new(),
            }),
        }
    }

    /// The registry behind the `XPlugin::*` static accessors.
    pub fn global() -> &'static PluginRegistry {
        GLOBAL.get_or_init(PluginRegistry::new)
    }

    /// Install a plugin and register every queued module.
    ///
    /// A missing adapter is rejected without leaving `Uninstalled`. Any later
    /// failure leaves the registry `Installing` until [`reset`](Self::reset).
    pub fn install(&self, options: InstallOptions) -> Result<Arc<XPlugin>, XError> {
        let adapter = {
            let mut state = self.lock();
            match state.lifecycle {
                Lifecycle::Installed(_) => return Err(XError::AlreadyInstalled),
                Lifecycle::Installing => return Err(XError::InstallInProgress),
                Lifecycle::Uninstalled => {}
            }
            let adapter = options
                .adapter
                .clone()
                .ok_or(XError::MissingOption("adapter"))?;
            state.lifecycle = Lifecycle::Installing;
            adapter
        };

        let plugin = Arc::new(XPlugin::build(adapter, options)?);
        // Immediate emitters are held for the next tick, so the caller can
        // subscribe to the returned bus before they fire.
        plugin.bus.scheduler().batch(|| self.drain(&plugin))?;

        info!(
            adapter = %plugin.adapter.name(),
            modules = plugin.registered_guard().len(),
            "XPlugin installed"
        );
        Ok(plugin)
    }

    fn drain(&self, plugin: &Arc<XPlugin>) -> Result<(), XError> {
        loop {
            let next = {
                let mut state = self.lock();
                match state.pending.shift_remove_index(0) {
                    Some((_, module)) => module,
                    None => {
                        state.lifecycle = Lifecycle::Installed(plugin.clone());
                        return Ok(());
                    }
                }
            };
            plugin.register_module(next)?;
        }
    }

    /// Register `module` on the installed plugin, or queue it.
    pub fn register_x_module(&self, module: XModule) -> Result<(), XError> {
        let plugin = {
            let mut state = self.lock();
            match &state.lifecycle {
                Lifecycle::Installed(plugin) => plugin.clone(),
                Lifecycle::Uninstalled | Lifecycle::Installing => {
                    debug!(module = %module.name, "x module queued until install");
                    state.pending.insert(module.name.clone(), module);
                    return Ok(());
                }
            }
        };
        plugin.register_module(module).map(|_| ())
    }

    /// The installed plugin. `what` names the accessor in the error.
    pub fn instance(&self, what: &'static str) -> Result<Arc<XPlugin>, XError> {
        match &self.lock().lifecycle {
            Lifecycle::Installed(plugin) => Ok(plugin.clone()),
            Lifecycle::Uninstalled | Lifecycle::Installing => Err(XError::NotInstalled(what)),
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.lock().lifecycle, Lifecycle::Installed(_))
    }

    /// Names of modules waiting for install, in queue order.
    pub fn pending_modules(&self) -> Vec<String> {
        self.lock().pending.keys().cloned().collect()
    }

    /// Forget the installed plugin and every queued module.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.lifecycle = Lifecycle::Uninstalled;
        state.pending.clear();
        info!("XPlugin registry reset");
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
