//! Global plugin configuration.
//!
//! [`XConfig`] holds the typed defaults; feature-specific keys land in
//! `extra`. [`SharedConfig`] is the live handle shared by the plugin, its
//! components and adapter bridge. Updates are JSON merge patches applied in
//! place, so every clone of the handle observes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::XError;
use crate::merge::deep_merge;
use crate::value::SubscriptionId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentDirection {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrencyOptions {
    /// Pattern such as `i.iii,dd €`: integer part, thousands separator,
    /// decimal separator, decimals, and symbol placement.
    pub format: String,
    pub hide_integer_decimals: bool,
}

impl Default for CurrencyOptions {
    fn default() -> Self {
        Self {
            format: "i.iii,dd €".to_string(),
            hide_integer_decimals: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XConfig {
    pub consent: bool,
    pub document_direction: DocumentDirection,
    pub currency_options: CurrencyOptions,
    pub messages: Map<String, Value>,
    /// Any other top-level key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl XConfig {
    /// Defaults with `partial` merged over them.
    pub fn from_partial(partial: &Value) -> Result<Self, XError> {
        let mut config = Self::default();
        config.merge(partial)?;
        Ok(config)
    }

    /// Deep-merge `partial` into this config.
    ///
    /// Objects merge recursively, arrays and scalars replace, `null` resets
    /// a key to its default.
    pub fn merge(&mut self, partial: &Value) -> Result<(), XError> {
        if !partial.is_object() {
            return Err(XError::Config(serde::de::Error::custom(
                "config update must be an object",
            )));
        }
        let mut value = serde_json::to_value(&*self)?;
        deep_merge(&mut value, partial);
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Called with the config after every merge.
pub type ConfigListener = Arc<dyn Fn(&XConfig) + Send + Sync>;

struct ConfigInner {
    value: RwLock<XConfig>,
    listeners: RwLock<Vec<(SubscriptionId, ConfigListener)>>,
    next_id: AtomicU64,
}

/// Live, shared configuration. Clones share the same value.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<ConfigInner>,
}

impl SharedConfig {
    pub fn new(config: XConfig) -> Self {
        Self {
            inner: Arc::new(ConfigInner {
                value: RwLock::new(config),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Snapshot of the current config.
    pub fn get(&self) -> XConfig {
        self.inner.value.read().unwrap().clone()
    }

    /// Borrow the current config without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&XConfig) -> R) -> R {
        let config = self.inner.value.read().unwrap();
        f(&*config)
    }

    /// The current config as JSON.
    pub fn to_value(&self) -> Result<Value, XError> {
        Ok(serde_json::to_value(&*self.inner.value.read().unwrap())?)
    }

    /// Merge `partial` into the live config and notify subscribers.
    ///
    /// On error the config is left unchanged.
    pub fn merge(&self, partial: &Value) -> Result<(), XError> {
        let updated = {
            let mut current = self.inner.value.write().unwrap();
            let mut next = current.clone();
            next.merge(partial)?;
            *current = next.clone();
            next
        };
        debug!(keys = ?partial.as_object().map(|o| o.keys().collect::<Vec<_>>()), "config merged");

        let listeners: Vec<ConfigListener> = self
            .inner
            .listeners
            .read()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&updated);
        }
        Ok(())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&XConfig) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.write().unwrap();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() < before
    }

    /// Whether both handles share the same live config.
    pub fn ptr_eq(&self, other: &SharedConfig) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(XConfig::default())
    }
}
