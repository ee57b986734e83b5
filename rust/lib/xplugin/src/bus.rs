//! XBus: the typed publish/subscribe channel.
//!
//! - `emit(event, payload, metadata)` delivers synchronously to every
//!   listener subscribed at the time of the call, in subscription order.
//! - `on(event)` returns a lazy [`EventStream`]; nothing is attached until
//!   `subscribe` is called, and every `subscribe` is an independent listener.
//!
//! A listener that returns an error is reported to the bus error handler;
//! the remaining listeners of the same emission still run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{error, trace, warn};

use crate::error::XError;
use crate::events::{TypedEvent, WireMetadata, XEvent};
use crate::scheduler::Scheduler;
use crate::value::SubscriptionId;

/// One delivery: the payload plus, when requested, its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub event: XEvent,
    pub payload: Value,
    pub metadata: Option<WireMetadata>,
}

/// Callback type for listeners.
pub type Listener = Arc<dyn Fn(&BusMessage) -> Result<(), XError> + Send + Sync>;

/// Receives listener failures. The default handler logs them.
pub type ErrorHandler = Arc<dyn Fn(XEvent, &XError) + Send + Sync>;

type Stage = Arc<dyn Fn(BusMessage) -> Option<BusMessage> + Send + Sync>;

#[derive(Clone)]
struct ListenerEntry {
    id: SubscriptionId,
    listener: Listener,
}

struct BusInner {
    listeners: RwLock<HashMap<XEvent, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
    scheduler: Scheduler,
    error_handler: RwLock<ErrorHandler>,
}

/// Cloneable handle to a bus. Clones share listeners.
#[derive(Clone)]
pub struct XBus {
    inner: Arc<BusInner>,
}

impl XBus {
    /// Create a bus with its own scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(Scheduler::new())
    }

    /// Create a bus whose emissions batch on `scheduler`.
    pub fn with_scheduler(scheduler: Scheduler) -> Self {
        let default_handler: ErrorHandler = Arc::new(|event, err| {
            error!(event = %event, error = %err, "wire effect failed");
        });
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                scheduler,
                error_handler: RwLock::new(default_handler),
            }),
        }
    }

    /// The scheduler emissions run in.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    // ====================================================================
    // Emit
    // ====================================================================

    /// Deliver `payload` to every current listener of `event`.
    ///
    /// Listeners attached during the emission do not see it. Deferred work
    /// triggered by listeners (watcher flushes) runs before `emit` returns
    /// unless an outer batch is open.
    pub fn emit(&self, event: XEvent, payload: impl Into<Value>, metadata: Option<WireMetadata>) {
        let payload = payload.into();
        if cfg!(debug_assertions) && !event.accepts(&payload) {
            warn!(event = %event, payload = %payload, "payload does not match the event's declared type");
        }

        let listeners: Vec<Listener> = {
            let map = self.inner.listeners.read().unwrap();
            map.get(&event)
                .map(|entries| entries.iter().map(|e| e.listener.clone()).collect())
                .unwrap_or_default()
        };
        trace!(event = %event, listeners = listeners.len(), "emit");
        if listeners.is_empty() {
            return;
        }

        let message = BusMessage {
            event,
            payload,
            metadata,
        };
        self.inner.scheduler.batch(|| {
            for listener in &listeners {
                if let Err(err) = listener(&message) {
                    self.report(event, &err);
                }
            }
        });
    }

    /// Emit with a payload checked against the event's declared type.
    pub fn emit_typed<E: TypedEvent>(
        &self,
        payload: E::Payload,
        metadata: Option<WireMetadata>,
    ) -> Result<(), XError> {
        let payload = serde_json::to_value(payload)?;
        self.emit(E::EVENT, payload, metadata);
        Ok(())
    }

    // ====================================================================
    // Subscribe
    // ====================================================================

    /// Stream of payloads for `event`. Metadata is stripped.
    pub fn on(&self, event: XEvent) -> EventStream {
        EventStream::new(self.clone(), event, false)
    }

    /// Stream of payloads for `event`, paired with their metadata.
    pub fn on_with_metadata(&self, event: XEvent) -> EventStream {
        EventStream::new(self.clone(), event, true)
    }

    /// Detach a listener. Returns `true` if it was attached.
    pub fn off(&self, event: XEvent, id: SubscriptionId) -> bool {
        let mut map = self.inner.listeners.write().unwrap();
        let Some(entries) = map.get_mut(&event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() < before
    }

    /// Number of listeners currently attached to `event`.
    pub fn listener_count(&self, event: XEvent) -> usize {
        let map = self.inner.listeners.read().unwrap();
        map.get(&event).map(Vec::len).unwrap_or(0)
    }

    /// Replace the handler that receives listener failures.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(XEvent, &XError) + Send + Sync + 'static,
    {
        *self.inner.error_handler.write().unwrap() = Arc::new(handler);
    }

    fn attach(&self, event: XEvent, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut map = self.inner.listeners.write().unwrap();
        map.entry(event)
            .or_default()
            .push(ListenerEntry { id, listener });
        id
    }

    fn report(&self, event: XEvent, err: &XError) {
        let handler = self.inner.error_handler.read().unwrap().clone();
        handler(event, err);
    }
}

impl Default for XBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazy, restartable stream of emissions for one event.
///
/// Cheap to clone. `filter` and `map` derive new streams; nothing touches
/// the bus until `subscribe`.
#[derive(Clone)]
pub struct EventStream {
    bus: XBus,
    event: XEvent,
    include_metadata: bool,
    stages: Vec<Stage>,
}

impl EventStream {
    fn new(bus: XBus, event: XEvent, include_metadata: bool) -> Self {
        Self {
            bus,
            event,
            include_metadata,
            stages: Vec::new(),
        }
    }

    pub fn event(&self) -> XEvent {
        self.event
    }

    pub fn includes_metadata(&self) -> bool {
        self.include_metadata
    }

    /// Keep only emissions for which `predicate` holds.
    ///
    /// The predicate always sees the metadata, even on streams that strip it.
    pub fn filter<F>(&self, predicate: F) -> EventStream
    where
        F: Fn(&BusMessage) -> bool + Send + Sync + 'static,
    {
        self.with_stage(Arc::new(move |message: BusMessage| {
            predicate(&message).then_some(message)
        }))
    }

    /// Transform the payload of every emission.
    pub fn map<F>(&self, f: F) -> EventStream
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.with_stage(Arc::new(move |mut message: BusMessage| {
            message.payload = f(message.payload);
            Some(message)
        }))
    }

    /// Attach `listener` to the bus. Every call attaches a new listener.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BusMessage) -> Result<(), XError> + Send + Sync + 'static,
    {
        if self.stages.is_empty() && self.include_metadata {
            return self.bus.attach(self.event, Arc::new(listener));
        }

        let stages = self.stages.clone();
        let include_metadata = self.include_metadata;
        self.bus.attach(
            self.event,
            Arc::new(move |message: &BusMessage| {
                let mut current = message.clone();
                for stage in &stages {
                    match stage(current) {
                        Some(next) => current = next,
                        None => return Ok(()),
                    }
                }
                if !include_metadata {
                    current.metadata = None;
                }
                listener(&current)
            }),
        )
    }

    /// The bus this stream reads from.
    pub fn bus(&self) -> &XBus {
        &self.bus
    }

    fn with_stage(&self, stage: Stage) -> EventStream {
        let mut next = self.clone();
        next.stages.push(stage);
        next
    }
}
