//! Priority-ordered event bus.
//!
//! Handlers run synchronously in ascending priority, first-registered first
//! within a priority. Each handler may mutate the event payload, fail (the
//! chain continues) or suppress the event (the chain stops). Monitors run
//! after the chain with a read-only view, whether or not it was suppressed.
//!
//! The handler table is locked only to take a snapshot, so handlers are
//! free to emit further events or register new handlers.

use crate::error::{panic_message, HostError, HostResult};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Named handler priorities. Lower runs first.
pub mod priority {
    pub const HIGHEST: u16 = 0;
    pub const HIGH: u16 = 250;
    pub const NORMAL: u16 = 500;
    pub const LOW: u16 = 750;
    pub const LOWEST: u16 = 1000;
}

/// Well-known event names. Any string is a valid event name.
pub mod names {
    pub const GAME_START: &str = "game.start";
    pub const GAME_END: &str = "game.end";
    pub const GAME_RESET: &str = "game.reset";
    pub const GAME_WIN: &str = "game.win";
    pub const GAME_LOSE: &str = "game.lose";
    pub const TILE_REVEAL: &str = "game.tile.reveal";
    pub const TILE_FLAG: &str = "game.tile.flag";
    pub const UI_RENDER: &str = "ui.render";

    /// Emitted by the manager after a mod becomes active.
    pub const MOD_LOAD: &str = "mod.load";
    /// Emitted by the manager after a mod is torn down.
    pub const MOD_UNLOAD: &str = "mod.unload";
    /// Emitted by the manager when a mod fails to load.
    pub const MOD_ERROR: &str = "mod.error";
}

/// An event travelling through the handler chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a handler wants to happen after it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    /// Skip the rest of the chain for this emission.
    Suppress,
}

/// Return type of event handlers.
pub type HandlerResult = anyhow::Result<Propagation>;

type HandlerFn = dyn Fn(&mut Event) -> HandlerResult + Send + Sync;
type MonitorFn = dyn Fn(&Event) + Send + Sync;

/// Identifies one registration. Ids increase with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    namespace: String,
    priority: u16,
    handler: Arc<HandlerFn>,
}

struct Monitor {
    id: HandlerId,
    namespace: String,
    observer: Arc<MonitorFn>,
}

/// Public view of a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerInfo {
    pub id: HandlerId,
    pub namespace: String,
    pub priority: u16,
}

/// A handler that failed or panicked during an emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    pub handler: HandlerId,
    pub namespace: String,
    pub message: String,
}

/// Outcome of a single `emit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmitResult {
    pub event: String,
    /// Payload as left by the last handler that ran.
    pub data: Value,
    pub suppressed: bool,
    /// Namespace of the handler that suppressed the event.
    pub suppressed_by: Option<String>,
    pub errors: Vec<HandlerFailure>,
    /// Number of chain handlers that ran.
    pub invoked: usize,
}

impl EmitResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Registration>>>,
    monitors: RwLock<HashMap<String, Vec<Monitor>>>,
    next_id: AtomicU64,
    stats: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.handlers.read().len())
            .field("monitored", &self.monitors.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler at [`priority::NORMAL`].
    pub fn register_handler<F>(&self, event: &str, namespace: &str, handler: F) -> HostResult<HandlerId>
    where
        F: Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler_with_priority(event, namespace, priority::NORMAL, handler)
    }

    /// Register a handler. `priority` must be within `0..=1000`.
    pub fn register_handler_with_priority<F>(
        &self,
        event: &str,
        namespace: &str,
        priority: u16,
        handler: F,
    ) -> HostResult<HandlerId>
    where
        F: Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        if priority > priority::LOWEST {
            return Err(HostError::InvalidPriority(priority));
        }

        let id = self.next_handler_id();
        let mut handlers = self.handlers.write();
        let chain = handlers.entry(event.to_string()).or_default();

        // Later registrations sort after earlier ones of equal priority.
        let at = chain.partition_point(|r| r.priority <= priority);
        chain.insert(
            at,
            Registration {
                id,
                namespace: namespace.to_string(),
                priority,
                handler: Arc::new(handler),
            },
        );

        debug!("{} registered handler for {} at priority {}", namespace, event, priority);
        Ok(id)
    }

    /// Register a read-only observer that runs after the handler chain.
    pub fn register_monitor<F>(&self, event: &str, namespace: &str, observer: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.monitors
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Monitor {
                id,
                namespace: namespace.to_string(),
                observer: Arc::new(observer),
            });
        debug!("{} registered monitor for {}", namespace, event);
        id
    }

    /// Remove one handler or monitor. Returns whether it was found.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.values().map(Vec::len).sum::<usize>();
        for chain in handlers.values_mut() {
            chain.retain(|r| r.id != id);
        }
        handlers.retain(|_, chain| !chain.is_empty());
        if handlers.values().map(Vec::len).sum::<usize>() < before {
            return true;
        }
        drop(handlers);

        let mut monitors = self.monitors.write();
        let before = monitors.values().map(Vec::len).sum::<usize>();
        for list in monitors.values_mut() {
            list.retain(|m| m.id != id);
        }
        monitors.retain(|_, list| !list.is_empty());
        monitors.values().map(Vec::len).sum::<usize>() < before
    }

    /// Remove every handler and monitor owned by `namespace`.
    pub fn revoke_all(&self, namespace: &str) -> usize {
        let removed = self.retain_namespaces(|owner| owner != namespace);
        if removed > 0 {
            debug!("Revoked {} event registrations for {}", removed, namespace);
        }
        removed
    }

    /// Keep only registrations whose namespace passes `keep`.
    pub fn retain_namespaces(&self, keep: impl Fn(&str) -> bool) -> usize {
        let mut removed = 0;

        let mut handlers = self.handlers.write();
        for chain in handlers.values_mut() {
            let before = chain.len();
            chain.retain(|r| keep(&r.namespace));
            removed += before - chain.len();
        }
        handlers.retain(|_, chain| !chain.is_empty());
        drop(handlers);

        let mut monitors = self.monitors.write();
        for list in monitors.values_mut() {
            let before = list.len();
            list.retain(|m| keep(&m.namespace));
            removed += before - list.len();
        }
        monitors.retain(|_, list| !list.is_empty());

        removed
    }

    /// Dispatch an event through its handler chain, then its monitors.
    pub fn emit(&self, event: &str, data: Value) -> EmitResult {
        let chain: Vec<(HandlerId, String, Arc<HandlerFn>)> = self
            .handlers
            .read()
            .get(event)
            .map(|chain| {
                chain
                    .iter()
                    .map(|r| (r.id, r.namespace.clone(), Arc::clone(&r.handler)))
                    .collect()
            })
            .unwrap_or_default();

        let mut current = Event::new(event, data);
        let mut errors = Vec::new();
        let mut suppressed_by = None;
        let mut invoked = 0;

        for (id, namespace, handler) in chain {
            invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(&mut current))) {
                Ok(Ok(Propagation::Continue)) => {}
                Ok(Ok(Propagation::Suppress)) => {
                    trace!("{} suppressed by {}", event, namespace);
                    suppressed_by = Some(namespace);
                    break;
                }
                Ok(Err(e)) => {
                    error!("Error in event handler {}.{}: {:#}", namespace, event, e);
                    errors.push(HandlerFailure {
                        handler: id,
                        namespace,
                        message: format!("{:#}", e),
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    error!("Event handler {}.{} panicked: {}", namespace, event, message);
                    errors.push(HandlerFailure {
                        handler: id,
                        namespace,
                        message: format!("panicked: {}", message),
                    });
                }
            }
        }

        let monitors: Vec<(HandlerId, String, Arc<MonitorFn>)> = self
            .monitors
            .read()
            .get(event)
            .map(|list| {
                list.iter()
                    .map(|m| (m.id, m.namespace.clone(), Arc::clone(&m.observer)))
                    .collect()
            })
            .unwrap_or_default();

        for (id, namespace, observer) in monitors {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(&current))) {
                let message = panic_message(payload);
                error!("Event monitor {}.{} panicked: {}", namespace, event, message);
                errors.push(HandlerFailure {
                    handler: id,
                    namespace,
                    message: format!("panicked: {}", message),
                });
            }
        }

        *self.stats.lock().entry(event.to_string()).or_insert(0) += 1;

        EmitResult {
            event: event.to_string(),
            data: current.data,
            suppressed: suppressed_by.is_some(),
            suppressed_by,
            errors,
            invoked,
        }
    }

    /// Handlers for an event, in dispatch order.
    pub fn handlers(&self, event: &str) -> Vec<HandlerInfo> {
        self.handlers
            .read()
            .get(event)
            .map(|chain| {
                chain
                    .iter()
                    .map(|r| HandlerInfo {
                        id: r.id,
                        namespace: r.namespace.clone(),
                        priority: r.priority,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handlers and monitors owned by `namespace`.
    pub fn registration_count(&self, namespace: &str) -> usize {
        let handlers = self
            .handlers
            .read()
            .values()
            .flatten()
            .filter(|r| r.namespace == namespace)
            .count();
        let monitors = self
            .monitors
            .read()
            .values()
            .flatten()
            .filter(|m| m.namespace == namespace)
            .count();
        handlers + monitors
    }

    /// How many times `event` has been emitted.
    pub fn emit_count(&self, event: &str) -> u64 {
        self.stats.lock().get(event).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> HashMap<String, u64> {
        self.stats.lock().clone()
    }

    pub fn clear_stats(&self) {
        self.stats.lock().clear();
    }
}
