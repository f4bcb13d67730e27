//! Publish/subscribe capability for composed objects.
//!
//! An [`EventEmitter`] is created lazily per object (see
//! [`Instance::emitter_or_init`]). Listeners are [`Function`]s called with
//! the emitting object as receiver and `[event, args...]` as arguments,
//! where `event` is a map `{type, source}`.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::error::Error;
use crate::instance::Instance;
use crate::value::{Function, Members, Value};

/// Event re-emitted when a listener fails.
pub const LISTENER_ERROR_EVENT: &str = "listenererror";

/// Suffix of the event emitted when a property changes (`<name>changed`).
pub const PROPERTY_CHANGED_SUFFIX: &str = "changed";

/// Listener registry for one object.
#[derive(Debug, Default)]
pub struct EventEmitter {
    listeners: RefCell<IndexMap<String, Vec<Function>>>,
}

fn event_types(event_type: &str) -> Result<impl Iterator<Item = &str>, Error> {
    if event_type.trim().is_empty() {
        return Err(Error::InvalidEventType {
            event_type: event_type.to_string(),
        });
    }
    Ok(event_type.split_whitespace())
}

impl EventEmitter {
    /// An emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to one or more space-separated event types.
    pub fn on(&self, event_type: &str, listener: Function) -> Result<(), Error> {
        let mut listeners = self.listeners.borrow_mut();
        for ty in event_types(event_type)? {
            listeners
                .entry(ty.to_string())
                .or_default()
                .push(listener.clone());
        }
        Ok(())
    }

    /// Subscribe every `type → listener` pair of a map.
    pub fn on_map(&self, map: &Members) -> Result<(), Error> {
        for (event_type, listener) in map {
            let Value::Func(listener) = listener else {
                return Err(Error::NotCallable {
                    member: event_type.clone(),
                });
            };
            self.on(event_type, listener.clone())?;
        }
        Ok(())
    }

    /// Unsubscribe.
    ///
    /// With no type every listener is dropped; with a type but no
    /// listener every listener of that type is dropped; otherwise only
    /// registrations of that exact function are removed.
    pub fn off(&self, event_type: Option<&str>, listener: Option<&Function>) {
        let mut listeners = self.listeners.borrow_mut();
        let Some(event_type) = event_type else {
            listeners.clear();
            return;
        };
        for ty in event_type.split_whitespace() {
            let Some(registered) = listeners.get_mut(ty) else {
                continue;
            };
            match listener {
                Some(listener) => registered.retain(|f| !f.ptr_eq(listener)),
                None => registered.clear(),
            }
        }
    }

    /// Number of listeners for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.borrow().get(event_type).map_or(0, Vec::len)
    }

    /// Whether anyone listens to `event_type`.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listener_count(event_type) > 0
    }

    /// Deliver an event to every listener of `event_type`, in
    /// subscription order.
    ///
    /// A failing listener does not stop delivery. Its error is re-emitted
    /// as [`LISTENER_ERROR_EVENT`] when that event has listeners, and
    /// logged otherwise.
    pub fn emit(&self, source: &Instance, event_type: &str, args: &[Value]) -> Result<(), Error> {
        if event_type.is_empty() {
            return Err(Error::InvalidEventType {
                event_type: String::new(),
            });
        }
        let snapshot = match self.listeners.borrow().get(event_type) {
            Some(registered) if !registered.is_empty() => registered.clone(),
            _ => return Ok(()),
        };
        let event = Value::map([
            ("type", Value::from(event_type)),
            ("source", Value::Object(source.clone())),
        ]);
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(event.clone());
        call_args.extend_from_slice(args);

        for listener in &snapshot {
            let Err(error) = listener.call(source, &call_args) else {
                continue;
            };
            let reentrant = event_type == "error" || event_type == LISTENER_ERROR_EVENT;
            if reentrant || !self.has_listeners(LISTENER_ERROR_EVENT) {
                tracing::error!(
                    event = event_type,
                    listener = listener.name(),
                    %error,
                    "event listener failed"
                );
                continue;
            }
            let report = Value::map([
                ("type", Value::from(event_type)),
                ("originalEvent", event.clone()),
                ("error", Value::from(error)),
                ("listener", Value::Func(listener.clone())),
            ]);
            self.emit(source, LISTENER_ERROR_EVENT, &[report])?;
        }
        Ok(())
    }

    /// Emit `<name>changed` with `{property, previousValue, value}`, only
    /// if that event has listeners.
    pub fn property_changed(
        &self,
        source: &Instance,
        name: &str,
        value: &Value,
        previous: &Value,
    ) -> Result<(), Error> {
        let event_type = format!("{name}{PROPERTY_CHANGED_SUFFIX}");
        if !self.has_listeners(&event_type) {
            return Ok(());
        }
        let change = Value::map([
            ("property", Value::from(name)),
            ("previousValue", previous.clone()),
            ("value", value.clone()),
        ]);
        self.emit(source, &event_type, &[change])
    }
}
