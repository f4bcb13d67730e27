//! The composed object and its resolved member table.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::events::EventEmitter;
use crate::id::InstanceId;
use crate::value::{Members, Value};

/// Type name given to objects composed from no traits.
pub const ANONYMOUS_TYPE_NAME: &str = "_PhenotypeProto";

/// Type name of a bare object with no composition behind it.
pub const BARE_TYPE_NAME: &str = "Object";

/// A resolved member table shared by every object built from it.
///
/// Immutable once built. Re-resolution produces a new `Prototype`
/// rather than editing one in place, so an object that already holds a
/// table keeps a consistent view until it is rebound.
#[derive(Debug, Default)]
pub struct Prototype {
    name: String,
    members: Members,
}

impl Prototype {
    /// Wrap a finalized member table under a type name.
    pub fn new(name: impl Into<String>, members: Members) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    /// The type name (`Jet_Bird`, `_PhenotypeProto`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a member.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Whether the table defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// The full member table, in resolution order.
    pub fn members(&self) -> &Members {
        &self.members
    }

    /// Member names, in resolution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Re-derives an object's prototype from its composition.
///
/// Implemented outside this crate by the object metadata of the
/// composition layer; an [`Instance`] only knows it can ask for a fresh
/// table.
pub trait Binding: Any {
    /// Rebuild the prototype if it is stale, or unconditionally when
    /// `force` is set.
    ///
    /// Returns `Ok(None)` when the current table is still valid.
    fn refresh(&self, force: bool) -> Result<Option<Rc<Prototype>>, Error>;

    /// Upcast for downcasting to the concrete binding type.
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

struct InstanceInner {
    id: InstanceId,
    prototype: RefCell<Rc<Prototype>>,
    slots: RefCell<Members>,
    emitter: RefCell<Option<Rc<EventEmitter>>>,
    binding: Option<Rc<dyn Binding>>,
}

/// A composed object.
///
/// Member lookup reads the object's own slots first (property storage
/// and ad-hoc fields), then its prototype. Cloning an `Instance` clones
/// the handle, not the object.
#[derive(Clone)]
pub struct Instance(Rc<InstanceInner>);

impl Instance {
    /// An object over a fixed prototype.
    pub fn new(prototype: Rc<Prototype>) -> Self {
        Self::build(prototype, None)
    }

    /// An object whose prototype is kept current by `binding`.
    pub fn bound(prototype: Rc<Prototype>, binding: Rc<dyn Binding>) -> Self {
        Self::build(prototype, Some(binding))
    }

    /// A plain object with no members and no composition.
    pub fn bare() -> Self {
        Self::new(Rc::new(Prototype::new(BARE_TYPE_NAME, Members::new())))
    }

    fn build(prototype: Rc<Prototype>, binding: Option<Rc<dyn Binding>>) -> Self {
        Self(Rc::new(InstanceInner {
            id: InstanceId::next(),
            prototype: RefCell::new(prototype),
            slots: RefCell::new(Members::new()),
            emitter: RefCell::new(None),
            binding,
        }))
    }

    /// Unique object id.
    pub fn id(&self) -> InstanceId {
        self.0.id
    }

    /// Type name of the current prototype.
    pub fn type_name(&self) -> String {
        self.0.prototype.borrow().name().to_string()
    }

    /// The current prototype, brought up to date first.
    pub fn prototype(&self) -> Rc<Prototype> {
        self.sync();
        Rc::clone(&self.0.prototype.borrow())
    }

    /// Replace the prototype.
    pub fn set_prototype(&self, prototype: Rc<Prototype>) {
        *self.0.prototype.borrow_mut() = prototype;
    }

    /// The binding, if the object was built by a composition.
    pub fn binding(&self) -> Option<Rc<dyn Binding>> {
        self.0.binding.clone()
    }

    /// The binding downcast to its concrete type.
    pub fn binding_as<T: Any>(&self) -> Option<Rc<T>> {
        self.binding()?.into_any().downcast::<T>().ok()
    }

    /// Re-derive the prototype from the binding unconditionally.
    pub fn refresh(&self) -> Result<(), Error> {
        if let Some(binding) = &self.0.binding {
            if let Some(prototype) = binding.refresh(true)? {
                self.set_prototype(prototype);
            }
        }
        Ok(())
    }

    fn sync(&self) {
        let Some(binding) = &self.0.binding else {
            return;
        };
        match binding.refresh(false) {
            Ok(Some(prototype)) => self.set_prototype(prototype),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    instance = %self.0.id,
                    %error,
                    "prototype rebuild failed, keeping last resolved table"
                );
            }
        }
    }

    /// Look up a member: own slot, then prototype.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get_own(name) {
            return Some(value);
        }
        self.sync();
        self.0.prototype.borrow().get(name).cloned()
    }

    /// Look up an own slot only.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.0.slots.borrow().get(name).cloned()
    }

    /// Write an own slot, returning the previous own value.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Option<Value> {
        self.0
            .slots
            .borrow_mut()
            .insert(name.to_string(), value.into())
    }

    /// Delete an own slot.
    pub fn remove_own(&self, name: &str) -> Option<Value> {
        self.0.slots.borrow_mut().shift_remove(name)
    }

    /// Whether `name` resolves on this object.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `name` is an own slot.
    pub fn has_own(&self, name: &str) -> bool {
        self.0.slots.borrow().contains_key(name)
    }

    /// Names of own slots, in insertion order.
    pub fn own_names(&self) -> Vec<String> {
        self.0.slots.borrow().keys().cloned().collect()
    }

    /// Call a member function with this object as receiver.
    ///
    /// Placeholder members created with [`pending`](crate::pending) report
    /// the member name they were reached through.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let member = self.get(name).ok_or_else(|| Error::UnknownMember {
            member: name.to_string(),
            at: self.type_name(),
        })?;
        let Value::Func(function) = member else {
            return Err(Error::NotCallable {
                member: name.to_string(),
            });
        };
        function.call(self, args).map_err(|error| match error {
            Error::Pending {
                message,
                method: None,
            } => Error::Pending {
                message,
                method: Some(name.to_string()),
            },
            other => other,
        })
    }

    /// The event emitter, if one was created.
    pub fn emitter(&self) -> Option<Rc<EventEmitter>> {
        self.0.emitter.borrow().clone()
    }

    /// The event emitter, created on first use.
    pub fn emitter_or_init(&self) -> Rc<EventEmitter> {
        let mut slot = self.0.emitter.borrow_mut();
        Rc::clone(slot.get_or_insert_with(|| Rc::new(EventEmitter::new())))
    }

    /// Emit an event from this object, if it has an emitter.
    pub fn emit(&self, event_type: &str, args: &[Value]) -> Result<(), Error> {
        match self.emitter() {
            Some(emitter) => emitter.emit(self, event_type, args),
            None => Ok(()),
        }
    }

    /// Whether both handles refer to one object.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.prototype.try_borrow() {
            Ok(prototype) => write!(f, "Instance({}#{})", prototype.name(), self.0.id),
            Err(_) => write!(f, "Instance(#{})", self.0.id),
        }
    }
}

/// Force every bound object in `instances` to re-derive its prototype.
///
/// Objects without a binding are left untouched. Stops at the first
/// resolution failure.
pub fn refresh(instances: &[Instance]) -> Result<(), Error> {
    instances.iter().try_for_each(Instance::refresh)
}
