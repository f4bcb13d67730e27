//! Member values and the markers that stand in for them until resolution.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use phenotype_core::{Error, Function, Members, Mergeable, Origin, Value};

use crate::combination::Combination;
use crate::property::{Property, PropertyOptions};
use crate::trait_def::{Trait, WeakTrait};

// ── Sources ────────────────────────────────────────────────────────

/// Who contributed a member.
///
/// Traits are held weakly: a trait's cached metadata names the trait
/// itself as the source of its own definition.
#[derive(Clone, Debug)]
pub enum Source {
    /// A trait (its own definition, or a trait it was inherited through).
    Trait(WeakTrait),
    /// The object-level definition passed to `compose()`.
    Definition,
    /// The convention-defined default members.
    Defaults,
}

impl Source {
    /// Source for a trait.
    pub fn of(trait_: &Trait) -> Self {
        Self::Trait(trait_.downgrade())
    }

    /// Error-friendly identity of this source.
    pub fn origin(&self) -> Origin {
        match self {
            Self::Trait(t) => t.origin(),
            Self::Definition => Origin::Definition,
            Self::Defaults => Origin::Defaults,
        }
    }

    /// The trait, if this source is one that is still alive.
    pub fn as_trait(&self) -> Option<Trait> {
        match self {
            Self::Trait(t) => t.upgrade(),
            _ => None,
        }
    }

    /// Whether both name the same contributor.
    pub fn same(&self, other: &Source) -> bool {
        match (self, other) {
            (Self::Trait(a), Self::Trait(b)) => a.id() == b.id(),
            (Self::Definition, Self::Definition) | (Self::Defaults, Self::Defaults) => true,
            _ => false,
        }
    }
}

// ── Markers ────────────────────────────────────────────────────────

/// Accumulated definitions that collided on one member name.
#[derive(Clone, Debug)]
pub struct Conflict {
    member: String,
    entries: Vec<(Source, Member)>,
}

impl Conflict {
    /// An empty conflict on `member`.
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            entries: Vec::new(),
        }
    }

    /// Append a contributor.
    pub fn with(mut self, source: Source, member: Member) -> Self {
        self.entries.push((source, member));
        self
    }

    /// The contested member name.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Every `(source, definition)` pair, in merge order.
    pub fn entries(&self) -> &[(Source, Member)] {
        &self.entries
    }

    /// Contributors, in merge order.
    pub fn sources(&self) -> Vec<Origin> {
        self.entries.iter().map(|(s, _)| s.origin()).collect()
    }

    /// The error raised when this conflict survives resolution.
    pub fn to_error(&self) -> Error {
        Error::UnresolvedConflict {
            member: self.member.clone(),
            sources: self.sources(),
        }
    }
}

/// Take a member from a specific trait.
#[derive(Debug)]
pub struct FromTrait {
    base: Trait,
}

impl FromTrait {
    /// The trait the member is taken from.
    pub fn base(&self) -> &Trait {
        &self.base
    }
}

/// Take a differently named member from a specific trait.
#[derive(Debug)]
pub struct AliasOf {
    base: Trait,
    name: String,
}

impl AliasOf {
    /// The trait the member is taken from.
    pub fn base(&self) -> &Trait {
        &self.base
    }

    /// The member's name on the base trait.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A member slot before resolution.
#[derive(Clone, Debug)]
pub enum Member {
    /// A concrete value.
    Value(Value),
    /// Must be supplied by another contributor.
    Required,
    /// Differing definitions that collided.
    Conflict(Rc<Conflict>),
    /// Compiles to a get/set accessor.
    Property(Rc<Property>),
    /// Redirect to the same-named member of another trait.
    From(Rc<FromTrait>),
    /// Redirect to a differently named member of another trait.
    AliasOf(Rc<AliasOf>),
    /// Assemble ancestor definitions into one callable.
    Combination(Rc<Combination>),
}

impl Member {
    /// Identity comparison used by the merge rules: values by strict
    /// identity, markers by reference.
    pub fn same(&self, other: &Member) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a.same(b),
            (Self::Required, Self::Required) => true,
            (Self::Conflict(a), Self::Conflict(b)) => Rc::ptr_eq(a, b),
            (Self::Property(a), Self::Property(b)) => Rc::ptr_eq(a, b),
            (Self::From(a), Self::From(b)) => Rc::ptr_eq(a, b),
            (Self::AliasOf(a), Self::AliasOf(b)) => Rc::ptr_eq(a, b),
            (Self::Combination(a), Self::Combination(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The concrete value, if this is not a marker.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is the `Required` marker.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(v) => v.kind(),
            Self::Required => "required",
            Self::Conflict(_) => "conflict",
            Self::Property(_) => "property",
            Self::From(_) => "from",
            Self::AliasOf(_) => "aliasOf",
            Self::Combination(_) => "combination",
        }
    }
}

impl From<Value> for Member {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Function> for Member {
    fn from(v: Function) -> Self {
        Self::Value(Value::Func(v))
    }
}

impl From<Combination> for Member {
    fn from(v: Combination) -> Self {
        Self::Combination(Rc::new(v))
    }
}

impl From<Property> for Member {
    fn from(v: Property) -> Self {
        Self::Property(Rc::new(v))
    }
}

impl From<Conflict> for Member {
    fn from(v: Conflict) -> Self {
        Self::Conflict(Rc::new(v))
    }
}

macro_rules! member_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Member {
            fn from(v: $ty) -> Self {
                Self::Value(Value::from(v))
            }
        })*
    };
}

member_from_scalar!(bool, i32, i64, f64, &str, String);

/// Placeholder a concrete definition must replace.
pub fn required() -> Member {
    Member::Required
}

/// An explicit, empty conflict on `member`.
pub fn conflict(member: &str) -> Member {
    Conflict::new(member).into()
}

/// Take this member from `base`.
pub fn from(base: &Trait) -> Member {
    Member::From(Rc::new(FromTrait { base: base.clone() }))
}

/// Take member `name` of `base` under this member's name.
pub fn alias_of(base: &Trait, name: &str) -> Member {
    Member::AliasOf(Rc::new(AliasOf {
        base: base.clone(),
        name: name.to_string(),
    }))
}

/// A get/set property.
pub fn property(options: impl Into<PropertyOptions>) -> Member {
    Property::new(options.into()).into()
}

// ── Definitions ────────────────────────────────────────────────────

/// An ordered name → member table: a trait's own definition, or the
/// object-level definition passed to `compose()`.
#[derive(Clone, Default)]
pub struct Definition {
    members: IndexMap<String, Member>,
}

impl Definition {
    /// An empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, member: impl Into<Member>) -> Self {
        self.insert(name, member);
        self
    }

    /// Insert or replace a member.
    pub fn insert(&mut self, name: &str, member: impl Into<Member>) -> Option<Member> {
        self.members.insert(name.to_string(), member.into())
    }

    /// Remove a member, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Member> {
        self.members.shift_remove(name)
    }

    /// Look up a member.
    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Member names, in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// `(name, member)` pairs, in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.members.iter().map(|(k, v)| (k, v.kind())))
            .finish()
    }
}

impl<K: Into<String>, M: Into<Member>> FromIterator<(K, M)> for Definition {
    fn from_iter<I: IntoIterator<Item = (K, M)>>(iter: I) -> Self {
        Self {
            members: iter
                .into_iter()
                .map(|(k, m)| (k.into(), m.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Definition {
    type Item = (String, Member);
    type IntoIter = indexmap::map::IntoIter<String, Member>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

impl From<Members> for Definition {
    fn from(members: Members) -> Self {
        members.into_iter().collect()
    }
}

impl Mergeable for Definition {
    type Entry = Member;

    fn entry(&self, name: &str) -> Option<Member> {
        self.members.get(name).cloned()
    }

    fn put(&mut self, name: &str, entry: Member) {
        self.members.insert(name.to_string(), entry);
    }

    fn nested(entry: &Member) -> Option<Rc<RefCell<Members>>> {
        entry.as_value()?.as_map().cloned()
    }
}
