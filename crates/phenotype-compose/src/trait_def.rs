//! Traits: named, mutable, composable bundles of members.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use phenotype_core::{
    advance_composition_epoch, composition_epoch, merge, Error, Instance, MergeOptions, Origin,
    Prototype, TraitId,
};

use crate::factory::{compose, ObjectMeta};
use crate::member::{Definition, Member};
use crate::meta::{Meta, ResolveOptions, ResolvedTable};

/// Counter for anonymous trait names.
static ANONYMOUS_TRAITS: AtomicU64 = AtomicU64::new(1);

// ── Arguments ──────────────────────────────────────────────────────

/// One positional argument of [`Trait::new`], [`Trait::add`] or
/// [`ObjectMeta::add`].
#[derive(Clone, Debug)]
pub enum TraitArg {
    /// A child trait.
    Trait(Trait),
    /// A definition (or definition fragment).
    Definition(Definition),
    /// The trait name; only valid in last position of [`Trait::new`].
    Name(String),
}

impl TraitArg {
    /// Short name of the argument kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trait(_) => "trait",
            Self::Definition(_) => "definition",
            Self::Name(_) => "name",
        }
    }
}

impl From<Trait> for TraitArg {
    fn from(t: Trait) -> Self {
        Self::Trait(t)
    }
}

impl From<&Trait> for TraitArg {
    fn from(t: &Trait) -> Self {
        Self::Trait(t.clone())
    }
}

impl From<Definition> for TraitArg {
    fn from(d: Definition) -> Self {
        Self::Definition(d)
    }
}

impl From<&str> for TraitArg {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TraitArg {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

pub(crate) fn invalid_argument(index: usize, arg: &TraitArg) -> Error {
    Error::InvalidConstructionArguments {
        index,
        kind: arg.kind().to_string(),
    }
}

// ── Trait ──────────────────────────────────────────────────────────

/// A resolved prototype cached by [`Trait::materialize`].
#[derive(Clone, Debug)]
pub(crate) struct Materialized {
    pub(crate) table: Rc<ResolvedTable>,
    pub(crate) prototype: Rc<Prototype>,
}

struct TraitInner {
    id: TraitId,
    name: Rc<str>,
    children: RefCell<Vec<Trait>>,
    definition: RefCell<Definition>,
    materialized: RefCell<Option<Materialized>>,
    meta_cache: RefCell<Option<(u64, Rc<Meta>)>>,
}

/// A named, composable bundle of child traits and an own definition.
///
/// Cloning shares the trait; identity is by reference. Mutations are
/// seen by every trait and object built from it the next time their
/// tables are derived.
#[derive(Clone)]
pub struct Trait(Rc<TraitInner>);

impl Trait {
    /// Build a trait from positional arguments: any number of child
    /// traits, at most one definition, and an optional name in last
    /// position.
    pub fn new<I>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<TraitArg>,
    {
        let args: Vec<TraitArg> = args.into_iter().map(Into::into).collect();
        let last = args.len().saturating_sub(1);
        let mut builder = TraitBuilder::default();
        let mut seen_definition = false;
        for (index, arg) in args.into_iter().enumerate() {
            match arg {
                TraitArg::Trait(child) => builder.children.push(child),
                TraitArg::Definition(_) if seen_definition => {
                    return Err(invalid_argument(index, &arg));
                }
                TraitArg::Definition(definition) => {
                    seen_definition = true;
                    builder.definition = definition;
                }
                TraitArg::Name(name) if index == last => builder.name = Some(name),
                TraitArg::Name(_) => return Err(invalid_argument(index, &arg)),
            }
        }
        Ok(builder.build())
    }

    /// Start building a trait.
    pub fn builder() -> TraitBuilder {
        TraitBuilder::default()
    }

    /// A trait with only an own definition.
    pub fn with_definition(name: &str, definition: Definition) -> Self {
        Self::builder().named(name).definition(definition).build()
    }

    /// Unique id.
    pub fn id(&self) -> TraitId {
        self.0.id
    }

    /// The trait name (`AnonymousN` if none was given).
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Error-friendly identity.
    pub fn origin(&self) -> Origin {
        Origin::of_trait(self.0.id, self.name())
    }

    /// Direct child traits, in declaration order.
    pub fn children(&self) -> Vec<Trait> {
        self.0.children.borrow().clone()
    }

    /// A copy of the own definition.
    pub fn definition(&self) -> Definition {
        self.0.definition.borrow().clone()
    }

    /// Whether `other` is a direct or transitive child.
    pub fn has(&self, other: &Trait) -> bool {
        self.0
            .children
            .borrow()
            .iter()
            .any(|child| child.ptr_eq(other) || child.has(other))
    }

    /// Add child traits and definition fragments.
    ///
    /// Already-present children are skipped. Fragments are merged into
    /// the own definition. A child that already contains this trait is
    /// rejected with [`Error::CyclicComposition`]; nothing is applied when
    /// any argument is rejected.
    pub fn add<I>(&self, args: I) -> Result<&Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<TraitArg>,
    {
        let args: Vec<TraitArg> = args.into_iter().map(Into::into).collect();
        for (index, arg) in args.iter().enumerate() {
            match arg {
                TraitArg::Trait(child) if child.ptr_eq(self) || child.has(self) => {
                    return Err(Error::CyclicComposition {
                        parent: self.origin(),
                        child: child.origin(),
                    });
                }
                TraitArg::Name(_) => return Err(invalid_argument(index, arg)),
                _ => {}
            }
        }
        for arg in args {
            match arg {
                TraitArg::Trait(child) => {
                    let mut children = self.0.children.borrow_mut();
                    if !children.iter().any(|c| c.ptr_eq(&child)) {
                        children.push(child);
                    }
                }
                TraitArg::Definition(fragment) => {
                    merge(
                        &mut *self.0.definition.borrow_mut(),
                        fragment,
                        &MergeOptions::new(),
                    )?;
                }
                TraitArg::Name(_) => {}
            }
        }
        self.touch();
        Ok(self)
    }

    /// Remove child traits (by identity) and own-definition members
    /// (by the names a definition argument lists).
    pub fn remove<I>(&self, args: I) -> Result<&Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<TraitArg>,
    {
        let args: Vec<TraitArg> = args.into_iter().map(Into::into).collect();
        if let Some((index, arg)) = args
            .iter()
            .enumerate()
            .find(|(_, arg)| matches!(arg, TraitArg::Name(_)))
        {
            return Err(invalid_argument(index, arg));
        }
        for arg in args {
            match arg {
                TraitArg::Trait(child) => {
                    self.0.children.borrow_mut().retain(|c| !c.ptr_eq(&child));
                }
                TraitArg::Definition(names) => {
                    let mut definition = self.0.definition.borrow_mut();
                    for name in names.names() {
                        definition.remove(name);
                    }
                }
                TraitArg::Name(_) => {}
            }
        }
        self.touch();
        Ok(self)
    }

    /// Define (or replace) one own member.
    pub fn define(&self, name: &str, member: impl Into<Member>) -> &Self {
        self.0.definition.borrow_mut().insert(name, member);
        self.touch();
        self
    }

    /// Remove one own member.
    pub fn undefine(&self, name: &str) -> Option<Member> {
        let removed = self.0.definition.borrow_mut().remove(name);
        self.touch();
        removed
    }

    fn touch(&self) {
        let epoch = advance_composition_epoch();
        tracing::debug!(trait_name = self.name(), epoch, "trait changed");
    }

    /// The merged, unfinalized table of this trait.
    pub fn meta(&self) -> Rc<Meta> {
        let epoch = composition_epoch();
        if let Some((built, meta)) = &*self.0.meta_cache.borrow() {
            if *built == epoch {
                return Rc::clone(meta);
            }
        }
        let meta = Rc::new(Meta::for_trait(self));
        *self.0.meta_cache.borrow_mut() = Some((epoch, Rc::clone(&meta)));
        meta
    }

    /// The unfinalized member this trait contributes as `name`.
    pub fn member(&self, name: &str) -> Option<Member> {
        self.meta().subject().get(name).cloned()
    }

    pub(crate) fn required_member(&self, name: &str) -> Result<Member, Error> {
        self.member(name).ok_or_else(|| Error::UnknownMember {
            member: name.to_string(),
            at: self.name().to_string(),
        })
    }

    /// Resolve this trait's children and own definition.
    pub fn resolve(&self) -> Result<ResolvedTable, Error> {
        self.resolve_with(&ResolveOptions::default())
    }

    /// Resolve with explicit options.
    pub fn resolve_with(&self, options: &ResolveOptions) -> Result<ResolvedTable, Error> {
        self.meta().resolve(options)
    }

    /// Resolve once and cache the prototype for cheap [`instantiate`](Self::instantiate).
    ///
    /// Later edits are not seen by new instances until the trait is
    /// materialized again or [`dematerialize`](Self::dematerialize)d.
    pub fn materialize(&self) -> Result<&Self, Error> {
        let table = self.resolve()?;
        let prototype = Rc::new(table.prototype(self.name()));
        *self.0.materialized.borrow_mut() = Some(Materialized {
            table: Rc::new(table),
            prototype,
        });
        tracing::debug!(trait_name = self.name(), "materialized");
        Ok(self)
    }

    /// Drop the cached prototype.
    pub fn dematerialize(&self) -> &Self {
        self.0.materialized.borrow_mut().take();
        self
    }

    /// Whether a cached prototype exists.
    pub fn is_materialized(&self) -> bool {
        self.0.materialized.borrow().is_some()
    }

    pub(crate) fn materialized(&self) -> Option<Materialized> {
        self.0.materialized.borrow().clone()
    }

    /// A new object composed from this trait alone.
    pub fn instantiate(&self) -> Result<Instance, Error> {
        compose(std::slice::from_ref(self), None)
    }

    /// A new object composed from this trait plus `definition`.
    pub fn instantiate_with(&self, definition: Definition) -> Result<Instance, Error> {
        compose(std::slice::from_ref(self), Some(definition))
    }

    /// Copy this trait's resolved members onto an object's own slots.
    ///
    /// Requirements the trait leaves open must already be answered by
    /// the target. Functions are copied by reference.
    pub fn mixin_into(&self, target: &Instance) -> Result<(), Error> {
        let table = match self.materialized() {
            Some(materialized) => materialized.table,
            None => Rc::new(self.resolve_with(&ResolveOptions::ignoring_required())?),
        };
        if let Some((member, required_by)) = table
            .unresolved_required()
            .find(|(name, _)| !target.has(name))
        {
            return Err(Error::MissingRequiredMember {
                member: member.to_string(),
                required_by,
            });
        }
        let mut target = target.clone();
        merge(
            &mut target,
            table
                .members()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
            &MergeOptions::new(),
        )
    }

    /// Add this trait to a composed object, or mix it into a foreign one.
    pub fn add_to(&self, target: &Instance) -> Result<&Self, Error> {
        match ObjectMeta::of(target) {
            Some(meta) => meta.add([self])?,
            None => self.mixin_into(target)?,
        }
        Ok(self)
    }

    /// Remove this trait from a composed object.
    pub fn remove_from(&self, target: &Instance) -> Result<&Self, Error> {
        let meta = ObjectMeta::of(target).ok_or(Error::NotComposed)?;
        meta.remove([self])?;
        Ok(self)
    }

    /// Add this trait as a child of `target`.
    pub fn add_to_trait(&self, target: &Trait) -> Result<&Self, Error> {
        target.add([self])?;
        Ok(self)
    }

    /// Remove this trait from `target`'s children.
    pub fn remove_from_trait(&self, target: &Trait) -> Result<&Self, Error> {
        target.remove([self])?;
        Ok(self)
    }

    /// Whether both handles share one trait.
    pub fn ptr_eq(&self, other: &Trait) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakTrait {
        WeakTrait {
            inner: Rc::downgrade(&self.0),
            id: self.0.id,
            name: Rc::clone(&self.0.name),
        }
    }
}

impl PartialEq for Trait {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trait({}#{})", self.0.name, self.0.id)
    }
}

// ── Weak handle ────────────────────────────────────────────────────

/// A non-owning trait handle that remembers the trait's identity.
#[derive(Clone)]
pub struct WeakTrait {
    inner: Weak<TraitInner>,
    id: TraitId,
    name: Rc<str>,
}

impl WeakTrait {
    /// The trait, if still alive.
    pub fn upgrade(&self) -> Option<Trait> {
        self.inner.upgrade().map(Trait)
    }

    /// The trait id.
    pub fn id(&self) -> TraitId {
        self.id
    }

    /// Error-friendly identity.
    pub fn origin(&self) -> Origin {
        Origin::of_trait(self.id, &*self.name)
    }
}

impl fmt::Debug for WeakTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakTrait({}#{})", self.name, self.id)
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Infallible structured construction of a [`Trait`].
#[derive(Default)]
pub struct TraitBuilder {
    name: Option<String>,
    children: Vec<Trait>,
    definition: Definition,
}

impl TraitBuilder {
    /// Set the name.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Append a child trait.
    pub fn with(mut self, child: &Trait) -> Self {
        self.children.push(child.clone());
        self
    }

    /// Define one own member.
    pub fn member(mut self, name: &str, member: impl Into<Member>) -> Self {
        self.definition.insert(name, member);
        self
    }

    /// Replace the own definition.
    pub fn definition(mut self, definition: Definition) -> Self {
        self.definition = definition;
        self
    }

    /// Finish.
    pub fn build(self) -> Trait {
        let name = self.name.unwrap_or_else(|| {
            format!("Anonymous{}", ANONYMOUS_TRAITS.fetch_add(1, Ordering::Relaxed))
        });
        Trait(Rc::new(TraitInner {
            id: TraitId::next(),
            name: Rc::from(name),
            children: RefCell::new(self.children),
            definition: RefCell::new(self.definition),
            materialized: RefCell::new(None),
            meta_cache: RefCell::new(None),
        }))
    }
}
