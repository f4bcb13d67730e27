//! Resolution: merging a trait graph into one member table.
//!
//! Resolution runs in two passes:
//!
//! 1. **Build** ([`Meta`]): merge each contributing trait's own merged
//!    table, then the own definition, applying the override / conflict /
//!    identical-value rules. The result still holds markers.
//! 2. **Finalize** ([`Meta::resolve`]): inject default members, then
//!    dereference every marker until a concrete value remains, producing
//!    a [`ResolvedTable`]. Leftover `Required` or `Conflict` markers fail
//!    here.
//!
//! Trait metas are cached per trait and rebuilt when the composition
//! epoch moves (any trait mutation on this thread).

use indexmap::IndexMap;
use phenotype_core::{Error, Instance, Members, Origin, Prototype, Value};

use crate::conventions::Conventions;
use crate::member::{Conflict, Definition, Member, Source};
use crate::trait_def::{Trait, WeakTrait};

/// Longest `from` / `aliasOf` chain followed before giving up.
pub const MAX_INDIRECTION_DEPTH: usize = 32;

// ── Options ────────────────────────────────────────────────────────

/// Options for [`Meta::resolve`].
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Collect unsatisfied `Required` members instead of failing.
    pub ignore_required: bool,
    /// Storage prefix and default members.
    pub conventions: Conventions,
}

impl ResolveOptions {
    /// Strict resolution with default conventions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution that tolerates unsatisfied requirements.
    pub fn ignoring_required() -> Self {
        Self {
            ignore_required: true,
            ..Self::default()
        }
    }

    /// Use `conventions` instead of the defaults.
    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }
}

// ── Shadowed members ───────────────────────────────────────────────

/// Members an own definition replaced during the build pass.
///
/// Handed to combination `wrap` hooks so a wrapper can still reach the
/// definition it overrode.
#[derive(Clone, Debug, Default)]
pub struct BaseMembers {
    members: IndexMap<String, (Source, Member)>,
}

impl BaseMembers {
    /// The shadowed definition of `name`.
    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name).map(|(_, m)| m)
    }

    /// Who contributed the shadowed definition.
    pub fn source_of(&self, name: &str) -> Option<Origin> {
        self.members.get(name).map(|(s, _)| s.origin())
    }

    /// Whether anything named `name` was shadowed.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Shadowed member names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Call the shadowed function `name` with `this` as receiver.
    pub fn call(&self, this: &Instance, name: &str, args: &[Value]) -> Result<Value, Error> {
        match self.get(name) {
            Some(Member::Value(Value::Func(f))) => f.call(this, args),
            Some(_) => Err(Error::NotCallable {
                member: name.to_string(),
            }),
            None => Err(Error::UnknownMember {
                member: name.to_string(),
                at: "<base>".to_string(),
            }),
        }
    }

    fn shadow(&mut self, name: &str, source: Source, member: Member) {
        self.members.insert(name.to_string(), (source, member));
    }
}

// ── Build pass ─────────────────────────────────────────────────────

/// The merged, not yet finalized member table of a trait or object.
#[derive(Debug)]
pub struct Meta {
    owner: Option<WeakTrait>,
    traits: Vec<Trait>,
    definition: Option<Definition>,
    subject: IndexMap<String, Member>,
    source_of: IndexMap<String, Source>,
    base: BaseMembers,
}

impl Meta {
    /// Merge a trait's children and own definition.
    pub fn for_trait(owner: &Trait) -> Self {
        let mut meta = Self::empty(Some(owner.downgrade()), owner.children(), Some(owner.definition()));
        meta.build();
        tracing::trace!(
            trait_name = owner.name(),
            members = meta.subject.len(),
            "built trait meta"
        );
        meta
    }

    /// Merge the traits and object-level definition of a composed object.
    pub fn for_object(traits: &[Trait], definition: Option<&Definition>) -> Self {
        let mut meta = Self::empty(None, traits.to_vec(), definition.cloned());
        meta.build();
        meta
    }

    fn empty(owner: Option<WeakTrait>, traits: Vec<Trait>, definition: Option<Definition>) -> Self {
        Self {
            owner,
            traits,
            definition,
            subject: IndexMap::new(),
            source_of: IndexMap::new(),
            base: BaseMembers::default(),
        }
    }

    fn build(&mut self) {
        for child in self.traits.clone() {
            let child_meta = child.meta();
            for (name, member) in &child_meta.subject {
                let source = child_meta
                    .source_of
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Source::of(&child));
                self.merge_member(name, member.clone(), source, false);
            }
        }
        if let Some(definition) = self.definition.clone() {
            let source = self.own_source();
            for (name, member) in definition {
                self.merge_member(&name, member, source.clone(), true);
            }
        }
    }

    fn own_source(&self) -> Source {
        match &self.owner {
            Some(owner) => Source::Trait(owner.clone()),
            None => Source::Definition,
        }
    }

    fn merge_member(&mut self, name: &str, value: Member, source: Source, override_: bool) {
        let current = self.subject.get(name).cloned();
        match current {
            None | Some(Member::Required) => {
                self.subject.insert(name.to_string(), value);
                self.source_of.insert(name.to_string(), source);
            }
            Some(_) if value.is_required() => {}
            Some(current) if override_ => {
                if let Some(previous) = self.source_of.get(name).cloned() {
                    self.base.shadow(name, previous, current);
                }
                self.subject.insert(name.to_string(), value);
                self.source_of.insert(name.to_string(), source);
            }
            Some(current) if current.same(&value) => {}
            Some(Member::Conflict(existing)) => {
                let grown = (*existing).clone().with(source, value);
                self.subject.insert(name.to_string(), grown.into());
            }
            Some(current) => {
                let existing_source = self
                    .source_of
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.own_source());
                tracing::trace!(
                    member = name,
                    first = %existing_source.origin(),
                    second = %source.origin(),
                    "member conflict"
                );
                let conflict = Conflict::new(name)
                    .with(existing_source, current)
                    .with(source, value);
                self.subject.insert(name.to_string(), conflict.into());
                self.source_of.insert(name.to_string(), self.own_source());
            }
        }
    }

    /// Contributing traits, in merge order.
    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    /// The own definition, if any.
    pub fn definition(&self) -> Option<&Definition> {
        self.definition.as_ref()
    }

    /// The merged, unfinalized members.
    pub fn subject(&self) -> &IndexMap<String, Member> {
        &self.subject
    }

    /// Who contributed member `name`.
    pub fn source(&self, name: &str) -> Option<&Source> {
        self.source_of.get(name)
    }

    /// Identity of the contributor of `name`.
    pub fn source_of(&self, name: &str) -> Option<Origin> {
        self.source(name).map(Source::origin)
    }

    /// Members the own definition shadowed.
    pub fn base(&self) -> &BaseMembers {
        &self.base
    }

    /// Finalize into a concrete member table.
    pub fn resolve(&self, options: &ResolveOptions) -> Result<ResolvedTable, Error> {
        let scope = ResolveScope {
            meta: self,
            options,
        };
        let mut pending: IndexMap<String, (Member, Source)> = self
            .subject
            .iter()
            .map(|(name, member)| {
                let source = self
                    .source_of
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.own_source());
                (name.clone(), (member.clone(), source))
            })
            .collect();
        for (name, member) in options.conventions.default_members.iter() {
            let overridden = self
                .definition
                .as_ref()
                .is_some_and(|definition| definition.contains(name));
            if !overridden {
                pending.insert(name.to_string(), (member.clone(), Source::Defaults));
            }
        }

        let mut table = ResolvedTable {
            traits: self.traits.clone(),
            definition: self.definition.clone(),
            ..ResolvedTable::default()
        };
        for (name, (member, source)) in pending {
            match scope.finalize(&name, member, source)? {
                Finalized::Value {
                    value,
                    source,
                    original_name,
                } => {
                    if let Some(original) = original_name {
                        table.original_name_of.insert(name.clone(), original);
                    }
                    table.source_of.insert(name.clone(), source);
                    table.members.insert(name, value);
                }
                Finalized::Required(source) => {
                    table.required.insert(name, source);
                }
            }
        }
        Ok(table)
    }
}

// ── Finalize pass ──────────────────────────────────────────────────

enum Finalized {
    Value {
        value: Value,
        source: Source,
        original_name: Option<String>,
    },
    Required(Source),
}

/// The meta being finalized, as seen by combinations compiled during
/// its resolution.
pub(crate) struct ResolveScope<'a> {
    meta: &'a Meta,
    options: &'a ResolveOptions,
}

impl ResolveScope<'_> {
    /// Traits a combination declared by `source` gathers from.
    ///
    /// The object-level definition's ancestors are the composed traits.
    pub(crate) fn ancestors_of(&self, source: &Source) -> Vec<Trait> {
        match source {
            Source::Trait(_) => source.as_trait().map(|t| t.children()).unwrap_or_default(),
            Source::Definition => self.meta.traits.clone(),
            Source::Defaults => Vec::new(),
        }
    }

    /// Members shadowed by `source`'s own definition.
    pub(crate) fn base_of(&self, source: &Source) -> BaseMembers {
        match source {
            Source::Trait(_) => source
                .as_trait()
                .map(|t| t.meta().base.clone())
                .unwrap_or_default(),
            Source::Definition => self.meta.base.clone(),
            Source::Defaults => BaseMembers::default(),
        }
    }

    fn finalize(&self, name: &str, mut member: Member, mut source: Source) -> Result<Finalized, Error> {
        let mut original_name = None;
        for _ in 0..MAX_INDIRECTION_DEPTH {
            member = match member {
                Member::Value(value) => {
                    return Ok(Finalized::Value {
                        value,
                        source,
                        original_name,
                    })
                }
                Member::Property(property) => {
                    let accessor =
                        property.compile(name, &self.options.conventions.storage_name_prefix);
                    return Ok(Finalized::Value {
                        value: Value::Func(accessor),
                        source,
                        original_name,
                    });
                }
                Member::Required if self.options.ignore_required => {
                    return Ok(Finalized::Required(source))
                }
                Member::Required => {
                    return Err(Error::MissingRequiredMember {
                        member: name.to_string(),
                        required_by: source.origin(),
                    })
                }
                Member::Conflict(conflict) => return Err(conflict.to_error()),
                Member::Combination(combination) => {
                    Member::from(combination.compile(name, &source, self)?)
                }
                Member::From(from) => {
                    let next = from.base().required_member(name)?;
                    source = Source::of(from.base());
                    next
                }
                Member::AliasOf(alias) => {
                    let next = alias.base().required_member(alias.name())?;
                    source = Source::of(alias.base());
                    original_name = Some(alias.name().to_string());
                    next
                }
            };
        }
        Err(Error::CyclicIndirection {
            member: name.to_string(),
        })
    }
}

// ── Resolved table ─────────────────────────────────────────────────

/// A finalized member table plus its provenance.
#[derive(Clone, Debug, Default)]
pub struct ResolvedTable {
    members: Members,
    source_of: IndexMap<String, Source>,
    original_name_of: IndexMap<String, String>,
    required: IndexMap<String, Source>,
    traits: Vec<Trait>,
    definition: Option<Definition>,
}

impl ResolvedTable {
    /// The finalized members, in resolution order.
    pub fn members(&self) -> &Members {
        &self.members
    }

    /// A finalized member.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Who contributed member `name` after indirections were followed.
    pub fn source_of(&self, name: &str) -> Option<Origin> {
        self.source_of.get(name).map(Source::origin)
    }

    /// The aliased member's name on its source trait.
    pub fn original_name_of(&self, name: &str) -> Option<&str> {
        self.original_name_of.get(name).map(String::as_str)
    }

    /// Requirements left unsatisfied (only with `ignore_required`).
    pub fn unresolved_required(&self) -> impl Iterator<Item = (&str, Origin)> {
        self.required.iter().map(|(k, s)| (k.as_str(), s.origin()))
    }

    /// Contributing traits.
    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    /// The own definition, if any.
    pub fn definition(&self) -> Option<&Definition> {
        self.definition.as_ref()
    }

    /// A prototype carrying these members under `name`.
    pub fn prototype(&self, name: &str) -> Prototype {
        Prototype::new(name, self.members.clone())
    }
}
