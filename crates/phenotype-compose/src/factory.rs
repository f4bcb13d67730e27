//! Object factory and per-object composition metadata.
//!
//! [`compose`] resolves an ordered trait list plus an optional
//! object-level definition into a [`Prototype`] and binds the resulting
//! [`Instance`] to an [`ObjectMeta`]. The metadata keeps the object's
//! composition so it can be queried, edited and re-derived later.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use phenotype_core::instance::ANONYMOUS_TYPE_NAME;
use phenotype_core::{
    composition_epoch, merge, Binding, Error, Instance, MergeOptions, Origin, Prototype,
};

use crate::conventions::Conventions;
use crate::member::Definition;
use crate::meta::{Meta, ResolveOptions, ResolvedTable};
use crate::trait_def::{invalid_argument, Trait, TraitArg};

// ── Options ────────────────────────────────────────────────────────

/// When a composed object re-derives its member table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Liveness {
    /// Resolved at creation; re-derived only by [`Instance::refresh`] or
    /// an [`ObjectMeta`] edit.
    #[default]
    Frozen,
    /// Re-derived on the first access after any trait mutation.
    Live,
}

/// Options for [`compose_with`].
#[derive(Clone, Debug, Default)]
pub struct ComposeOptions {
    /// Re-derivation strategy. Default: [`Liveness::Frozen`].
    pub liveness: Liveness,
    /// Conventions used for every resolution of the object.
    pub conventions: Conventions,
}

impl ComposeOptions {
    /// Frozen objects with default conventions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live objects with default conventions.
    pub fn live() -> Self {
        Self {
            liveness: Liveness::Live,
            ..Self::default()
        }
    }

    /// Use `liveness`.
    pub fn with_liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = liveness;
        self
    }

    /// Use `conventions`.
    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Compose a frozen object from `traits` and an optional object-level
/// definition.
pub fn compose(traits: &[Trait], definition: Option<Definition>) -> Result<Instance, Error> {
    compose_with(traits, definition, &ComposeOptions::default())
}

/// Compose an object with explicit options.
///
/// A single materialized trait with no definition, frozen liveness and
/// default conventions reuses the trait's cached prototype.
pub fn compose_with(
    traits: &[Trait],
    definition: Option<Definition>,
    options: &ComposeOptions,
) -> Result<Instance, Error> {
    let meta = Rc::new(ObjectMeta::new(traits, definition, options)?);
    let prototype = meta.prototype();
    meta.pending.set(false);
    let instance = Instance::bound(prototype, meta);
    tracing::debug!(instance = %instance.id(), type_name = %instance.type_name(), "composed");
    Ok(instance)
}

fn type_name_of(traits: &[Trait]) -> String {
    if traits.is_empty() {
        return ANONYMOUS_TYPE_NAME.to_string();
    }
    traits.iter().map(Trait::name).collect::<Vec<_>>().join("_")
}

// ── ObjectMeta ─────────────────────────────────────────────────────

/// Composition metadata of an object built by [`compose`].
#[derive(Debug)]
pub struct ObjectMeta {
    type_name: String,
    liveness: Liveness,
    options: ResolveOptions,
    traits: RefCell<Vec<Trait>>,
    definition: RefCell<Option<Definition>>,
    table: RefCell<Rc<ResolvedTable>>,
    prototype: RefCell<Rc<Prototype>>,
    built_epoch: Cell<u64>,
    /// A rebuilt prototype the instance has not picked up yet.
    pending: Cell<bool>,
}

impl ObjectMeta {
    fn new(
        traits: &[Trait],
        definition: Option<Definition>,
        options: &ComposeOptions,
    ) -> Result<Self, Error> {
        let type_name = type_name_of(traits);
        let meta = Self {
            type_name,
            liveness: options.liveness,
            options: ResolveOptions::new().with_conventions(options.conventions.clone()),
            traits: RefCell::new(traits.to_vec()),
            definition: RefCell::new(definition),
            table: RefCell::new(Rc::default()),
            prototype: RefCell::new(Rc::default()),
            built_epoch: Cell::new(composition_epoch()),
            pending: Cell::new(false),
        };
        let fast_path = match traits {
            [only]
                if meta.liveness == Liveness::Frozen
                    && meta.definition.borrow().is_none()
                    && options.conventions.is_default() =>
            {
                only.materialized()
            }
            _ => None,
        };
        match fast_path {
            Some(materialized) => {
                *meta.table.borrow_mut() = materialized.table;
                *meta.prototype.borrow_mut() = materialized.prototype;
            }
            None => meta.rebuild()?,
        }
        Ok(meta)
    }

    /// The metadata of `instance`, if it was built by [`compose`].
    pub fn of(instance: &Instance) -> Option<Rc<ObjectMeta>> {
        instance.binding_as::<ObjectMeta>()
    }

    /// Re-resolve the current composition.
    ///
    /// The previous table stays in place when resolution fails.
    fn rebuild(&self) -> Result<(), Error> {
        self.built_epoch.set(composition_epoch());
        let table = {
            let traits = self.traits.borrow();
            let definition = self.definition.borrow();
            Meta::for_object(&traits, definition.as_ref()).resolve(&self.options)?
        };
        *self.prototype.borrow_mut() = Rc::new(table.prototype(&self.type_name));
        *self.table.borrow_mut() = Rc::new(table);
        self.pending.set(true);
        tracing::debug!(
            type_name = %self.type_name,
            epoch = self.built_epoch.get(),
            "object table rebuilt"
        );
        Ok(())
    }

    /// The type name shared by objects of this composition.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The re-derivation strategy.
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// The composed traits, in order.
    pub fn traits(&self) -> Vec<Trait> {
        self.traits.borrow().clone()
    }

    /// The object-level definition.
    pub fn definition(&self) -> Option<Definition> {
        self.definition.borrow().clone()
    }

    /// Whether `trait_` is composed directly or transitively.
    pub fn has(&self, trait_: &Trait) -> bool {
        self.traits
            .borrow()
            .iter()
            .any(|t| t.ptr_eq(trait_) || t.has(trait_))
    }

    /// The last resolved table.
    pub fn table(&self) -> Rc<ResolvedTable> {
        Rc::clone(&self.table.borrow())
    }

    /// The last resolved prototype.
    pub fn prototype(&self) -> Rc<Prototype> {
        Rc::clone(&self.prototype.borrow())
    }

    /// Which contributor supplied `name`.
    pub fn source_of(&self, name: &str) -> Option<Origin> {
        self.table.borrow().source_of(name)
    }

    /// The member an alias named `name` points at.
    pub fn original_name_of(&self, name: &str) -> Option<String> {
        self.table
            .borrow()
            .original_name_of(name)
            .map(str::to_string)
    }

    /// Add traits and definition fragments, then re-resolve.
    ///
    /// On failure the composition is rolled back and the error returned.
    pub fn add<I>(&self, args: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: Into<TraitArg>,
    {
        let args: Vec<TraitArg> = args.into_iter().map(Into::into).collect();
        self.edit(&args, |traits, definition| {
            for arg in &args {
                match arg {
                    TraitArg::Trait(child) => {
                        if !traits.iter().any(|t| t.ptr_eq(child)) {
                            traits.push(child.clone());
                        }
                    }
                    TraitArg::Definition(fragment) => {
                        merge(
                            definition.get_or_insert_with(Definition::new),
                            fragment.clone(),
                            &MergeOptions::new(),
                        )?;
                    }
                    TraitArg::Name(_) => {}
                }
            }
            Ok(())
        })
    }

    /// Remove traits (by identity) and definition members (by name),
    /// then re-resolve.
    pub fn remove<I>(&self, args: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: Into<TraitArg>,
    {
        let args: Vec<TraitArg> = args.into_iter().map(Into::into).collect();
        self.edit(&args, |traits, definition| {
            for arg in &args {
                match arg {
                    TraitArg::Trait(child) => traits.retain(|t| !t.ptr_eq(child)),
                    TraitArg::Definition(names) => {
                        if let Some(definition) = definition.as_mut() {
                            for name in names.names() {
                                definition.remove(name);
                            }
                        }
                    }
                    TraitArg::Name(_) => {}
                }
            }
            Ok(())
        })
    }

    fn edit<F>(&self, args: &[TraitArg], apply: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<Trait>, &mut Option<Definition>) -> Result<(), Error>,
    {
        if let Some((index, arg)) = args
            .iter()
            .enumerate()
            .find(|(_, arg)| matches!(arg, TraitArg::Name(_)))
        {
            return Err(invalid_argument(index, arg));
        }
        let saved_traits = self.traits();
        let saved_definition = self.definition();
        let applied = {
            let mut traits = self.traits.borrow_mut();
            let mut definition = self.definition.borrow_mut();
            apply(&mut traits, &mut definition)
        };
        match applied.and_then(|()| self.rebuild()) {
            Ok(()) => Ok(()),
            Err(error) => {
                *self.traits.borrow_mut() = saved_traits;
                *self.definition.borrow_mut() = saved_definition;
                tracing::debug!(type_name = %self.type_name, %error, "object edit rolled back");
                Err(error)
            }
        }
    }
}

impl Binding for ObjectMeta {
    fn refresh(&self, force: bool) -> Result<Option<Rc<Prototype>>, Error> {
        let stale =
            self.liveness == Liveness::Live && self.built_epoch.get() != composition_epoch();
        if force || stale {
            self.rebuild()?;
        }
        if self.pending.replace(false) {
            Ok(Some(self.prototype()))
        } else {
            Ok(None)
        }
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::required;
    use phenotype_core::{noop, Value};

    fn trait_with(name: &str, member: &str, value: i64) -> Trait {
        Trait::builder().named(name).member(member, value).build()
    }

    #[test]
    fn type_name_joins_trait_names() {
        let jet = trait_with("Jet", "speed", 900);
        let bird = trait_with("Bird", "wings", 2);
        let obj = compose(&[jet, bird], None).unwrap();
        assert_eq!(obj.type_name(), "Jet_Bird");
        let anonymous = compose(&[], Some(Definition::new().with("a", 1))).unwrap();
        assert_eq!(anonymous.type_name(), ANONYMOUS_TYPE_NAME);
    }

    #[test]
    fn materialized_trait_shares_its_prototype() {
        let t = trait_with("T", "a", 1);
        t.materialize().unwrap();
        let first = t.instantiate().unwrap();
        let second = t.instantiate().unwrap();
        assert!(Rc::ptr_eq(&first.prototype(), &second.prototype()));
        assert!(ObjectMeta::of(&first).is_some());
    }

    #[test]
    fn frozen_object_waits_for_refresh() {
        let t = trait_with("T", "a", 1);
        let obj = t.instantiate().unwrap();
        t.define("b", 2);
        assert_eq!(obj.get("b"), None);
        obj.refresh().unwrap();
        assert_eq!(obj.get("b"), Some(Value::from(2)));
    }

    #[test]
    fn live_object_follows_trait_edits() {
        let t = trait_with("T", "a", 1);
        let obj = compose_with(&[t.clone()], None, &ComposeOptions::live()).unwrap();
        t.define("b", 2);
        assert_eq!(obj.get("b"), Some(Value::from(2)));
        t.undefine("a");
        assert_eq!(obj.get("a"), None);
    }

    #[test]
    fn live_object_keeps_last_table_when_rebuild_fails() {
        let t = trait_with("T", "a", 1);
        let obj = compose_with(&[t.clone()], None, &ComposeOptions::live()).unwrap();
        t.define("needed", required());
        assert_eq!(obj.get("a"), Some(Value::from(1)));
        assert!(matches!(
            obj.refresh(),
            Err(Error::MissingRequiredMember { .. })
        ));
    }

    #[test]
    fn edits_roll_back_on_conflict() {
        let a = trait_with("A", "x", 1);
        let b = trait_with("B", "x", 2);
        let obj = compose(&[a.clone()], None).unwrap();
        let meta = ObjectMeta::of(&obj).unwrap();
        match meta.add([&b]) {
            Err(Error::UnresolvedConflict { member, .. }) => assert_eq!(member, "x"),
            other => panic!("expected UnresolvedConflict, got {other:?}"),
        }
        assert_eq!(meta.traits(), vec![a]);
        assert_eq!(obj.get("x"), Some(Value::from(1)));
    }

    #[test]
    fn edits_are_seen_on_next_access() {
        let a = trait_with("A", "x", 1);
        let b = Trait::builder().named("B").member("run", noop()).build();
        let obj = compose(&[a.clone()], None).unwrap();
        let meta = ObjectMeta::of(&obj).unwrap();
        meta.add([&b]).unwrap();
        assert!(obj.get("run").is_some());
        assert!(meta.has(&b));
        assert_eq!(meta.source_of("run").map(|o| o.name().to_string()), Some("B".into()));
        meta.remove([&a]).unwrap();
        assert_eq!(obj.get("x"), None);
    }

    #[test]
    fn object_definition_edits_merge_fragments() {
        let obj = compose(&[], Some(Definition::new().with("a", 1))).unwrap();
        let meta = ObjectMeta::of(&obj).unwrap();
        meta.add([Definition::new().with("b", 2)]).unwrap();
        assert_eq!(obj.get("b"), Some(Value::from(2)));
        meta.remove([Definition::new().with("a", Value::Null)]).unwrap();
        assert_eq!(obj.get("a"), None);
        assert!(matches!(
            meta.add([TraitArg::from("Name")]),
            Err(Error::InvalidConstructionArguments { index: 0, .. })
        ));
    }
}
