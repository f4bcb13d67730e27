//! Trait composition for Phenotype.
//!
//! A [`Trait`] bundles child traits and an own [`Definition`]. Resolving
//! a trait graph merges every contributor's members into one table:
//!
//! ```text
//! children (in order) ──► merge pass ──► Meta (Value | Required | Conflict |
//!        own definition ──┘                     Property | From | AliasOf |
//!                                               Combination per member)
//!                                                   │
//!                                                   ▼ finalize
//!                                          ResolvedTable (name → Value)
//!                                                   │
//!                                                   ▼ compose()
//!                                  Instance + ObjectMeta (Frozen | Live)
//! ```
//!
//! Identical definitions from different sources are deduplicated;
//! differing ones become a [`Conflict`] that must be resolved by an own
//! definition, a [`Combination`], or an alias. Unsatisfied
//! [`required`] members and unresolved conflicts are reported as errors
//! at resolution time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod combination;
pub mod conventions;
pub mod factory;
pub mod has_events;
pub mod member;
pub mod meta;
pub mod property;
pub mod trait_def;

pub use combination::{ancestor, ancestors, combination, Combination, CombinationOptions, WrapFn};
pub use conventions::Conventions;
pub use factory::{compose, compose_with, ComposeOptions, Liveness, ObjectMeta};
pub use has_events::has_events;
pub use member::{
    alias_of, conflict, from, property, required, AliasOf, Conflict, Definition, FromTrait,
    Member, Source,
};
pub use meta::{BaseMembers, Meta, ResolveOptions, ResolvedTable};
pub use property::{Accessor, Property, PropertyOptions};
pub use trait_def::{Trait, TraitArg, TraitBuilder, WeakTrait};
