//! Phenotype: trait composition for dynamic objects.
//!
//! Traits bundle members and other traits. Composing them into an
//! object detects conflicting definitions, enforces required members,
//! and lets a member combine every ancestor's definition into one
//! callable (in parallel, or as a pipe that may suspend on a
//! [`Deferred`](types::Deferred)).
//!
//! This is the facade crate re-exporting the public API of the
//! Phenotype sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use phenotype::prelude::*;
//!
//! let bird = Trait::builder()
//!     .named("Bird")
//!     .member("fly", Function::new("fly", |_, _| Ok(Value::from("flap"))))
//!     .build();
//! let jet = Trait::builder()
//!     .named("Jet")
//!     .member("fly", Function::new("fly", |_, _| Ok(Value::from("roar"))))
//!     .build();
//!
//! // Two different `fly` members conflict until the object decides.
//! assert!(matches!(
//!     compose(&[jet.clone(), bird.clone()], None),
//!     Err(Error::UnresolvedConflict { .. })
//! ));
//!
//! // Calling every ancestor's `fly` in order settles it.
//! let jet_bird = compose(&[jet, bird], Some(Definition::new().with("fly", ancestors()))).unwrap();
//! assert_eq!(jet_bird.type_name(), "Jet_Bird");
//! assert_eq!(jet_bird.call("fly", &[]).unwrap(), Value::from("flap"));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `phenotype-core` | Values, objects, errors, events, deferred results, scheduler |
//! | [`compose`] | `phenotype-compose` | Traits, member markers, resolver, combinations, factory |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Value model, objects and runtime primitives (`phenotype-core`).
///
/// Contains [`types::Value`], [`types::Instance`], the [`types::Error`]
/// taxonomy, [`types::EventEmitter`], [`types::Deferred`] and the
/// virtual-time [`types::Scheduler`].
pub use phenotype_core as types;

/// Trait graph and resolution (`phenotype-compose`).
///
/// [`compose::Trait`] is the main building block; [`compose::compose`]
/// turns traits into objects.
pub use phenotype_compose as compose;

/// Common imports for typical Phenotype usage.
///
/// ```rust
/// use phenotype::prelude::*;
/// ```
pub mod prelude {
    // Values and objects
    pub use phenotype_core::{
        noop, pending, pending_message, refresh, Function, Instance, Members, Value,
    };

    // Errors and identities
    pub use phenotype_core::{Error, Origin};

    // Async
    pub use phenotype_core::{Deferred, Scheduler};

    // Traits and markers
    pub use phenotype_compose::{
        alias_of, ancestor, ancestors, combination, conflict, from, property, required,
        Combination, Definition, Member, PropertyOptions, Trait, TraitArg,
    };

    // Factory
    pub use phenotype_compose::{
        compose, compose_with, has_events, ComposeOptions, Conventions, Liveness, ObjectMeta,
    };
}
