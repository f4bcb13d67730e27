//! Core types for the Phenotype trait-composition engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! dynamic value model that composed members are made of, the composed
//! object ([`Instance`]) and its resolved [`Prototype`], the error
//! taxonomy, and the two runtime collaborators the resolver consumes but
//! does not own: the [`EventEmitter`] and the [`Deferred`] completion
//! token (driven by the cooperative [`Scheduler`]).
//!
//! ```text
//! Instance ──► own slots (property storage, ad-hoc fields)
//!    │
//!    ├──► Prototype (resolved member table, name → Value)
//!    ├──► EventEmitter (lazy, created by the first `on`)
//!    └──► Binding (optional; owned by phenotype-compose, re-derives the prototype)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod deferred;
pub mod error;
pub mod events;
pub mod id;
pub mod instance;
pub mod merge;
pub mod scheduler;
pub mod value;

pub use deferred::{Continuation, Deferred};
pub use error::Error;
pub use events::EventEmitter;
pub use id::{
    advance_composition_epoch, composition_epoch, DeferredId, InstanceId, Origin, TraitId,
};
pub use instance::{refresh, Binding, Instance, Prototype};
pub use merge::{merge, MergeOptions, Mergeable};
pub use scheduler::{Scheduler, TimerId};
pub use value::{noop, pending, pending_message, Function, Members, NativeFn, Value};
