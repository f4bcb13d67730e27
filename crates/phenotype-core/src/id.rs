//! Strongly-typed identifiers, member origins and the composition epoch.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`TraitId`] allocation.
static TRAIT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`InstanceId`] allocation.
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`DeferredId`] allocation.
static DEFERRED_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-trait identifier.
///
/// Allocated from a monotonic atomic counter. Two traits with identical
/// names and members still have different IDs; trait identity in the
/// composition graph is always by ID, never by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitId(u64);

impl TraitId {
    /// Allocate a fresh, unique trait ID.
    pub fn next() -> Self {
        Self(TRAIT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TraitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique per-object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocate a fresh, unique instance ID.
    pub fn next() -> Self {
        Self(INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique per-token identifier for a [`Deferred`](crate::Deferred).
///
/// Carried by [`Error::Timeout`](crate::Error::Timeout) so a timeout can
/// be traced back to the token that expired without keeping it alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeferredId(u64);

impl DeferredId {
    /// Allocate a fresh, unique token ID.
    pub fn next() -> Self {
        Self(DEFERRED_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DeferredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resolved member came from.
///
/// Errors and metadata refer to contributors through an `Origin` instead
/// of holding the trait itself, so they stay `Clone + 'static` and never
/// form reference cycles with the composition graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A trait's own definition.
    Trait {
        /// The contributing trait.
        id: TraitId,
        /// Its name at the time the origin was recorded.
        name: String,
    },
    /// The object-level definition passed to `compose()`.
    Definition,
    /// The convention-defined default members.
    Defaults,
}

impl Origin {
    /// Origin for a trait.
    pub fn of_trait(id: TraitId, name: impl Into<String>) -> Self {
        Self::Trait {
            id,
            name: name.into(),
        }
    }

    /// Display name: the trait name, `<self>` or `<defaults>`.
    pub fn name(&self) -> &str {
        match self {
            Self::Trait { name, .. } => name,
            Self::Definition => "<self>",
            Self::Defaults => "<defaults>",
        }
    }

    /// The trait ID, if this origin is a trait.
    pub fn trait_id(&self) -> Option<TraitId> {
        match self {
            Self::Trait { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

thread_local! {
    // The composition graph is `Rc`-based and therefore confined to one
    // thread; so is its mutation counter.
    static COMPOSITION_EPOCH: Cell<u64> = const { Cell::new(0) };
}

/// Current composition epoch.
///
/// Incremented by every structural trait mutation on this thread. A
/// resolved table built at epoch `e` is stale once the epoch moves past
/// `e`.
pub fn composition_epoch() -> u64 {
    COMPOSITION_EPOCH.with(Cell::get)
}

/// Advance the composition epoch. Returns the new value.
pub fn advance_composition_epoch() -> u64 {
    COMPOSITION_EPOCH.with(|epoch| {
        let next = epoch.get() + 1;
        epoch.set(next);
        next
    })
}
