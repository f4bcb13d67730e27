//! Error taxonomy for trait composition.
//!
//! Structural errors (missing required members, conflicts, ambiguous
//! ancestors, invalid combinations) are raised synchronously when a
//! resolution is requested. Errors raised inside a pipe combination are
//! data: they travel forward as [`Value::Error`](crate::Value::Error) or
//! through a [`Deferred`](crate::Deferred) error channel.

use std::time::Duration;

use crate::id::{DeferredId, Origin};

fn join_origins(origins: &[Origin]) -> String {
    origins
        .iter()
        .map(Origin::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn pending_text(message: &Option<String>, method: &Option<String>) -> String {
    match (message, method) {
        (Some(message), _) => message.clone(),
        (None, Some(method)) => format!("implementation is pending, at method: \"{method}\""),
        (None, None) => "implementation is pending".to_string(),
    }
}

/// Errors surfaced by resolution, member access and combinations.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// A `Required` placeholder was never satisfied.
    #[error("Required member not found: \"{member}\", required by \"{required_by}\"")]
    MissingRequiredMember {
        /// The unsatisfied member.
        member: String,
        /// The contributor that declared the requirement.
        required_by: Origin,
    },

    /// Two or more different definitions collided and nothing overrode them.
    #[error("Unresolved conflict on member \"{member}\", sources: {}", join_origins(.sources))]
    UnresolvedConflict {
        /// The contested member.
        member: String,
        /// Every contributor, in the order they were merged.
        sources: Vec<Origin>,
    },

    /// `ancestor()` found more than one parent definition.
    #[error(
        "multiple ancestor definitions were found (single was expected). \
         member: \"{member}\", at: \"{at}\", sources: {}",
        join_origins(.sources)
    )]
    AmbiguousAncestor {
        /// The combined member.
        member: String,
        /// The trait that declared the combination.
        at: Origin,
        /// Every ancestor that defines the member.
        sources: Vec<Origin>,
    },

    /// A property marker was found among the definitions to combine.
    #[error("properties cannot be combined. member: \"{member}\"")]
    PropertyCombinationUnsupported {
        /// The combined member.
        member: String,
    },

    /// A combination `wrap` hook returned something other than a function.
    #[error("wrap must return a function. member: \"{member}\", at: \"{at}\"")]
    InvalidWrapResult {
        /// The combined member.
        member: String,
        /// The trait that declared the combination.
        at: Origin,
    },

    /// A value was written to a property with a getter and no setter.
    #[error("property is readonly: \"{member}\"")]
    ReadOnlyPropertyWrite {
        /// The property member name.
        member: String,
    },

    /// A trait constructor or mutator received a malformed argument list.
    #[error("Unexpected argument at index {index}, type: {kind}")]
    InvalidConstructionArguments {
        /// Position of the offending argument.
        index: usize,
        /// What was found there.
        kind: String,
    },

    /// A deferred result did not complete before its timeout.
    #[error("timeout")]
    Timeout {
        /// The token that expired.
        token: DeferredId,
        /// The configured timeout.
        after: Duration,
    },

    /// A non-function member was called or combined.
    #[error("member is not a function: \"{member}\"")]
    NotCallable {
        /// The member name.
        member: String,
    },

    /// A member lookup found nothing.
    #[error("member not found: \"{member}\", at: \"{at}\"")]
    UnknownMember {
        /// The missing member.
        member: String,
        /// Trait or object type name searched.
        at: String,
    },

    /// Adding a child trait would make a trait its own ancestor.
    #[error("cannot add \"{child}\" to \"{parent}\": a trait cannot be its own ancestor")]
    CyclicComposition {
        /// The trait being mutated.
        parent: Origin,
        /// The rejected child.
        child: Origin,
    },

    /// `from`/`aliasOf` indirections redirect back onto themselves.
    #[error("member indirection does not terminate: \"{member}\"")]
    CyclicIndirection {
        /// The member being resolved.
        member: String,
    },

    /// An event type was empty.
    #[error("invalid event type: {event_type:?}")]
    InvalidEventType {
        /// The rejected type.
        event_type: String,
    },

    /// A placeholder implementation was invoked.
    #[error("{}", pending_text(.message, .method))]
    Pending {
        /// Custom message, if any.
        message: Option<String>,
        /// Member the placeholder was reached through, when known.
        method: Option<String>,
    },

    /// Object-metadata operation on an object built outside the factory.
    #[error("object has no composition metadata")]
    NotComposed,

    /// An error raised by member code.
    #[error("{message}")]
    Raised {
        /// Human-readable description.
        message: String,
    },
}

impl Error {
    /// An error raised by member code.
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised {
            message: message.into(),
        }
    }

    /// Whether this is a deferred-result timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TraitId;

    #[test]
    fn conflict_message_lists_sources_in_order() {
        let err = Error::UnresolvedConflict {
            member: "fly".into(),
            sources: vec![
                Origin::of_trait(TraitId::next(), "Jet"),
                Origin::of_trait(TraitId::next(), "Bird"),
                Origin::Definition,
            ],
        };
        assert_eq!(
            err.to_string(),
            "Unresolved conflict on member \"fly\", sources: Jet, Bird, <self>"
        );
    }

    #[test]
    fn required_message_names_member_and_trait() {
        let err = Error::MissingRequiredMember {
            member: "legs".into(),
            required_by: Origin::of_trait(TraitId::next(), "Walker"),
        };
        assert_eq!(
            err.to_string(),
            "Required member not found: \"legs\", required by \"Walker\""
        );
    }

    #[test]
    fn pending_message_variants() {
        let plain = Error::Pending {
            message: None,
            method: None,
        };
        assert_eq!(plain.to_string(), "implementation is pending");
        let located = Error::Pending {
            message: None,
            method: Some("doSomething".into()),
        };
        assert_eq!(
            located.to_string(),
            "implementation is pending, at method: \"doSomething\""
        );
        let custom = Error::Pending {
            message: Some("I'm lazy".into()),
            method: Some("doSomething".into()),
        };
        assert_eq!(custom.to_string(), "I'm lazy");
    }

    #[test]
    fn timeout_is_recognised() {
        let err = Error::Timeout {
            token: DeferredId::next(),
            after: Duration::from_millis(5),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timeout");
        assert!(!Error::raised("boom").is_timeout());
    }
}
