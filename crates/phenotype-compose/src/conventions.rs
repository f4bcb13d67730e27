//! Naming conventions and default members applied during resolution.

use crate::member::{Definition, Member};

/// Conventions applied when a table is finalized.
///
/// Fixed for the lifetime of a resolution; composed objects keep the
/// conventions they were created with.
#[derive(Clone, Debug)]
pub struct Conventions {
    /// Prefix of the own slot a storage-backed property keeps its value in.
    ///
    /// Default: `"_"`, so property `size` stores into `_size`.
    pub storage_name_prefix: String,

    /// Members injected into every resolved table.
    ///
    /// A default member replaces whatever the composed traits contribute
    /// under the same name, but never the object's own definition.
    /// Default: none.
    pub default_members: Definition,
}

impl Conventions {
    /// Default property storage prefix.
    pub const DEFAULT_STORAGE_NAME_PREFIX: &'static str = "_";

    /// Conventions with default values.
    pub fn new() -> Self {
        Self {
            storage_name_prefix: Self::DEFAULT_STORAGE_NAME_PREFIX.to_string(),
            default_members: Definition::new(),
        }
    }

    /// Use `prefix` for property storage slots.
    pub fn with_storage_name_prefix(mut self, prefix: &str) -> Self {
        self.storage_name_prefix = prefix.to_string();
        self
    }

    /// Inject `member` as `name` into every resolved table.
    pub fn with_default_member(mut self, name: &str, member: impl Into<Member>) -> Self {
        self.default_members.insert(name, member);
        self
    }

    /// Whether these are the default conventions, the ones
    /// [`Trait::materialize`](crate::Trait::materialize) resolves with.
    pub fn is_default(&self) -> bool {
        self.storage_name_prefix == Self::DEFAULT_STORAGE_NAME_PREFIX
            && self.default_members.is_empty()
    }

    /// The storage slot name for property `name`.
    pub fn storage_name(&self, name: &str) -> String {
        format!("{}{}", self.storage_name_prefix, name)
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenotype_core::noop;

    #[test]
    fn default_storage_prefix_is_underscore() {
        let conventions = Conventions::default();
        assert_eq!(conventions.storage_name("size"), "_size");
        assert!(conventions.default_members.is_empty());
        assert!(conventions.is_default());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let conventions = Conventions::new()
            .with_storage_name_prefix("__")
            .with_default_member("greet", noop());
        assert_eq!(conventions.storage_name("size"), "__size");
        assert!(conventions.default_members.contains("greet"));
        assert!(!conventions.is_default());
        assert!(!Conventions::new().with_storage_name_prefix("$").is_default());
    }
}
