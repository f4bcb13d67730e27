//! Generic member-table merge.
//!
//! `merge` copies named entries from a source into any [`Mergeable`]
//! target, optionally descending into nested maps instead of replacing
//! them, and optionally routing every copy through a caller hook.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::instance::Instance;
use crate::value::{Members, Value};

/// A name-keyed table `merge` can write into.
pub trait Mergeable {
    /// Entry type stored under each name.
    type Entry: Clone;

    /// Current entry under `name`.
    fn entry(&self, name: &str) -> Option<Self::Entry>;

    /// Store `entry` under `name`.
    fn put(&mut self, name: &str, entry: Self::Entry);

    /// The nested map inside an entry, if it holds one.
    fn nested(entry: &Self::Entry) -> Option<Rc<RefCell<Members>>> {
        let _ = entry;
        None
    }
}

/// Options for [`merge`].
pub struct MergeOptions<'a, T: Mergeable> {
    /// Merge into nested maps present on both sides instead of replacing.
    pub recursive: bool,
    /// Per-member copy hook. Receives the target, the member name and the
    /// incoming entry, and decides what (if anything) to store.
    #[allow(clippy::type_complexity)]
    pub member_copy: Option<&'a dyn Fn(&mut T, &str, T::Entry) -> Result<(), Error>>,
}

impl<'a, T: Mergeable> MergeOptions<'a, T> {
    /// Shallow overwrite with no hook.
    pub fn new() -> Self {
        Self {
            recursive: false,
            member_copy: None,
        }
    }

    /// Recursive merge with no hook.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            member_copy: None,
        }
    }

    /// Route every top-level copy through `hook`.
    pub fn with_member_copy(
        mut self,
        hook: &'a dyn Fn(&mut T, &str, T::Entry) -> Result<(), Error>,
    ) -> Self {
        self.member_copy = Some(hook);
        self
    }
}

impl<T: Mergeable> Default for MergeOptions<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `source` entries into `target`, in source order.
///
/// Nested maps are merged with plain stores; the copy hook only sees
/// top-level members.
pub fn merge<T, I>(target: &mut T, source: I, options: &MergeOptions<'_, T>) -> Result<(), Error>
where
    T: Mergeable,
    I: IntoIterator<Item = (String, T::Entry)>,
{
    for (name, incoming) in source {
        if options.recursive {
            let current = target.entry(&name);
            if let (Some(into), Some(from)) =
                (current.as_ref().and_then(T::nested), T::nested(&incoming))
            {
                merge_maps(&into, &from)?;
                continue;
            }
        }
        match options.member_copy {
            Some(copy) => copy(target, &name, incoming)?,
            None => target.put(&name, incoming),
        }
    }
    Ok(())
}

fn merge_maps(into: &Rc<RefCell<Members>>, from: &Rc<RefCell<Members>>) -> Result<(), Error> {
    if Rc::ptr_eq(into, from) {
        return Ok(());
    }
    let entries: Vec<(String, Value)> = from
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merge(&mut *into.borrow_mut(), entries, &MergeOptions::recursive())
}

impl Mergeable for Members {
    type Entry = Value;

    fn entry(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn put(&mut self, name: &str, entry: Value) {
        self.insert(name.to_string(), entry);
    }

    fn nested(entry: &Value) -> Option<Rc<RefCell<Members>>> {
        entry.as_map().cloned()
    }
}

/// Merging into an object writes its own slots; existing entries are
/// looked up through the prototype as well.
impl Mergeable for Instance {
    type Entry = Value;

    fn entry(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn put(&mut self, name: &str, entry: Value) {
        self.set(name, entry);
    }

    fn nested(entry: &Value) -> Option<Rc<RefCell<Members>>> {
        entry.as_map().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn members(entries: &[(&str, Value)]) -> Members {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn shallow_merge_replaces_nested_maps() {
        let inner = Value::map([("a", Value::from(1))]);
        let mut target = members(&[("config", inner.clone())]);
        let incoming = Value::map([("b", Value::from(2))]);
        merge(
            &mut target,
            members(&[("config", incoming.clone())]),
            &MergeOptions::new(),
        )
        .unwrap();
        assert_eq!(target["config"], incoming);
        assert_eq!(inner.get("b"), None);
    }

    #[test]
    fn recursive_merge_descends_into_maps() {
        let inner = Value::map([("a", Value::from(1))]);
        let mut target = members(&[("config", inner.clone()), ("x", Value::from(0))]);
        let source = members(&[
            ("config", Value::map([("b", Value::from(2))])),
            ("x", Value::from(9)),
            ("y", Value::from("new")),
        ]);
        merge(&mut target, source, &MergeOptions::recursive()).unwrap();

        assert_eq!(target["config"], inner);
        assert_eq!(inner.get("a"), Some(Value::from(1)));
        assert_eq!(inner.get("b"), Some(Value::from(2)));
        assert_eq!(target["x"], Value::from(9));
        assert_eq!(
            target.keys().collect::<Vec<_>>(),
            vec!["config", "x", "y"]
        );
    }

    #[test]
    fn member_copy_hook_decides_each_store() {
        let mut target = Members::new();
        let skip_nulls = |target: &mut Members, name: &str, value: Value| -> Result<(), Error> {
            if !value.is_null() {
                target.put(name, value);
            }
            Ok(())
        };
        let options = MergeOptions::new().with_member_copy(&skip_nulls);
        merge(
            &mut target,
            members(&[("a", Value::Null), ("b", Value::from(true))]),
            &options,
        )
        .unwrap();
        assert!(!target.contains_key("a"));
        assert_eq!(target["b"], Value::from(true));
    }

    #[test]
    fn hook_errors_abort_the_merge() {
        let mut target = Members::new();
        let err = merge(
            &mut target,
            members(&[("a", Value::Null)]),
            &MergeOptions::new()
                .with_member_copy(&|_, name, _| Err(Error::raised(format!("no {name}")))),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no a");
    }

    #[test]
    fn merge_into_instance_writes_own_slots() {
        let mut obj = Instance::bare();
        merge(
            &mut obj,
            members(&[("name", Value::from("bob"))]),
            &MergeOptions::new(),
        )
        .unwrap();
        assert!(obj.has_own("name"));
        assert_eq!(obj.get("name"), Some(Value::from("bob")));
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    fn arb_members() -> impl Strategy<Value = Members> {
        prop::collection::vec(("[a-e]", arb_scalar()), 0..12)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn merge_into_empty_copies_in_order(source in arb_members()) {
            let mut target = Members::new();
            merge(&mut target, source.clone(), &MergeOptions::new()).unwrap();
            prop_assert_eq!(target, source);
        }

        #[test]
        fn merging_a_table_into_itself_is_identity(table in arb_members()) {
            let mut target = table.clone();
            merge(&mut target, table.clone(), &MergeOptions::recursive()).unwrap();
            prop_assert_eq!(target, table);
        }

        #[test]
        fn source_entries_win(target in arb_members(), source in arb_members()) {
            let mut merged = target.clone();
            merge(&mut merged, source.clone(), &MergeOptions::new()).unwrap();
            for (name, value) in &source {
                prop_assert_eq!(&merged[name.as_str()], value);
            }
            for (name, value) in &target {
                if !source.contains_key(name) {
                    prop_assert_eq!(&merged[name.as_str()], value);
                }
            }
            prop_assert!(merged.keys().take(target.len()).eq(target.keys()));
        }

        #[test]
        fn recursive_merge_of_shared_map_is_a_no_op(table in arb_members()) {
            let shared = Value::Map(Rc::new(RefCell::new(table.clone())));
            let mut target = members(&[("config", shared.clone())]);
            merge(
                &mut target,
                members(&[("config", shared.clone())]),
                &MergeOptions::recursive(),
            )
            .unwrap();
            prop_assert_eq!(&target["config"], &shared);
            prop_assert_eq!(shared.as_map().unwrap().borrow().clone(), table);
        }
    }
}
