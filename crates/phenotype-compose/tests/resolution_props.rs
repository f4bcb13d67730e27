//! Property tests for the merge pass and conflict accumulation.

use phenotype_compose::{compose, Definition, Trait};
use phenotype_core::{merge, Error, Members, MergeOptions, Value};
use proptest::prelude::*;

fn traits_defining(values: &[i64]) -> Vec<Trait> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Trait::builder()
                .named(&format!("T{i}"))
                .member("m", *v)
                .build()
        })
        .collect()
}

fn arb_members() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..16)
}

fn members_of(entries: &[(String, i64)]) -> Members {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(*v)))
        .collect()
}

proptest! {
    #[test]
    fn conflict_sources_follow_composition_order(
        values in prop::collection::btree_set(any::<i64>(), 2..6),
    ) {
        let values: Vec<i64> = values.into_iter().collect();
        let traits = traits_defining(&values);
        match compose(&traits, None) {
            Err(Error::UnresolvedConflict { member, sources }) => {
                prop_assert_eq!(member, "m");
                let names: Vec<&str> = sources.iter().map(|o| o.name()).collect();
                let expected: Vec<String> = (0..values.len()).map(|i| format!("T{i}")).collect();
                prop_assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
            }
            other => prop_assert!(false, "expected UnresolvedConflict, got {:?}", other),
        }
    }

    #[test]
    fn identical_definitions_deduplicate(value in any::<i64>(), count in 1usize..6) {
        let traits = traits_defining(&vec![value; count]);
        let obj = compose(&traits, None).unwrap();
        prop_assert_eq!(obj.get("m"), Some(Value::from(value)));
    }

    #[test]
    fn own_definition_settles_any_conflict(
        values in prop::collection::vec(any::<i64>(), 1..6),
        own in any::<i64>(),
    ) {
        let traits = traits_defining(&values);
        let obj = compose(&traits, Some(Definition::new().with("m", own))).unwrap();
        prop_assert_eq!(obj.get("m"), Some(Value::from(own)));
    }

    #[test]
    fn merging_nothing_is_identity(entries in arb_members()) {
        let mut target = members_of(&entries);
        let before = target.clone();
        merge(&mut target, Members::new(), &MergeOptions::new()).unwrap();
        prop_assert_eq!(target, before);
    }

    #[test]
    fn merging_into_empty_copies(entries in arb_members()) {
        let source = members_of(&entries);
        let mut target = Members::new();
        merge(&mut target, source.clone(), &MergeOptions::new()).unwrap();
        prop_assert_eq!(target, source);
    }
}
