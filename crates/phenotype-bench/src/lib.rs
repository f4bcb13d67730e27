//! Benchmark profiles for the Phenotype trait composition engine.
//!
//! Provides pre-built trait graphs for benchmarks:
//!
//! - [`layered_profile`]: a diamond-free tree of `depth` levels, `fanout`
//!   children per trait, each level contributing its own members
//! - [`wide_profile`]: one trait with `members` own functions
//! - [`pipe_profile`]: `stages` sibling steps joined by an ancestor pipe

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use phenotype_compose::{ancestors, Trait};
use phenotype_core::{Function, Value};

fn counting(name: &str, level: i64) -> Function {
    Function::new(name, move |_, args| {
        let input = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Value::from(input + level))
    })
}

/// Build a layered trait tree.
///
/// Every trait defines a function named after its path (`L`, `L_0`,
/// `L_0_1`, ...) and a `tag` member. Each parent overrides `tag`, so
/// sibling conflicts on it are settled one level up.
pub fn layered_profile(depth: usize, fanout: usize) -> Trait {
    fn level(remaining: usize, fanout: usize, path: &str) -> Trait {
        let mut builder = Trait::builder()
            .named(path)
            .member(path, counting(path, remaining as i64))
            .member("tag", path);
        if remaining > 0 {
            for i in 0..fanout {
                let child = level(remaining - 1, fanout, &format!("{path}_{i}"));
                builder = builder.with(&child);
            }
        }
        builder.build()
    }
    level(depth, fanout, "L")
}

/// Build a trait with `members` own functions named `m0`, `m1`, ...
pub fn wide_profile(members: usize) -> Trait {
    (0..members)
        .fold(Trait::builder().named("Wide"), |builder, i| {
            builder.member(&format!("m{i}"), counting("m", i as i64))
        })
        .build()
}

/// Build `stages` sibling traits each adding one to the piped value.
///
/// The returned trait combines them with an ancestor pipe on `step`.
pub fn pipe_profile(stages: usize) -> Trait {
    let mut builder = Trait::builder().named("Pipeline");
    for i in 0..stages {
        let stage = Trait::builder()
            .named(&format!("Stage{i}"))
            .member(
                "step",
                Function::new("step", |_, args| {
                    let input = args.get(1).and_then(Value::as_int).unwrap_or(0);
                    Ok(Value::from(input + 1))
                }),
            )
            .build();
        builder = builder.with(&stage);
    }
    builder.member("step", ancestors().pipe()).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_profile_resolves() {
        let root = layered_profile(3, 2);
        let table = root.resolve().unwrap();
        assert!(table.get("L").is_some());
        assert!(table.get("L_0_1").is_some());
        assert!(table.get("L_1_1_0").is_some());
        assert_eq!(table.get("tag"), Some(&Value::from("L")));
        // 15 path members plus `tag`
        assert_eq!(table.members().len(), 16);
    }

    #[test]
    fn wide_profile_has_every_member() {
        let table = wide_profile(16).resolve().unwrap();
        assert_eq!(table.members().len(), 16);
    }

    #[test]
    fn pipe_profile_counts_stages() {
        let obj = pipe_profile(5).instantiate().unwrap();
        assert_eq!(
            obj.call("step", &[Value::Null, Value::from(0)]),
            Ok(Value::from(5))
        );
    }
}
