//! Ancestor combinations: parallel, before/then, wrap and pipes.

use std::time::Duration;

use phenotype::prelude::*;
use phenotype_test_utils::fixtures::{
    chopper, mixer, oven, peeler, DEFAULT_MIXING_TIMEOUT_MS, ROCK_ERROR,
};
use phenotype_test_utils::{push_onto_arg, push_onto_member, strings, Recorder};

fn ints(list: &Value) -> Vec<i64> {
    list.items()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_int)
        .collect()
}

// ── Single ancestor ────────────────────────────────────────────────

#[test]
fn single_ancestor_runs_before_then() {
    let parent = Trait::builder()
        .named("Parent")
        .member("list", Value::list([]))
        .member("build", push_onto_member("list", 1))
        .build();
    let child = Trait::builder()
        .with(&parent)
        .member("build", ancestor().then(push_onto_member("list", 2)))
        .build();
    let obj = child.instantiate().unwrap();
    obj.call("build", &[]).unwrap();
    assert_eq!(ints(&obj.get("list").unwrap()), vec![1, 2]);
}

#[test]
fn single_ancestor_rejects_multiple_parents() {
    let parent = Trait::builder()
        .named("Parent")
        .member("list", Value::list([]))
        .member("build", push_onto_member("list", 1))
        .build();
    let parent2 = Trait::builder()
        .named("Parent2")
        .with(
            &Trait::builder()
                .member("list", required())
                .member("build", push_onto_member("list", 12))
                .build(),
        )
        .build();
    let child = Trait::builder()
        .named("Child")
        .with(&parent)
        .with(&parent2)
        .member("build", ancestor().then(push_onto_member("list", 2)))
        .build();
    match child.instantiate() {
        Err(Error::AmbiguousAncestor {
            member,
            at,
            sources,
        }) => {
            assert_eq!(member, "build");
            assert_eq!(at, child.origin());
            assert_eq!(sources, vec![parent.origin(), parent2.origin()]);
        }
        other => panic!("expected AmbiguousAncestor, got {other:?}"),
    }
}

// ── Ancestors ──────────────────────────────────────────────────────

fn packers() -> [Trait; 3] {
    ["apples", "sandwich", "juice"].map(|item| {
        Trait::builder()
            .named(&format!("{item}Packer"))
            .member("pack", push_onto_arg(item))
            .build()
    })
}

fn picnic_packer(pack: Combination) -> Instance {
    let [apples, sandwich, juice] = packers();
    Trait::builder()
        .with(&apples)
        .with(&sandwich)
        .with(&juice)
        .member("pack", pack)
        .build()
        .instantiate()
        .unwrap()
}

#[test]
fn ancestors_are_called_in_order() {
    let packer = picnic_packer(ancestors().then(push_onto_arg("napkins")));
    let basket = Value::list([]);
    packer.call("pack", &[basket.clone()]).unwrap();
    assert_eq!(strings(&basket), ["apples", "sandwich", "juice", "napkins"]);
}

#[test]
fn ancestors_can_be_preceded() {
    let packer = picnic_packer(ancestors().before(push_onto_arg("napkins")));
    let basket = Value::list([]);
    packer.call("pack", &[basket.clone()]).unwrap();
    assert_eq!(strings(&basket), ["napkins", "apples", "sandwich", "juice"]);
}

#[test]
fn ancestors_can_be_wrapped() {
    let packer = picnic_packer(ancestors().wrap(|inner, _base| {
        Ok(Value::Func(Function::new("pack", move |this, _| {
            let basket = Value::list([]);
            inner.call(this, &[basket.clone()])?;
            Ok(Value::map([
                ("basket", basket),
                ("sealed", Value::from(true)),
            ]))
        })))
    }));
    let bag = packer.call("pack", &[]).unwrap();
    assert_eq!(bag.get("sealed"), Some(Value::from(true)));
    assert_eq!(
        strings(&bag.get("basket").unwrap()),
        ["apples", "sandwich", "juice"]
    );
}

#[test]
fn wrap_sees_the_shadowed_base_members() {
    let recorder = Recorder::new();
    let greeter = Trait::builder()
        .named("Greeter")
        .member("greet", recorder.returning("base greet", "hello"))
        .build();
    let obj = Trait::builder()
        .with(&greeter)
        .member(
            "greet",
            combination().wrap(|_inner, base| {
                assert!(base.contains("greet"));
                let greet = base.get("greet").and_then(Member::as_value).cloned();
                Ok(greet.unwrap_or_default())
            }),
        )
        .build()
        .instantiate()
        .unwrap();
    assert_eq!(obj.call("greet", &[]).unwrap(), Value::from("hello"));
    assert_eq!(recorder.labels(), ["base greet"]);
}

#[test]
fn wrap_must_return_a_function() {
    let [apples, _, _] = packers();
    let t = Trait::builder()
        .named("Broken")
        .with(&apples)
        .member("pack", ancestors().wrap(|_, _| Ok(Value::from(3))))
        .build();
    match t.instantiate() {
        Err(Error::InvalidWrapResult { member, at }) => {
            assert_eq!(member, "pack");
            assert_eq!(at, t.origin());
        }
        other => panic!("expected InvalidWrapResult, got {other:?}"),
    }
}

#[test]
fn properties_cannot_be_combined() {
    let holder = Trait::builder()
        .member("size", property(PropertyOptions::new()))
        .build();
    let t = Trait::builder()
        .with(&holder)
        .member("size", ancestors())
        .build();
    assert!(matches!(
        t.instantiate(),
        Err(Error::PropertyCombinationUnsupported { .. })
    ));
}

#[test]
fn parallel_continue_on_error_runs_every_step() {
    let recorder = Recorder::new();
    let failing = Trait::builder()
        .member("run", recorder.failing("first", "boom"))
        .build();
    let ok = Trait::builder()
        .member("run", recorder.returning("second", 2))
        .build();
    let strict = Trait::builder()
        .with(&failing)
        .with(&ok)
        .member("run", ancestors())
        .build()
        .instantiate()
        .unwrap();
    assert_eq!(strict.call("run", &[]), Err(Error::raised("boom")));
    assert_eq!(recorder.labels(), ["first"]);

    recorder.clear();
    let lenient = Trait::builder()
        .with(&failing)
        .with(&ok)
        .member("run", ancestors().continue_on_error())
        .build()
        .instantiate()
        .unwrap();
    assert_eq!(lenient.call("run", &[]), Ok(Value::from(2)));
    assert_eq!(recorder.labels(), ["first", "second"]);
}

#[test]
fn nested_conflicts_are_expanded_recursively() {
    let recorder = Recorder::new();
    let a = Trait::builder().member("run", recorder.function("a")).build();
    let b = Trait::builder().member("run", recorder.function("b")).build();
    let c = Trait::builder().member("run", recorder.function("c")).build();
    let ab = Trait::builder().with(&a).with(&b).build();
    let obj = Trait::builder()
        .with(&ab)
        .with(&c)
        .member("run", ancestors())
        .build()
        .instantiate()
        .unwrap();
    obj.call("run", &[]).unwrap();
    assert_eq!(recorder.labels(), ["a", "b", "c"]);

    let flat = Trait::builder()
        .with(&ab)
        .with(&c)
        .member("run", ancestors().recursive(false))
        .build();
    assert!(matches!(
        flat.instantiate(),
        Err(Error::UnresolvedConflict { .. })
    ));
}

#[test]
fn object_level_combination_uses_composed_traits() {
    let [apples, sandwich, _] = packers();
    let obj = compose(
        &[apples, sandwich],
        Some(Definition::new().with("pack", ancestors())),
    )
    .unwrap();
    let basket = Value::list([]);
    obj.call("pack", &[basket.clone()]).unwrap();
    assert_eq!(strings(&basket), ["apples", "sandwich"]);
}

// ── Pipes ──────────────────────────────────────────────────────────

fn food_processor(steps: &[Trait], process: Combination) -> Instance {
    let mut builder = Trait::builder().named("FoodProcessor");
    for step in steps {
        builder = builder.with(step);
    }
    builder.member("process", process).build().instantiate().unwrap()
}

fn pipe_input(thing: &str) -> [Value; 2] {
    [Value::Null, Value::from(thing)]
}

#[test]
fn pipe_chains_sync_parents() {
    let processor = food_processor(&[peeler(), chopper()], ancestors().pipe());
    assert_eq!(
        processor.call("process", &pipe_input("banana")),
        Ok(Value::from("chopped peeled banana"))
    );
}

#[test]
fn pipe_stops_on_sync_error() {
    let processor = food_processor(&[peeler(), chopper(), oven()], ancestors().pipe());
    assert_eq!(
        processor.call("process", &pipe_input("rock")),
        Err(Error::raised(ROCK_ERROR))
    );
}

#[test]
fn pipe_forwards_errors_when_continuing() {
    let rescuer = Trait::builder()
        .named("Rescuer")
        .member(
            "process",
            Function::new("process", |_, args| match args.first() {
                Some(Value::Error(_)) => Ok(Value::from("rescued")),
                _ => Ok(args.get(1).cloned().unwrap_or_default()),
            }),
        )
        .build();
    let processor = food_processor(
        &[peeler(), oven(), rescuer],
        ancestors().pipe().continue_on_error(),
    );
    assert_eq!(
        processor.call("process", &pipe_input("rock")),
        Ok(Value::from("rescued"))
    );

    let ending_in_error = food_processor(
        &[peeler(), oven()],
        ancestors().pipe().continue_on_error(),
    );
    assert_eq!(
        ending_in_error.call("process", &pipe_input("rock")),
        Ok(Value::Null)
    );
}

#[test]
fn pipe_seed_error_aborts_without_continue() {
    let processor = food_processor(&[peeler()], ancestors().pipe());
    let seed = [Value::from(Error::raised("bad input")), Value::from("x")];
    assert_eq!(
        processor.call("process", &seed),
        Err(Error::raised("bad input"))
    );
}

#[test]
fn pipe_seed_error_of_plain_data_keeps_its_text() {
    let processor = food_processor(&[peeler()], ancestors().pipe());
    assert_eq!(
        processor.call("process", &[Value::from("banana")]),
        Err(Error::raised("banana"))
    );
}

fn await_outcome(scheduler: &Scheduler, result: Value) -> (Option<Error>, Value) {
    let token = result
        .as_deferred()
        .cloned()
        .unwrap_or_else(|| panic!("expected a deferred result, got {result:?}"));
    assert!(!token.is_complete());
    scheduler.run_until_idle();
    token.outcome().expect("deferred completed")
}

#[test]
fn pipe_chains_async_parents() {
    let scheduler = Scheduler::new();
    let processor = food_processor(
        &[peeler(), chopper(), mixer(&scheduler), oven()],
        ancestors().pipe(),
    );
    let result = processor.call("process", &pipe_input("banana")).unwrap();
    let (error, value) = await_outcome(&scheduler, result);
    assert_eq!(error, None);
    assert_eq!(value, Value::from("baked mixed chopped peeled banana"));
}

#[test]
fn pipe_reports_async_errors_through_the_tail() {
    let scheduler = Scheduler::new();
    let processor = food_processor(
        &[peeler(), chopper(), mixer(&scheduler), oven()],
        ancestors().pipe(),
    );
    let result = processor.call("process", &pipe_input("rock")).unwrap();
    let (error, _) = await_outcome(&scheduler, result);
    assert_eq!(error, Some(Error::raised(ROCK_ERROR)));
}

#[test]
fn pipe_times_out_slow_steps() {
    let scheduler = Scheduler::new();
    let processor = food_processor(
        &[peeler(), chopper(), mixer(&scheduler), oven()],
        ancestors().pipe(),
    );
    assert_eq!(
        processor.get("mixingTimeout"),
        Some(Value::from(DEFAULT_MIXING_TIMEOUT_MS))
    );
    processor.set("mixingTimeout", 5);
    let result = processor.call("process", &pipe_input("apple")).unwrap();
    let (error, _) = await_outcome(&scheduler, result);
    let error = error.expect("timed out");
    assert!(error.is_timeout());
    assert_eq!(error.to_string(), "timeout");
    match error {
        Error::Timeout { after, .. } => assert_eq!(after, Duration::from_millis(5)),
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn pipe_with_no_ancestors_is_a_noop() {
    let lonely = Trait::builder()
        .member("process", ancestors().pipe())
        .build()
        .instantiate()
        .unwrap();
    assert_eq!(lonely.call("process", &pipe_input("air")), Ok(Value::Null));
}
