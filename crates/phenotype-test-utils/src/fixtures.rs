//! Sample traits for combination tests.
//!
//! The food processor pipeline:
//!
//! - [`peeler`], [`chopper`]: synchronous steps prefixing their input.
//! - [`mixer`]: asynchronous step completing after [`MIX_DELAY`] on a
//!   [`Scheduler`], guarded by a `mixingTimeout` member (milliseconds).
//! - [`oven`]: fails on anything ending in `rock`.

use std::time::Duration;

use phenotype_compose::Trait;
use phenotype_core::{Deferred, Error, Function, Scheduler, Value};

/// How long the mixer takes.
pub const MIX_DELAY: Duration = Duration::from_millis(30);

/// Default `mixingTimeout` of the mixer, in milliseconds.
pub const DEFAULT_MIXING_TIMEOUT_MS: i64 = 300;

/// Message of the oven's failure.
pub const ROCK_ERROR: &str = "you can't bake a rock!";

fn thing(args: &[Value]) -> Result<String, Error> {
    args.get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::raised("nothing to process"))
}

/// A pipe step returning `"<verb> <thing>"`.
pub fn prefixing(verb: &'static str) -> Function {
    Function::new("process", move |_, args| {
        Ok(Value::from(format!("{verb} {}", thing(args)?)))
    })
}

pub fn peeler() -> Trait {
    Trait::builder()
        .named("Peeler")
        .member("process", prefixing("peeled"))
        .build()
}

pub fn chopper() -> Trait {
    Trait::builder()
        .named("Chopper")
        .member("process", prefixing("chopped"))
        .build()
}

pub fn mixer(scheduler: &Scheduler) -> Trait {
    let scheduler = scheduler.clone();
    let process = Function::new("process", move |this, args| {
        let input = thing(args)?;
        let timeout = this
            .get("mixingTimeout")
            .and_then(|v| v.as_int())
            .unwrap_or(DEFAULT_MIXING_TIMEOUT_MS);
        let token = Deferred::with_timeout(&scheduler, Duration::from_millis(timeout.max(0) as u64));
        let finish = token.clone();
        scheduler.schedule(MIX_DELAY, move || {
            finish.done(format!("mixed {input}"));
        });
        Ok(Value::Deferred(token))
    });
    Trait::builder()
        .named("Mixer")
        .member("mixingTimeout", DEFAULT_MIXING_TIMEOUT_MS)
        .member("process", process)
        .build()
}

pub fn oven() -> Trait {
    Trait::builder()
        .named("Oven")
        .member(
            "process",
            Function::new("process", |_, args| {
                let input = thing(args)?;
                if input.ends_with("rock") {
                    return Err(Error::raised(ROCK_ERROR));
                }
                Ok(Value::from(format!("baked {input}")))
            }),
        )
        .build()
}

/// A trait with its own distinct `fly` function.
pub fn flyer(name: &str) -> Trait {
    Trait::builder()
        .named(name)
        .member("fly", Function::new("fly", |_, _| Ok(Value::Null)))
        .build()
}
