//! The `HasEvents` trait: `on`, `off` and `emit` members backed by the
//! object's lazily created [`EventEmitter`](phenotype_core::EventEmitter).

use phenotype_core::{Error, Function, Instance, Value};

use crate::trait_def::Trait;

/// Name of the shared event trait.
pub const HAS_EVENTS: &str = "HasEvents";

thread_local! {
    static HAS_EVENTS_TRAIT: Trait = build();
}

/// The shared `HasEvents` trait.
///
/// One trait per thread, so composing it twice into a hierarchy is
/// deduplicated like any other shared child.
pub fn has_events() -> Trait {
    HAS_EVENTS_TRAIT.with(Trait::clone)
}

fn build() -> Trait {
    Trait::builder()
        .named(HAS_EVENTS)
        .member("on", Function::new("on", on))
        .member("off", Function::new("off", off))
        .member("emit", Function::new("emit", emit))
        .build()
}

fn not_callable(member: &str) -> Error {
    Error::NotCallable {
        member: member.to_string(),
    }
}

/// `on(type, handler)` or `on({type: handler, ...})`.
fn on(this: &Instance, args: &[Value]) -> Result<Value, Error> {
    let emitter = this.emitter_or_init();
    match args {
        [Value::Map(map)] => emitter.on_map(&map.borrow())?,
        [Value::Str(event_type), Value::Func(handler), ..] => {
            emitter.on(event_type, handler.clone())?;
        }
        [Value::Str(event_type), ..] => return Err(not_callable(event_type)),
        _ => {
            return Err(Error::InvalidEventType {
                event_type: args.first().map(|v| v.kind()).unwrap_or("null").to_string(),
            })
        }
    }
    Ok(Value::Object(this.clone()))
}

/// `off()`, `off(type)`, `off(type, handler)` or `off({type: _, ...})`.
fn off(this: &Instance, args: &[Value]) -> Result<Value, Error> {
    if let Some(emitter) = this.emitter() {
        match args.first() {
            Some(Value::Map(map)) => {
                for event_type in map.borrow().keys() {
                    emitter.off(Some(event_type.as_str()), None);
                }
            }
            first => {
                let event_type = first.and_then(Value::as_str);
                let handler = args.get(1).and_then(Value::as_func);
                emitter.off(event_type, handler);
            }
        }
    }
    Ok(Value::Object(this.clone()))
}

/// `emit(type, args...)`.
fn emit(this: &Instance, args: &[Value]) -> Result<Value, Error> {
    let event_type = args.first().and_then(Value::as_str).unwrap_or_default();
    if event_type.is_empty() {
        return Err(Error::InvalidEventType {
            event_type: event_type.to_string(),
        });
    }
    this.emit(event_type, &args[1..])?;
    Ok(Value::Object(this.clone()))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn counter(count: &Rc<Cell<u32>>) -> Function {
        let count = Rc::clone(count);
        Function::new("count", move |_, _| {
            count.set(count.get() + 1);
            Ok(Value::Null)
        })
    }

    #[test]
    fn has_events_is_shared_per_thread() {
        assert!(has_events().ptr_eq(&has_events()));
        assert_eq!(has_events().name(), HAS_EVENTS);
    }

    #[test]
    fn members_forward_to_the_emitter() {
        let dog = has_events().instantiate().unwrap();
        let barks = Rc::new(Cell::new(0));
        dog.call("on", &["barked walked".into(), counter(&barks).into()])
            .unwrap();
        dog.call("emit", &["barked".into()]).unwrap();
        dog.call("emit", &["walked".into()]).unwrap();
        dog.call("emit", &["sat".into()]).unwrap();
        assert_eq!(barks.get(), 2);

        dog.call("off", &["barked".into()]).unwrap();
        dog.call("emit", &["barked".into()]).unwrap();
        assert_eq!(barks.get(), 2);
    }

    #[test]
    fn on_accepts_a_handler_map() {
        let dog = has_events().instantiate().unwrap();
        let sniffs = Rc::new(Cell::new(0));
        let map = Value::map([("sniffed", Value::from(counter(&sniffs)))]);
        let returned = dog.call("on", &[map]).unwrap();
        assert_eq!(returned.as_object(), Some(&dog));
        dog.call("emit", &["sniffed".into()]).unwrap();
        assert_eq!(sniffs.get(), 1);
    }

    #[test]
    fn on_rejects_a_missing_handler() {
        let dog = has_events().instantiate().unwrap();
        assert_eq!(
            dog.call("on", &["barked".into()]).err(),
            Some(Error::NotCallable {
                member: "barked".into()
            })
        );
    }
}
