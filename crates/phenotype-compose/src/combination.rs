//! Combination markers: assembling ancestor definitions into one callable.
//!
//! A [`Combination`] gathers the definitions of one member from the
//! direct ancestors of the trait that declares it, optionally wraps them,
//! adds `before`/`then` steps, and compiles the result to a single
//! function with one of two disciplines:
//!
//! - **parallel**: every step is called with the original arguments; the
//!   last step's result is returned.
//! - **pipe**: each step is called with `(error, value)` from the step
//!   before it. A step returning a [`Deferred`] suspends the pipe until
//!   the token completes; the caller then gets a tail token instead of a
//!   value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use phenotype_core::{noop, Deferred, Error, Function, Instance, Value};
use smallvec::SmallVec;

use crate::member::{Member, Source};
use crate::meta::{BaseMembers, ResolveScope, MAX_INDIRECTION_DEPTH};

/// Hook that replaces a combined sequence with a wrapper function.
///
/// Receives the compiled ancestor sequence and the members the declaring
/// trait's own definition shadowed. Must return a [`Value::Func`].
pub type WrapFn = dyn Fn(Function, &BaseMembers) -> Result<Value, Error>;

type Steps = SmallVec<[(Function, Source); 4]>;

/// How a combination assembles and runs its steps.
#[derive(Clone)]
pub struct CombinationOptions {
    /// Keep running after a failing step.
    pub continue_on_error: bool,
    /// Thread `(error, value)` through the steps.
    pub pipe: bool,
    /// Fail when more than one ancestor defines the member.
    pub single_ancestor: bool,
    /// Expand ancestor conflicts into their contributors instead of failing.
    pub recursive: bool,
    /// Gather the member from the declaring trait's direct ancestors.
    pub ancestors: bool,
    /// Step run before everything else.
    pub before: Option<Function>,
    /// Step run after everything else.
    pub then: Option<Function>,
    /// Replace the gathered sequence with a wrapper.
    pub wrap: Option<Rc<WrapFn>>,
}

impl Default for CombinationOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            pipe: false,
            single_ancestor: false,
            recursive: true,
            ancestors: false,
            before: None,
            then: None,
            wrap: None,
        }
    }
}

impl fmt::Debug for CombinationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinationOptions")
            .field("continue_on_error", &self.continue_on_error)
            .field("pipe", &self.pipe)
            .field("single_ancestor", &self.single_ancestor)
            .field("recursive", &self.recursive)
            .field("ancestors", &self.ancestors)
            .field("before", &self.before)
            .field("then", &self.then)
            .field("wrap", &self.wrap.is_some())
            .finish()
    }
}

/// A combination marker.
#[derive(Clone, Debug, Default)]
pub struct Combination {
    options: CombinationOptions,
}

/// A combination with default options and no ancestors.
pub fn combination() -> Combination {
    Combination::default()
}

/// Every direct ancestor's definition, in declaration order.
pub fn ancestors() -> Combination {
    Combination::new(CombinationOptions {
        ancestors: true,
        ..CombinationOptions::default()
    })
}

/// Exactly one ancestor's definition; more than one is an error.
pub fn ancestor() -> Combination {
    Combination::new(CombinationOptions {
        ancestors: true,
        single_ancestor: true,
        ..CombinationOptions::default()
    })
}

impl Combination {
    /// A combination with explicit options.
    pub fn new(options: CombinationOptions) -> Self {
        Self { options }
    }

    /// The options.
    pub fn options(&self) -> &CombinationOptions {
        &self.options
    }

    /// Switch to pipe mode.
    pub fn pipe(mut self) -> Self {
        self.options.pipe = true;
        self
    }

    /// Keep going after failing steps.
    pub fn continue_on_error(mut self) -> Self {
        self.options.continue_on_error = true;
        self
    }

    /// Expand (`true`) or reject (`false`) conflicting ancestors.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.options.recursive = recursive;
        self
    }

    /// Append a final step.
    pub fn then(mut self, step: Function) -> Self {
        self.options.then = Some(step);
        self
    }

    /// Prepend a first step.
    pub fn before(mut self, step: Function) -> Self {
        self.options.before = Some(step);
        self
    }

    /// Wrap the gathered sequence.
    pub fn wrap<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(Function, &BaseMembers) -> Result<Value, Error> + 'static,
    {
        self.options.wrap = Some(Rc::new(wrapper));
        self
    }

    /// Build the single function for member `name` declared by `source`.
    pub(crate) fn compile(
        &self,
        name: &str,
        source: &Source,
        scope: &ResolveScope<'_>,
    ) -> Result<Function, Error> {
        let steps = self.sequence(name, source, scope)?;
        tracing::debug!(
            member = name,
            at = %source.origin(),
            steps = steps.len(),
            pipe = self.options.pipe,
            "compiled combination"
        );
        Ok(self.compile_steps(name, steps))
    }

    fn sequence(&self, name: &str, source: &Source, scope: &ResolveScope<'_>) -> Result<Steps, Error> {
        let mut steps = Steps::new();
        if self.options.ancestors {
            for ancestor in scope.ancestors_of(source) {
                let meta = ancestor.meta();
                let Some(definition) = meta.subject().get(name) else {
                    continue;
                };
                let from = match definition {
                    Member::Combination(_) => meta
                        .source(name)
                        .cloned()
                        .unwrap_or_else(|| Source::of(&ancestor)),
                    _ => Source::of(&ancestor),
                };
                self.gather(name, definition, &from, scope, &mut steps, 0)?;
            }
            if self.options.single_ancestor && steps.len() > 1 {
                return Err(Error::AmbiguousAncestor {
                    member: name.to_string(),
                    at: source.origin(),
                    sources: steps.iter().map(|(_, s)| s.origin()).collect(),
                });
            }
        }

        if let Some(wrap) = &self.options.wrap {
            let inner = self.compile_steps(name, std::mem::take(&mut steps));
            let Value::Func(wrapped) = wrap(inner, &scope.base_of(source))? else {
                return Err(Error::InvalidWrapResult {
                    member: name.to_string(),
                    at: source.origin(),
                });
            };
            steps.push((wrapped, source.clone()));
        }

        if let Some(before) = &self.options.before {
            steps.insert(0, (before.clone(), source.clone()));
        }
        if let Some(then) = &self.options.then {
            steps.push((then.clone(), source.clone()));
        }
        Ok(steps)
    }

    fn gather(
        &self,
        name: &str,
        definition: &Member,
        source: &Source,
        scope: &ResolveScope<'_>,
        steps: &mut Steps,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > MAX_INDIRECTION_DEPTH {
            return Err(Error::CyclicIndirection {
                member: name.to_string(),
            });
        }
        match definition {
            Member::Value(Value::Func(f)) => steps.push((f.clone(), source.clone())),
            Member::Value(_) => {
                return Err(Error::NotCallable {
                    member: name.to_string(),
                })
            }
            Member::Required => {}
            Member::Property(_) => {
                return Err(Error::PropertyCombinationUnsupported {
                    member: name.to_string(),
                })
            }
            Member::Conflict(conflict) => {
                if !self.options.recursive {
                    return Err(conflict.to_error());
                }
                for (entry_source, entry) in conflict.entries() {
                    self.gather(name, entry, entry_source, scope, steps, depth + 1)?;
                }
            }
            Member::Combination(inner) => {
                steps.push((inner.compile(name, source, scope)?, source.clone()));
            }
            Member::From(from) => {
                let next = from.base().required_member(name)?;
                self.gather(name, &next, &Source::of(from.base()), scope, steps, depth + 1)?;
            }
            Member::AliasOf(alias) => {
                let next = alias.base().required_member(alias.name())?;
                self.gather(name, &next, &Source::of(alias.base()), scope, steps, depth + 1)?;
            }
        }
        Ok(())
    }

    fn compile_steps(&self, name: &str, steps: Steps) -> Function {
        if steps.is_empty() {
            return noop();
        }
        let steps: Rc<[Function]> = steps.into_iter().map(|(f, _)| f).collect();
        let continue_on_error = self.options.continue_on_error;
        if self.options.pipe {
            let member: Rc<str> = Rc::from(name);
            Function::new(name, move |this, args| {
                let run = Rc::new(PipeRun {
                    this: this.clone(),
                    member: Rc::clone(&member),
                    steps: Rc::clone(&steps),
                    continue_on_error,
                    index: Cell::new(0),
                    tail: RefCell::new(None),
                });
                let (error, value) = seed(args);
                run.run(error, value)
            })
        } else {
            Function::new(name, move |this, args| {
                let mut result = Value::Null;
                for step in steps.iter() {
                    match step.call(this, args) {
                        Ok(value) => result = value,
                        Err(error) if continue_on_error => {
                            tracing::trace!(step = step.name(), %error, "step failed, continuing");
                            result = Value::Null;
                        }
                        Err(error) => return Err(error),
                    }
                }
                Ok(result)
            })
        }
    }
}

fn seed(args: &[Value]) -> (Option<Error>, Value) {
    let error = match args.first() {
        None | Some(Value::Null) => None,
        Some(Value::Error(error)) => Some((**error).clone()),
        Some(other) => Some(Error::raised(other.to_string())),
    };
    (error, args.get(1).cloned().unwrap_or_default())
}

fn error_value(error: &Option<Error>) -> Value {
    error.clone().map_or(Value::Null, Value::from)
}

/// One in-flight pipe call.
struct PipeRun {
    this: Instance,
    member: Rc<str>,
    steps: Rc<[Function]>,
    continue_on_error: bool,
    index: Cell<usize>,
    tail: RefCell<Option<Deferred>>,
}

impl PipeRun {
    fn run(self: &Rc<Self>, mut error: Option<Error>, mut value: Value) -> Result<Value, Error> {
        while self.index.get() < self.steps.len() && (error.is_none() || self.continue_on_error) {
            let step = &self.steps[self.index.get()];
            match step.call(&self.this, &[error_value(&error), value.clone()]) {
                Ok(Value::Deferred(pending)) => {
                    let tail = self
                        .tail
                        .borrow_mut()
                        .get_or_insert_with(Deferred::new)
                        .clone();
                    tracing::debug!(
                        member = %self.member,
                        step = self.index.get(),
                        token = %pending.id(),
                        "pipe suspended"
                    );
                    let run = Rc::clone(self);
                    pending.set_callback(move |error, value| {
                        run.index.set(run.index.get() + 1);
                        tracing::debug!(member = %run.member, step = run.index.get(), "pipe resumed");
                        // The outcome travels through the tail token.
                        let _ = run.run(error, value);
                    });
                    return Ok(Value::Deferred(tail));
                }
                Ok(next) => {
                    error = None;
                    value = next;
                }
                Err(failure) => {
                    value = Value::Null;
                    let committed = self.tail.borrow().is_some();
                    if !self.continue_on_error && !committed {
                        return Err(failure);
                    }
                    if committed && !self.continue_on_error {
                        tracing::warn!(
                            member = %self.member,
                            error = %failure,
                            "pipe step failed after suspending, failing the tail"
                        );
                    }
                    error = Some(failure);
                }
            }
            self.index.set(self.index.get() + 1);
        }

        let tail = self.tail.borrow().clone();
        match tail {
            Some(tail) => {
                tail.complete(error, value);
                Ok(Value::Deferred(tail))
            }
            None => match error {
                Some(error) if !self.continue_on_error => Err(error),
                _ => Ok(value),
            },
        }
    }
}
