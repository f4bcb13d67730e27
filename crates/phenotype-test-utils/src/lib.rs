//! Test utilities and fixtures for Phenotype development.
//!
//! Provides a call [`Recorder`] for listeners and combination steps,
//! list-pushing member functions, and the food processor traits in
//! [`fixtures`] that exercise pipe combinations on the virtual-time
//! scheduler.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::cell::RefCell;
use std::rc::Rc;

use phenotype_core::{Error, Function, Value};

/// Records every call made through the functions it hands out.
///
/// Clones share one log.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Rc<RefCell<Vec<(String, Vec<Value>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A function that records `(label, args)` and returns `Null`.
    pub fn function(&self, label: &str) -> Function {
        self.returning(label, Value::Null)
    }

    /// A function that records `(label, args)` and returns `value`.
    pub fn returning(&self, label: &str, value: impl Into<Value>) -> Function {
        let calls = Rc::clone(&self.calls);
        let owned = label.to_string();
        let value = value.into();
        Function::new(label, move |_, args| {
            calls.borrow_mut().push((owned.clone(), args.to_vec()));
            Ok(value.clone())
        })
    }

    /// A function that records `(label, args)` and fails with `message`.
    pub fn failing(&self, label: &str, message: &str) -> Function {
        let calls = Rc::clone(&self.calls);
        let owned = label.to_string();
        let message = message.to_string();
        Function::new(label, move |_, args| {
            calls.borrow_mut().push((owned.clone(), args.to_vec()));
            Err(Error::raised(message.clone()))
        })
    }

    /// Labels of recorded calls, in order.
    pub fn labels(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(l, _)| l.clone()).collect()
    }

    /// Arguments of the `index`-th call.
    pub fn args(&self, index: usize) -> Option<Vec<Value>> {
        self.calls.borrow().get(index).map(|(_, a)| a.clone())
    }

    /// Number of recorded calls.
    pub fn count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

/// Pushes `item` onto the list stored in member `member` of the receiver.
pub fn push_onto_member(member: &str, item: impl Into<Value>) -> Function {
    let member = member.to_string();
    let item = item.into();
    Function::new("push", move |this, _| {
        let list = this.get(&member).unwrap_or_default();
        list.push(item.clone())?;
        Ok(Value::Null)
    })
}

/// Pushes `item` onto the list passed as first argument.
pub fn push_onto_arg(item: impl Into<Value>) -> Function {
    let item = item.into();
    Function::new("push", move |_, args| {
        let list = args.first().cloned().unwrap_or_default();
        list.push(item.clone())?;
        Ok(Value::Null)
    })
}

/// Adds `by` to the integer in member `member` of the receiver (0 if unset).
pub fn increment(member: &str, by: i64) -> Function {
    let member = member.to_string();
    Function::new("increment", move |this, _| {
        let current = this.get(&member).and_then(|v| v.as_int()).unwrap_or(0);
        this.set(&member, current + by);
        Ok(Value::Null)
    })
}

/// String items of a list value, for assertions.
pub fn strings(list: &Value) -> Vec<String> {
    list.items()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
