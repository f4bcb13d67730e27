//! The dynamic value model composed members are made of.
//!
//! A member's final value is a [`Value`]: scalar data, a shared list or
//! map, or a [`Function`] invoked with the composed object as receiver.
//! Identity follows reference semantics: two `List`s are the same value
//! only if they are the same list, which is what makes diamond
//! composition (the same definition reached twice) conflict-free.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::instance::Instance;

/// Signature of a native member body.
///
/// `this` is the composed object the member was called on.
pub type NativeFn = dyn Fn(&Instance, &[Value]) -> Result<Value, Error>;

/// An ordered name → value table.
pub type Members = IndexMap<String, Value>;

/// A named callable member.
///
/// Cloning a `Function` shares the callable; [`ptr_eq`](Self::ptr_eq)
/// (and `==`) compare callable identity, never behaviour.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    body: Rc<NativeFn>,
    attachment: Option<Rc<dyn Any>>,
}

impl Function {
    /// Wrap a closure as a member function.
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, Error> + 'static,
    {
        Self {
            name: Rc::from(name),
            body: Rc::new(body),
            attachment: None,
        }
    }

    /// Attach typed metadata, retrievable with [`attachment`](Self::attachment).
    ///
    /// Property accessors use this to expose the property they compile.
    pub fn with_attachment<T: Any>(mut self, attachment: Rc<T>) -> Self {
        let attachment: Rc<dyn Any> = attachment;
        self.attachment = Some(attachment);
        self
    }

    /// The attachment, if one of type `T` is present.
    pub fn attachment<T: Any>(&self) -> Option<Rc<T>> {
        self.attachment.clone()?.downcast::<T>().ok()
    }

    /// The function's debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function with `this` as receiver.
    pub fn call(&self, this: &Instance, args: &[Value]) -> Result<Value, Error> {
        (self.body)(this, args)
    }

    /// Whether both handles share one callable.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// A function that does nothing and returns `Null`.
pub fn noop() -> Function {
    Function::new("noop", |_, _| Ok(Value::Null))
}

/// A placeholder member that fails with [`Error::Pending`] when called.
pub fn pending() -> Function {
    Function::new("pending", |_, _| {
        Err(Error::Pending {
            message: None,
            method: None,
        })
    })
}

/// A placeholder member that fails with a custom pending message.
pub fn pending_message(message: &str) -> Function {
    let message = message.to_string();
    Function::new("pending", move |_, _| {
        Err(Error::Pending {
            message: Some(message.clone()),
            method: None,
        })
    })
}

/// A dynamically typed member value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Shared mutable list.
    List(Rc<RefCell<Vec<Value>>>),
    /// Shared mutable map.
    Map(Rc<RefCell<Members>>),
    /// Callable member.
    Func(Function),
    /// A composed object.
    Object(Instance),
    /// A pending or completed asynchronous result.
    Deferred(Deferred),
    /// An error carried as data (pipe combinations, event payloads).
    Error(Box<Error>),
}

impl Value {
    /// A new shared list.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// A new shared map.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Strict identity: scalars by value, shared variants by reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Func(a), Self::Func(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Deferred(a), Self::Deferred(b)) => a.ptr_eq(b),
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Func(_) => "function",
            Self::Object(_) => "object",
            Self::Deferred(_) => "deferred",
            Self::Error(_) => "error",
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The number as `f64`, for `Int` or `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// The string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The function, if this is one.
    pub fn as_func(&self) -> Option<&Function> {
        match self {
            Self::Func(f) => Some(f),
            _ => None,
        }
    }

    /// The shared list, if this is one.
    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// The shared map, if this is one.
    pub fn as_map(&self) -> Option<&Rc<RefCell<Members>>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The object, if this is one.
    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The deferred token, if this is one.
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Self::Deferred(d) => Some(d),
            _ => None,
        }
    }

    /// The carried error, if this is one.
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Look up a key when this is a map.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_map()?.borrow().get(key).cloned()
    }

    /// Copy of the items when this is a list.
    pub fn items(&self) -> Option<Vec<Value>> {
        Some(self.as_list()?.borrow().clone())
    }

    /// Append to a list value; fails with `Raised` on anything else.
    pub fn push(&self, item: Value) -> Result<(), Error> {
        match self {
            Self::List(list) => {
                list.borrow_mut().push(item);
                Ok(())
            }
            other => Err(Error::raised(format!(
                "cannot push onto a {}",
                other.kind()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::List(l) => match l.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => f.write_str("List(<borrowed>)"),
            },
            Self::Map(m) => match m.try_borrow() {
                Ok(members) => f.debug_map().entries(members.iter()).finish(),
                Err(_) => f.write_str("Map(<borrowed>)"),
            },
            Self::Func(func) => write!(f, "{func:?}"),
            Self::Object(o) => write!(f, "{o:?}"),
            Self::Deferred(d) => write!(f, "{d:?}"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}

/// Plain text of a value: strings unquoted, lists comma-joined, errors
/// by their message.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(l) => match l.try_borrow() {
                Ok(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{item}")?;
                    }
                    Ok(())
                }
                Err(_) => f.write_str("<list>"),
            },
            Self::Map(_) => f.write_str("<map>"),
            Self::Func(func) => write!(f, "<function {}>", func.name()),
            Self::Object(o) => write!(f, "<{}>", o.type_name()),
            Self::Deferred(d) => write!(f, "<deferred {}>", d.id()),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Self::Func(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Self::Object(v)
    }
}

impl From<Deferred> for Value {
    fn from(v: Deferred) -> Self {
        Self::Deferred(v)
    }
}

impl From<Error> for Value {
    fn from(v: Error) -> Self {
        Self::Error(Box::new(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::list(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
