//! Property markers and the accessors they compile to.
//!
//! A compiled property is a single member function: called with no
//! argument it reads, called with one it writes. Plain properties store
//! their value in an own slot of the object (`_name` by default) and
//! notify `<name>changed` listeners when the stored value changes.

use std::rc::Rc;

use phenotype_core::{Error, Function, Instance, Value};

/// Configuration of a property.
#[derive(Clone, Debug, Default)]
pub struct PropertyOptions {
    /// Computes the value; storage is bypassed when set.
    pub getter: Option<Function>,
    /// Receives writes when a getter is present.
    pub setter: Option<Function>,
    /// Returned when nothing is stored and no getter answers.
    pub default_value: Option<Value>,
    /// Own-slot name overriding the conventional `<prefix><name>`.
    pub storage_name: Option<String>,
}

impl PropertyOptions {
    /// A plain stored property.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the getter.
    pub fn getter(mut self, getter: Function) -> Self {
        self.getter = Some(getter);
        self
    }

    /// Set the setter.
    pub fn setter(mut self, setter: Function) -> Self {
        self.setter = Some(setter);
        self
    }

    /// Set the value read while the storage slot was never written (or
    /// the getter answers `Null`).
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set the storage slot name.
    pub fn storage_name(mut self, name: &str) -> Self {
        self.storage_name = Some(name.to_string());
        self
    }
}

impl From<Function> for PropertyOptions {
    fn from(getter: Function) -> Self {
        Self::new().getter(getter)
    }
}

/// A property marker.
#[derive(Debug)]
pub struct Property {
    options: PropertyOptions,
}

impl Property {
    /// A property with the given configuration.
    pub fn new(options: PropertyOptions) -> Self {
        Self { options }
    }

    /// The configuration.
    pub fn options(&self) -> &PropertyOptions {
        &self.options
    }

    /// A getter without a setter.
    pub fn is_read_only(&self) -> bool {
        self.options.getter.is_some() && self.options.setter.is_none()
    }

    /// Compile to the accessor function for member `name`.
    pub fn compile(self: &Rc<Self>, name: &str, storage_prefix: &str) -> Function {
        let storage_name = self
            .options
            .storage_name
            .clone()
            .unwrap_or_else(|| format!("{storage_prefix}{name}"));
        let accessor = Rc::new(Accessor {
            property: Rc::clone(self),
            name: name.to_string(),
            storage_name,
        });
        let body = Rc::clone(&accessor);
        Function::new(name, move |this, args| body.access(this, args)).with_attachment(accessor)
    }
}

/// The state behind a compiled property function.
#[derive(Debug)]
pub struct Accessor {
    property: Rc<Property>,
    name: String,
    storage_name: String,
}

impl Accessor {
    /// The accessor behind `function`, if it is a compiled property.
    pub fn of(function: &Function) -> Option<Rc<Accessor>> {
        function.attachment::<Accessor>()
    }

    /// The owning property marker.
    pub fn property(&self) -> &Rc<Property> {
        &self.property
    }

    /// Member name the property was compiled for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own slot holding the value.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// See [`Property::is_read_only`].
    pub fn is_read_only(&self) -> bool {
        self.property.is_read_only()
    }

    fn access(&self, this: &Instance, args: &[Value]) -> Result<Value, Error> {
        match args.first() {
            None => self.get(this),
            Some(value) => self.set(this, value.clone()),
        }
    }

    fn get(&self, this: &Instance) -> Result<Value, Error> {
        let options = &self.property.options;
        // A getter answering `Null` counts as no value; storage only when
        // the slot was never written.
        let value = match &options.getter {
            Some(getter) => Some(getter.call(this, &[])?).filter(|v| !v.is_null()),
            None => this.get(&self.storage_name),
        };
        Ok(value
            .or_else(|| options.default_value.clone())
            .unwrap_or_default())
    }

    fn set(&self, this: &Instance, value: Value) -> Result<Value, Error> {
        let options = &self.property.options;
        if let Some(getter) = &options.getter {
            let Some(setter) = &options.setter else {
                return Err(Error::ReadOnlyPropertyWrite {
                    member: self.name.clone(),
                });
            };
            setter.call(this, &[value])?;
            return getter.call(this, &[]);
        }
        let stored = this.get(&self.storage_name);
        if stored.as_ref().is_none_or(|previous| !previous.same(&value)) {
            let previous = stored.unwrap_or_default();
            this.set(&self.storage_name, value.clone());
            if let Some(emitter) = this.emitter() {
                emitter.property_changed(this, &self.name, &value, &previous)?;
            }
        }
        Ok(value)
    }
}
