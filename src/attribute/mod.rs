//! Managed attributes.
//!
//! A [`ManagedAttribute`] is the leaf of the attribute tree: one typed value,
//! a weak link back to the data source that refreshes it and, for writable
//! attributes, a setter that stages new values for the next flush.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;

use crate::AttributeValue;
use crate::DataSource;
use crate::Error;
use crate::Result;
use crate::ValueKind;

pub type AttributeSetter = Box<dyn Fn(AttributeValue) -> Result<()> + Send + Sync>;

pub struct ManagedAttribute {
    value: RwLock<AttributeValue>,
    kind: ValueKind,
    datasource: Weak<dyn DataSource>,
    setter: Option<AttributeSetter>,
}

impl ManagedAttribute {
    /// Creates a read-only attribute owned by `datasource`.
    ///
    /// The kind of `initial` fixes the kind of every later value.
    pub fn new(
        initial: impl Into<AttributeValue>,
        datasource: Weak<dyn DataSource>,
    ) -> Self {
        let value = initial.into();
        Self {
            kind: value.kind(),
            value: RwLock::new(value),
            datasource,
            setter: None,
        }
    }

    /// Makes the attribute writable. The setter receives values that already
    /// passed the kind check.
    pub fn with_setter<F>(
        mut self,
        setter: F,
    ) -> Self
    where
        F: Fn(AttributeValue) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    pub fn value(&self) -> AttributeValue {
        self.value.read().clone()
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Typed read of the current value.
    pub fn read<T>(&self) -> Result<T>
    where
        T: TryFrom<AttributeValue, Error = Error>,
    {
        T::try_from(self.value())
    }

    /// Stores a freshly read value. Called by the owning data source.
    pub fn assign_value(
        &self,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let value = value.into();
        if !value.is_kind(&self.kind) {
            return Err(Error::InvalidArgument(format!(
                "Attempted to assign a {} value to a {} attribute.",
                value.kind(),
                self.kind
            )));
        }
        *self.value.write() = value;
        Ok(())
    }

    /// The owning data source, if it is still alive.
    pub fn datasource(&self) -> Option<Arc<dyn DataSource>> {
        self.datasource.upgrade()
    }

    pub fn can_set(&self) -> bool {
        self.setter.is_some()
    }

    pub fn set(
        &self,
        value: AttributeValue,
    ) -> Result<()> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| Error::FailedPrecondition("Attempted to set an attribute that cannot be set.".into()))?;
        if !value.is_kind(&self.kind) {
            return Err(Error::InvalidArgument(format!(
                "Attempted to set a {} attribute to a {} value.",
                self.kind,
                value.kind()
            )));
        }
        setter(value)
    }
}

impl fmt::Debug for ManagedAttribute {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ManagedAttribute")
            .field("value", &*self.value.read())
            .field("settable", &self.can_set())
            .finish()
    }
}
