//! Typed attribute values.
//!
//! Every scalar field of a schema is declared with a [`ValueKind`]; every
//! value stored in the database is an [`AttributeValue`] whose kind must match
//! the field it is attached to.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::Serializer;

use crate::Error;
use crate::Result;

/// A named, ordered set of legal enum values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    values: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(
        name: impl Into<String>,
        values: I,
    ) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Returns the value at `index`, failing if the enum has no such value.
    pub fn value(
        self: &Arc<Self>,
        index: usize,
    ) -> Result<EnumValue> {
        if index >= self.values.len() {
            return Err(Error::InvalidArgument(format!(
                "Enum {} has no value with index {}.",
                self.name, index
            )));
        }
        Ok(EnumValue {
            enum_type: self.clone(),
            index,
        })
    }

    pub fn value_by_name(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<EnumValue> {
        let index = self.values.iter().position(|v| v == name).ok_or_else(|| {
            Error::InvalidArgument(format!("Enum {} has no value named \"{}\".", self.name, name))
        })?;
        self.value(index)
    }
}

/// One value of an [`EnumType`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    enum_type: Arc<EnumType>,
    index: usize,
}

impl EnumValue {
    pub fn enum_type(&self) -> &Arc<EnumType> {
        &self.enum_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.enum_type.values[self.index]
    }
}

impl Serialize for EnumValue {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// The declared type of a scalar schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Enum(Arc<EnumType>),
}

impl fmt::Display for ValueKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ValueKind::Int32 => write!(f, "int32"),
            ValueKind::Int64 => write!(f, "int64"),
            ValueKind::Uint32 => write!(f, "uint32"),
            ValueKind::Uint64 => write!(f, "uint64"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::Double => write!(f, "double"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Bytes => write!(f, "bytes"),
            ValueKind::Enum(enum_type) => write!(f, "enum {}", enum_type.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttributeValue::Int32(_) => ValueKind::Int32,
            AttributeValue::Int64(_) => ValueKind::Int64,
            AttributeValue::Uint32(_) => ValueKind::Uint32,
            AttributeValue::Uint64(_) => ValueKind::Uint64,
            AttributeValue::Float(_) => ValueKind::Float,
            AttributeValue::Double(_) => ValueKind::Double,
            AttributeValue::Bool(_) => ValueKind::Bool,
            AttributeValue::String(_) => ValueKind::String,
            AttributeValue::Bytes(_) => ValueKind::Bytes,
            AttributeValue::Enum(v) => ValueKind::Enum(v.enum_type.clone()),
        }
    }

    /// Enum values only match the exact enum type they were created from.
    pub fn is_kind(
        &self,
        kind: &ValueKind,
    ) -> bool {
        self.kind() == *kind
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AttributeValue::Int32(v) => write!(f, "{v}"),
            AttributeValue::Int64(v) => write!(f, "{v}"),
            AttributeValue::Uint32(v) => write!(f, "{v}"),
            AttributeValue::Uint64(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Double(v) => write!(f, "{v}"),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "{v:?}"),
            AttributeValue::Bytes(v) => write!(f, "{v:02x?}"),
            AttributeValue::Enum(v) => write!(f, "{}", v.name()),
        }
    }
}

macro_rules! attribute_value_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    AttributeValue::$variant(value)
                }
            }

            impl TryFrom<AttributeValue> for $ty {
                type Error = crate::Error;

                fn try_from(value: AttributeValue) -> crate::Result<Self> {
                    match value {
                        AttributeValue::$variant(v) => Ok(v),
                        other => Err(crate::Error::InvalidArgument(format!(
                            "Attempted to read a {} attribute as {}.",
                            other.kind(),
                            stringify!($ty)
                        ))),
                    }
                }
            }
        )*
    };
}

attribute_value_conversions! {
    Int32 => i32,
    Int64 => i64,
    Uint32 => u32,
    Uint64 => u64,
    Float => f32,
    Double => f64,
    Bool => bool,
    String => String,
    Bytes => Vec<u8>,
    Enum => EnumValue,
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}
