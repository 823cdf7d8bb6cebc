use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::ValueKind;
use crate::Error;
use crate::Result;

pub type SchemaRef = Arc<dyn SchemaDescriptor>;

/// Describes the fields an attribute group may hold.
///
/// The database never inspects anything beyond what this trait exposes, so a
/// schema can be generated from any message description language.
pub trait SchemaDescriptor: Send + Sync {
    /// Name of the message this schema describes.
    fn name(&self) -> &str;

    fn field(
        &self,
        name: &str,
    ) -> Option<&FieldKind>;

    fn field_names(&self) -> Vec<String>;

    fn field_or_error(
        &self,
        name: &str,
    ) -> Result<&FieldKind> {
        self.field(name).ok_or_else(|| {
            Error::InvalidArgument(format!("No such field \"{}\" in schema {}.", name, self.name()))
        })
    }
}

impl fmt::Debug for dyn SchemaDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SchemaDescriptor").field("name", &self.name()).finish()
    }
}

#[derive(Clone)]
pub enum FieldKind {
    /// A single typed value
    Scalar(ValueKind),
    /// A nested group, either singular or repeated
    Group { schema: SchemaRef, repeated: bool },
}

impl FieldKind {
    pub fn is_group(&self) -> bool {
        matches!(self, FieldKind::Group { .. })
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, FieldKind::Group { repeated: true, .. })
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            FieldKind::Scalar(kind) => write!(f, "Scalar({kind})"),
            FieldKind::Group { schema, repeated } => {
                write!(f, "Group({}, repeated: {})", schema.name(), repeated)
            }
        }
    }
}

/// In-memory [`SchemaDescriptor`] assembled with [`MessageSchemaBuilder`].
pub struct MessageSchema {
    name: String,
    fields: BTreeMap<String, FieldKind>,
}

impl MessageSchema {
    pub fn builder(name: impl Into<String>) -> MessageSchemaBuilder {
        MessageSchemaBuilder {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }
}

impl SchemaDescriptor for MessageSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn field(
        &self,
        name: &str,
    ) -> Option<&FieldKind> {
        self.fields.get(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

pub struct MessageSchemaBuilder {
    name: String,
    fields: BTreeMap<String, FieldKind>,
}

impl MessageSchemaBuilder {
    pub fn scalar(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
    ) -> Self {
        self.fields.insert(name.into(), FieldKind::Scalar(kind));
        self
    }

    pub fn enumeration(
        self,
        name: impl Into<String>,
        enum_type: Arc<super::EnumType>,
    ) -> Self {
        self.scalar(name, ValueKind::Enum(enum_type))
    }

    pub fn group(
        mut self,
        name: impl Into<String>,
        schema: SchemaRef,
    ) -> Self {
        self.fields.insert(name.into(), FieldKind::Group { schema, repeated: false });
        self
    }

    pub fn repeated_group(
        mut self,
        name: impl Into<String>,
        schema: SchemaRef,
    ) -> Self {
        self.fields.insert(name.into(), FieldKind::Group { schema, repeated: true });
        self
    }

    pub fn build(self) -> SchemaRef {
        Arc::new(MessageSchema {
            name: self.name,
            fields: self.fields,
        })
    }
}
