//! Attribute groups.
//!
//! An [`AttributeGroup`] is one node of the attribute tree. It conforms to a
//! [`SchemaDescriptor`](crate::SchemaDescriptor), owns its child groups and
//! references the [`ManagedAttribute`]s stored in it. All access goes through
//! a scoped handle:
//!
//! - [`ReadableAttributeGroup`] (shared) for lookups and query registration
//! - [`MutableAttributeGroup`] (exclusive) for structural changes
//!
//! Handles always have to be taken top-down. A thread holding a handle on a
//! group must not try to take a handle on one of its ancestors.
//!
//! Every group also keeps the [`RegisteredQuery`] records of the queries that
//! reach it, so adding a field makes it visible to existing queries without
//! re-registering them.

mod handle;
mod registration;

pub use handle::*;
pub(crate) use registration::RegisteredAttribute;
use registration::RegisteredQuery;


use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::DataSource;
use crate::DataSourceId;
use crate::Error;
use crate::FieldKind;
use crate::ManagedAttribute;
use crate::QueryId;
use crate::Result;
use crate::SchemaRef;

pub type GroupId = u64;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// An attribute stored in a group, together with a strong reference to its
/// data source. The data source stays alive while any group still holds one
/// of its attributes.
#[derive(Clone)]
pub(crate) struct AttributeEntry {
    pub(crate) attribute: Arc<ManagedAttribute>,
    pub(crate) datasource: Arc<dyn DataSource>,
}

/// Contents of a group, reachable through the handles' `Deref`.
pub struct GroupState {
    schema: SchemaRef,
    attributes: BTreeMap<String, AttributeEntry>,
    sub_groups: BTreeMap<String, AttributeGroup>,
    repeated_sub_groups: BTreeMap<String, Vec<AttributeGroup>>,
    version_id: u64,
}

struct GroupInner {
    id: GroupId,
    depth: usize,
    state: Arc<RwLock<GroupState>>,
    /// Kept apart from `state` so registration can run while a structural
    /// lock is held
    registered_queries: RwLock<HashMap<QueryId, RegisteredQuery>>,
}

/// Cheap, cloneable reference to one node of the attribute tree.
#[derive(Clone)]
pub struct AttributeGroup {
    inner: Arc<GroupInner>,
}

impl AttributeGroup {
    /// Creates the root of a new attribute tree.
    pub fn from_schema(schema: SchemaRef) -> Self {
        Self::new(schema, 0)
    }

    fn new(
        schema: SchemaRef,
        depth: usize,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
                depth,
                state: Arc::new(RwLock::new(GroupState {
                    schema,
                    attributes: BTreeMap::new(),
                    sub_groups: BTreeMap::new(),
                    repeated_sub_groups: BTreeMap::new(),
                    version_id: 0,
                })),
                registered_queries: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    /// Distance from the root group, which has depth 0.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Blocks until shared access is available.
    pub fn acquire_readable(&self) -> ReadableAttributeGroup {
        ReadableAttributeGroup::new(self.clone(), self.inner.state.read_arc())
    }

    /// Blocks until exclusive access is available.
    pub fn acquire_mutable(&self) -> MutableAttributeGroup {
        MutableAttributeGroup::new(self.clone(), self.inner.state.write_arc())
    }

    /// Visits every attribute registered for `query_id` in this subtree.
    ///
    /// A readable handle is taken on each visited group and pushed onto
    /// `group_locks` after its children, so dropping the vector front to back
    /// releases children before their parents.
    pub(crate) fn traverse_query<F>(
        &self,
        query_id: QueryId,
        group_locks: &mut Vec<ReadableAttributeGroup>,
        attribute_fn: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&RegisteredAttribute) -> Result<()>,
    {
        let readable = self.acquire_readable();
        {
            let queries = self.inner.registered_queries.read();
            let registered = queries.get(&query_id).ok_or_else(|| {
                Error::Internal(format!(
                    "Query {} is not registered with attribute group {}.",
                    query_id,
                    self.id()
                ))
            })?;
            for child in registered.child_groups.values() {
                child.traverse_query(query_id, group_locks, attribute_fn)?;
            }
            for attribute in registered.attributes.values() {
                attribute_fn(attribute)?;
            }
        }
        group_locks.push(readable);
        Ok(())
    }
}

impl fmt::Debug for AttributeGroup {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AttributeGroup")
            .field("id", &self.inner.id)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

impl GroupState {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Incremented exactly once per structural change.
    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    pub fn get_attribute(
        &self,
        name: &str,
    ) -> Result<Arc<ManagedAttribute>> {
        self.attributes
            .get(name)
            .map(|entry| entry.attribute.clone())
            .ok_or_else(|| Error::NotFound(format!("Could not find requested attribute \"{name}\".")))
    }

    pub fn read_attribute<T>(
        &self,
        name: &str,
    ) -> Result<T>
    where
        T: TryFrom<crate::AttributeValue, Error = Error>,
    {
        self.get_attribute(name)?.read()
    }

    pub fn get_child_group(
        &self,
        name: &str,
    ) -> Result<AttributeGroup> {
        self.group_field_schema(name, false)?;
        self.sub_groups
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Could not find requested attribute group \"{name}\".")))
    }

    pub fn get_repeated_child_group(
        &self,
        name: &str,
        idx: usize,
    ) -> Result<AttributeGroup> {
        self.group_field_schema(name, true)?;
        let children = self.repeated_sub_groups.get(name).ok_or_else(|| {
            Error::NotFound(format!("Could not find requested repeated attribute group \"{name}\"."))
        })?;
        children.get(idx).cloned().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Invalid index {} for repeated attribute group \"{}\" of size {}.",
                idx,
                name,
                children.len()
            ))
        })
    }

    /// Number of elements of a repeated group. A declared but unused repeated
    /// field has size 0.
    pub fn repeated_child_group_size(
        &self,
        name: &str,
    ) -> Result<usize> {
        self.group_field_schema(name, true)?;
        Ok(self.repeated_sub_groups.get(name).map_or(0, Vec::len))
    }

    pub fn has_attribute(
        &self,
        name: &str,
    ) -> bool {
        self.attributes.contains_key(name)
    }

    /// True for a present singular group or a repeated group with at least
    /// one element.
    pub fn has_child_group(
        &self,
        name: &str,
    ) -> bool {
        self.sub_groups.contains_key(name) || self.repeated_sub_groups.get(name).is_some_and(|c| !c.is_empty())
    }

    pub fn attribute_names(&self) -> BTreeSet<String> {
        self.attributes.keys().cloned().collect()
    }

    pub fn child_group_names(&self) -> BTreeSet<String> {
        self.sub_groups.keys().cloned().collect()
    }

    pub fn repeated_child_group_names(&self) -> BTreeSet<String> {
        self.repeated_sub_groups.keys().cloned().collect()
    }

    /// Every distinct data source used by an attribute of this group.
    pub fn required_data_sources(&self) -> Vec<Arc<dyn DataSource>> {
        let mut sources: BTreeMap<DataSourceId, Arc<dyn DataSource>> = BTreeMap::new();
        for entry in self.attributes.values() {
            sources.entry(entry.datasource.id()).or_insert_with(|| entry.datasource.clone());
        }
        sources.into_values().collect()
    }

    fn group_field_schema(
        &self,
        name: &str,
        repeated: bool,
    ) -> Result<SchemaRef> {
        match self.schema.field_or_error(name)? {
            FieldKind::Group {
                schema,
                repeated: is_repeated,
            } if *is_repeated == repeated => Ok(schema.clone()),
            FieldKind::Group { repeated: true, .. } => Err(Error::InvalidArgument(format!(
                "Field \"{name}\" is a repeated attribute group."
            ))),
            FieldKind::Group { .. } => Err(Error::InvalidArgument(format!(
                "Field \"{name}\" is a singular attribute group."
            ))),
            FieldKind::Scalar(_) => Err(Error::InvalidArgument(format!(
                "Field \"{name}\" is an attribute, not an attribute group."
            ))),
        }
    }
}
