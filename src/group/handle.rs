use std::ops::Deref;
use std::sync::Arc;

use parking_lot::ArcRwLockReadGuard;
use parking_lot::ArcRwLockWriteGuard;
use parking_lot::RawRwLock;
use tracing::debug;

use super::registration::check_registered_paths;
use super::registration::register_query_attribute;
use super::registration::register_query_child;
use super::registration::register_query_repeated_child;
use super::registration::validate_query;
use super::AttributeEntry;
use super::AttributeGroup;
use super::GroupState;
use crate::format_path;
use crate::AttributeGroupQuery;
use crate::Error;
use crate::FieldKind;
use crate::ManagedAttribute;
use crate::Path;
use crate::Result;

/// Shared access to one attribute group.
///
/// Lookups come from [`GroupState`] through `Deref`. The handle is `Send`,
/// but waiting for it blocks the thread, so async code takes it on the
/// blocking pool.
pub struct ReadableAttributeGroup {
    group: AttributeGroup,
    state: ArcRwLockReadGuard<RawRwLock, GroupState>,
}

impl ReadableAttributeGroup {
    pub(super) fn new(
        group: AttributeGroup,
        state: ArcRwLockReadGuard<RawRwLock, GroupState>,
    ) -> Self {
        Self { group, state }
    }

    pub fn group(&self) -> &AttributeGroup {
        &self.group
    }

    /// Registers `query` for `paths`, starting at this group, which must be
    /// the query's root.
    ///
    /// Every path is validated against the schema first; on any failure
    /// nothing is registered.
    pub fn register_query(
        &self,
        query: &AttributeGroupQuery,
        paths: Vec<Path>,
    ) -> Result<()> {
        if query.root_group_id() != self.group.id() {
            return Err(Error::InvalidArgument(
                "A query can only be registered with its own root attribute group.".into(),
            ));
        }
        validate_query(&self.state.schema, &paths)?;
        debug!(
            "registering query {} for [{}]",
            query.id(),
            paths.iter().map(|p| format_path(p)).collect::<Vec<_>>().join(", ")
        );

        let result = self
            .group
            .register_query_internal(&self.state, query.id(), query.root_node(), paths, None);
        if result.is_err() {
            self.group.unregister_query_internal(query.id());
        }
        result
    }

    /// Removes every record of `query` from this subtree and clears its
    /// output. Also done when the query is dropped.
    pub fn unregister_query(
        &self,
        query: &AttributeGroupQuery,
    ) {
        debug!("unregistering query {}", query.id());
        self.group.unregister_query_internal(query.id());
    }
}

impl Deref for ReadableAttributeGroup {
    type Target = GroupState;

    fn deref(&self) -> &GroupState {
        &self.state
    }
}

/// Exclusive access to one attribute group.
///
/// Every successful structural change bumps the group version once and
/// updates the queries registered with this group. Failed changes leave the
/// group untouched.
pub struct MutableAttributeGroup {
    group: AttributeGroup,
    state: ArcRwLockWriteGuard<RawRwLock, GroupState>,
}

impl MutableAttributeGroup {
    pub(super) fn new(
        group: AttributeGroup,
        state: ArcRwLockWriteGuard<RawRwLock, GroupState>,
    ) -> Self {
        Self { group, state }
    }

    pub fn group(&self) -> &AttributeGroup {
        &self.group
    }

    /// Stores `attribute` under the scalar field `name`, replacing any
    /// attribute already stored there.
    pub fn add_attribute(
        &mut self,
        name: &str,
        attribute: Arc<ManagedAttribute>,
    ) -> Result<()> {
        let kind = match self.state.schema.field_or_error(name)? {
            FieldKind::Scalar(kind) => kind.clone(),
            FieldKind::Group { .. } => {
                return Err(Error::InvalidArgument(format!(
                    "Field \"{name}\" is an attribute group, not an attribute."
                )))
            }
        };
        if *attribute.kind() != kind {
            return Err(Error::InvalidArgument(format!(
                "Attempted to add a {} attribute to {} field \"{}\".",
                attribute.kind(),
                kind,
                name
            )));
        }
        let datasource = attribute.datasource().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Attribute added as \"{name}\" has no associated data source."
            ))
        })?;
        self.check_registered_queries()?;

        if self.state.attributes.contains_key(name) {
            self.remove_attribute(name)?;
        }

        let entry = AttributeEntry { attribute, datasource };
        self.state.attributes.insert(name.to_string(), entry.clone());
        self.state.version_id += 1;

        let depth = self.group.depth();
        let mut queries = self.group.inner.registered_queries.write();
        for registered in queries.values_mut() {
            register_query_attribute(depth, registered, name, &entry)?;
        }
        Ok(())
    }

    pub fn add_child_group(
        &mut self,
        name: &str,
    ) -> Result<AttributeGroup> {
        let schema = self.group_field_schema(name, false)?;
        if self.state.sub_groups.contains_key(name) {
            return Err(Error::InvalidArgument(format!(
                "Attempted to create two attribute groups named \"{name}\"."
            )));
        }
        self.check_registered_queries()?;

        let child = AttributeGroup::new(schema, self.group.depth() + 1);
        self.state.sub_groups.insert(name.to_string(), child.clone());
        self.state.version_id += 1;

        let depth = self.group.depth();
        let mut queries = self.group.inner.registered_queries.write();
        for (query_id, registered) in queries.iter_mut() {
            register_query_child(depth, *query_id, registered, name, &child)?;
        }
        Ok(child)
    }

    /// Appends a new element to the repeated group `name`. Its index is the
    /// previous size of the group.
    pub fn add_repeated_child_group(
        &mut self,
        name: &str,
    ) -> Result<AttributeGroup> {
        let schema = self.group_field_schema(name, true)?;
        self.check_registered_queries()?;

        let child = AttributeGroup::new(schema, self.group.depth() + 1);
        let children = self.state.repeated_sub_groups.entry(name.to_string()).or_default();
        let idx = children.len();
        children.push(child.clone());
        self.state.version_id += 1;

        let depth = self.group.depth();
        let mut queries = self.group.inner.registered_queries.write();
        for (query_id, registered) in queries.iter_mut() {
            register_query_repeated_child(depth, *query_id, registered, name, idx, &child)?;
        }
        Ok(child)
    }

    /// Removing an attribute that is not present succeeds.
    pub fn remove_attribute(
        &mut self,
        name: &str,
    ) -> Result<()> {
        if self.state.attributes.remove(name).is_none() {
            return match self.state.schema.field_or_error(name)? {
                FieldKind::Scalar(_) => Ok(()),
                FieldKind::Group { .. } => Err(Error::InvalidArgument(format!(
                    "Field \"{name}\" is an attribute group, not an attribute."
                ))),
            };
        }

        let mut queries = self.group.inner.registered_queries.write();
        for registered in queries.values_mut() {
            registered.attributes.remove(name);
            registered.node.remove_field(name);
        }
        self.state.version_id += 1;
        Ok(())
    }

    pub fn remove_child_group(
        &mut self,
        name: &str,
    ) -> Result<()> {
        self.group_field_schema(name, false)?;
        let Some(child) = self.state.sub_groups.remove(name) else {
            return Ok(());
        };
        self.detach_children(name, &[child]);
        self.state.version_id += 1;
        Ok(())
    }

    /// Removes every element of the repeated group `name`.
    pub fn remove_repeated_child_group(
        &mut self,
        name: &str,
    ) -> Result<()> {
        self.group_field_schema(name, true)?;
        let Some(children) = self.state.repeated_sub_groups.remove(name) else {
            return Ok(());
        };
        self.detach_children(name, &children);
        self.state.version_id += 1;
        Ok(())
    }

    fn check_registered_queries(&self) -> Result<()> {
        let queries = self.group.inner.registered_queries.read();
        check_registered_paths(self.group.depth(), &queries)
    }

    /// Drops every query record pointing at removed children. Handles to the
    /// removed groups may outlive the removal, so their own records are
    /// cleared too.
    fn detach_children(
        &self,
        name: &str,
        children: &[AttributeGroup],
    ) {
        let mut queries = self.group.inner.registered_queries.write();
        for (query_id, registered) in queries.iter_mut() {
            for child in children {
                if registered.child_groups.remove(&child.id()).is_some() {
                    child.unregister_query_internal(*query_id);
                }
            }
            registered.node.remove_field(name);
        }
    }
}

impl Deref for MutableAttributeGroup {
    type Target = GroupState;

    fn deref(&self) -> &GroupState {
        &self.state
    }
}
