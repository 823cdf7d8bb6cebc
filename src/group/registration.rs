//! Query registration.
//!
//! For a group at depth `d`, a path `p` applies to:
//!
//! - attribute `f` iff `p.len() == d + 1`, `p[d]` is not a terminal group and
//!   names `f`
//! - singular group `f` iff `p[d]` names `f`, is not indexed and either
//!   continues below (`p.len() > d + 1`) or ends there as a terminal group
//! - element `i` of repeated group `f` iff `p[d]` names `f`, is indexed,
//!   selects `i` (explicitly or through `all`) and either continues below or
//!   ends there as a terminal group
//!
//! A terminal group match makes the whole subtree part of the query without
//! looking at any further path.

use std::collections::BTreeMap;
use std::collections::HashMap;

use super::AttributeEntry;
use super::AttributeGroup;
use super::GroupId;
use super::GroupState;
use crate::format_path;
use crate::query::AttributeWriter;
use crate::query::QueryNode;
use crate::Error;
use crate::FieldKind;
use crate::Path;
use crate::QueryId;
use crate::Result;
use crate::SchemaRef;

/// An attribute visited by a query, with the writer that copies its value
/// into the query output.
pub(crate) struct RegisteredAttribute {
    pub(crate) entry: AttributeEntry,
    pub(crate) writer: AttributeWriter,
    /// The path that selected this attribute; the key used by Set
    pub(crate) query_path: Path,
}

/// Everything one group knows about one query.
pub(super) struct RegisteredQuery {
    /// Paths still relevant at this depth
    pub(super) paths: Vec<Path>,
    /// Set when a terminal group path selected this whole subtree
    pub(super) query_all_fields: Option<Path>,
    /// Output node mirroring this group
    pub(super) node: QueryNode,
    pub(super) child_groups: BTreeMap<GroupId, AttributeGroup>,
    pub(super) attributes: BTreeMap<String, RegisteredAttribute>,
}

impl RegisteredQuery {
    fn new(node: QueryNode) -> Self {
        Self {
            paths: Vec::new(),
            query_all_fields: None,
            node,
            child_groups: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Checks every path against the schema rooted at `schema`.
///
/// The first violation is reported as InvalidArgument.
pub(super) fn validate_query(
    schema: &SchemaRef,
    paths: &[Path],
) -> Result<()> {
    for path in paths {
        let invalid = |reason: &str| {
            Err(Error::InvalidArgument(format!(
                "Invalid query path \"{}\": {}",
                format_path(path),
                reason
            )))
        };

        if path.is_empty() {
            return invalid("the path is empty.");
        }

        let mut schema = schema.clone();
        for (i, entry) in path.iter().enumerate() {
            let last = i + 1 == path.len();
            if entry.terminal_group && !last {
                return invalid(&format!("\"{}\" is marked terminal but is not the last entry.", entry.name));
            }
            if entry.indexed && !entry.all && entry.index < 0 {
                return invalid(&format!("\"{}\" has negative index {}.", entry.name, entry.index));
            }

            let next = match schema.field(&entry.name) {
                None => {
                    return invalid(&format!(
                        "schema {} has no field \"{}\".",
                        schema.name(),
                        entry.name
                    ))
                }
                Some(FieldKind::Scalar(_)) => {
                    if !last {
                        return invalid(&format!("\"{}\" is an attribute and cannot have children.", entry.name));
                    }
                    if entry.indexed {
                        return invalid(&format!("attribute \"{}\" cannot be indexed.", entry.name));
                    }
                    if entry.terminal_group {
                        return invalid(&format!("attribute \"{}\" cannot be a terminal group.", entry.name));
                    }
                    None
                }
                Some(FieldKind::Group { schema: child, repeated }) => {
                    if entry.indexed != *repeated {
                        return invalid(&format!(
                            "\"{}\" must {}be indexed.",
                            entry.name,
                            if *repeated { "" } else { "not " }
                        ));
                    }
                    if last && !entry.terminal_group {
                        return invalid(&format!(
                            "path ends at attribute group \"{}\" without marking it terminal.",
                            entry.name
                        ));
                    }
                    Some(child.clone())
                }
            };
            if let Some(next) = next {
                schema = next;
            }
        }
    }
    Ok(())
}

fn check_path_depth(
    path: &Path,
    depth: usize,
) -> Result<()> {
    if path.len() <= depth {
        return Err(Error::Internal(format!(
            "Registered query path \"{}\" is too short for attribute group depth {}.",
            format_path(path),
            depth
        )));
    }
    Ok(())
}

/// Fails if any query recorded in this group holds a path that ends at or
/// above `depth`. Checked before a structural change, so a failure leaves the
/// group untouched.
pub(super) fn check_registered_paths(
    depth: usize,
    queries: &HashMap<QueryId, RegisteredQuery>,
) -> Result<()> {
    for registered in queries.values() {
        for path in &registered.paths {
            check_path_depth(path, depth)?;
        }
    }
    Ok(())
}

pub(super) fn register_query_attribute(
    depth: usize,
    registered: &mut RegisteredQuery,
    name: &str,
    entry: &AttributeEntry,
) -> Result<()> {
    let mut query_path = registered.query_all_fields.clone();
    for path in &registered.paths {
        check_path_depth(path, depth)?;
        let step = &path[depth];
        if path.len() == depth + 1 && !step.terminal_group && step.name == name {
            query_path = Some(path.clone());
        }
    }

    if let Some(query_path) = query_path {
        let writer = registered.node.add_attribute(name, entry.attribute.kind().clone());
        registered.attributes.insert(
            name.to_string(),
            RegisteredAttribute {
                entry: entry.clone(),
                writer,
                query_path,
            },
        );
    }
    Ok(())
}

pub(super) fn register_query_child(
    depth: usize,
    query_id: QueryId,
    registered: &mut RegisteredQuery,
    name: &str,
    child: &AttributeGroup,
) -> Result<()> {
    let mut query_all_fields = registered.query_all_fields.clone();
    let mut child_paths = Vec::new();
    for path in &registered.paths {
        check_path_depth(path, depth)?;
        let step = &path[depth];
        if step.name != name || step.indexed {
            continue;
        }
        if path.len() > depth + 1 {
            child_paths.push(path.clone());
        } else if step.terminal_group {
            query_all_fields = Some(path.clone());
        }
    }
    if query_all_fields.is_none() && child_paths.is_empty() {
        return Ok(());
    }

    let node = registered.node.add_child_group(name);
    let child_state = child.inner.state.read();
    child.register_query_internal(&child_state, query_id, node, child_paths, query_all_fields)?;
    registered.child_groups.insert(child.id(), child.clone());
    Ok(())
}

pub(super) fn register_query_repeated_child(
    depth: usize,
    query_id: QueryId,
    registered: &mut RegisteredQuery,
    name: &str,
    idx: usize,
    child: &AttributeGroup,
) -> Result<()> {
    let mut query_all_fields = registered.query_all_fields.clone();
    let mut child_paths = Vec::new();
    for path in &registered.paths {
        check_path_depth(path, depth)?;
        let step = &path[depth];
        if step.name != name || !step.indexed || !step.selects_index(idx) {
            continue;
        }
        if path.len() > depth + 1 {
            child_paths.push(path.clone());
        } else if step.terminal_group {
            query_all_fields = Some(path.clone());
        }
    }
    if query_all_fields.is_none() && child_paths.is_empty() {
        return Ok(());
    }

    let node = registered.node.add_repeated_child_group(name, idx);
    let child_state = child.inner.state.read();
    child.register_query_internal(&child_state, query_id, node, child_paths, query_all_fields)?;
    registered.child_groups.insert(child.id(), child.clone());
    Ok(())
}

impl AttributeGroup {
    /// Installs or refreshes the record of `query_id` in this group and
    /// recurses into every matching child. `state` is this group's own
    /// contents, already locked by the caller.
    pub(super) fn register_query_internal(
        &self,
        state: &GroupState,
        query_id: QueryId,
        node: QueryNode,
        paths: Vec<Path>,
        query_all_fields: Option<Path>,
    ) -> Result<()> {
        let depth = self.depth();
        let mut queries = self.inner.registered_queries.write();
        let registered = queries
            .entry(query_id)
            .or_insert_with(|| RegisteredQuery::new(node.clone()));
        registered.paths = paths;
        registered.node = node;
        if registered.query_all_fields.is_none() {
            registered.query_all_fields = query_all_fields;
        }

        for (name, entry) in &state.attributes {
            register_query_attribute(depth, registered, name, entry)?;
        }
        for (name, child) in &state.sub_groups {
            register_query_child(depth, query_id, registered, name, child)?;
        }
        for (name, children) in &state.repeated_sub_groups {
            for (idx, child) in children.iter().enumerate() {
                register_query_repeated_child(depth, query_id, registered, name, idx, child)?;
            }
        }
        Ok(())
    }

    /// Drops the record of `query_id` from this subtree and clears the
    /// matching output.
    pub(super) fn unregister_query_internal(
        &self,
        query_id: QueryId,
    ) {
        let mut queries = self.inner.registered_queries.write();
        let Some(registered) = queries.remove(&query_id) else {
            return;
        };
        for child in registered.child_groups.values() {
            let _child_state = child.inner.state.read();
            child.unregister_query_internal(query_id);
        }
        registered.node.remove_all_fields();
    }
}
