//! Mirrored query output.
//!
//! Groups do not hold references into a query's output. They hold a
//! [`QueryNode`]: the shared output handle plus the address of the node that
//! mirrors them. Nodes are created on demand, so an address stays valid no
//! matter in which order fields are added or removed.

use std::sync::Arc;

use parking_lot::Mutex;

use super::ResultGroup;
use crate::AttributeValue;
use crate::Error;
use crate::Result;
use crate::ValueKind;

pub(crate) struct QueryOutput {
    pub(crate) result: ResultGroup,
    pub(crate) updated: bool,
    /// Bumped on every structural change of `result`
    pub(crate) generation: u64,
}

impl QueryOutput {
    pub(crate) fn new() -> Self {
        Self {
            result: ResultGroup::default(),
            updated: false,
            generation: 0,
        }
    }

    pub(crate) fn mark_updated(&mut self) {
        self.updated = true;
        self.generation += 1;
    }
}

pub(crate) type SharedOutput = Arc<Mutex<QueryOutput>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeStep {
    Group(String),
    Repeated(String, usize),
}

#[derive(Clone)]
pub(crate) struct QueryNode {
    output: SharedOutput,
    address: Vec<NodeStep>,
}

impl QueryNode {
    pub(crate) fn root(output: SharedOutput) -> Self {
        Self {
            output,
            address: Vec::new(),
        }
    }

    pub(crate) fn add_attribute(
        &self,
        name: &str,
        kind: ValueKind,
    ) -> AttributeWriter {
        self.output.lock().mark_updated();
        AttributeWriter {
            output: self.output.clone(),
            address: self.address.clone(),
            name: name.to_string(),
            kind,
        }
    }

    pub(crate) fn add_child_group(
        &self,
        name: &str,
    ) -> QueryNode {
        self.add_node(NodeStep::Group(name.to_string()))
    }

    /// Output for element `idx` of a repeated group. Missing lower elements
    /// are created empty.
    pub(crate) fn add_repeated_child_group(
        &self,
        name: &str,
        idx: usize,
    ) -> QueryNode {
        self.add_node(NodeStep::Repeated(name.to_string(), idx))
    }

    pub(crate) fn remove_field(
        &self,
        name: &str,
    ) {
        let mut output = self.output.lock();
        if let Some(node) = find_node(&mut output.result, &self.address) {
            node.clear_field(name);
        }
        output.mark_updated();
    }

    pub(crate) fn remove_all_fields(&self) {
        let mut output = self.output.lock();
        if let Some(node) = find_node(&mut output.result, &self.address) {
            *node = ResultGroup::default();
        }
    }

    fn add_node(
        &self,
        step: NodeStep,
    ) -> QueryNode {
        let mut address = self.address.clone();
        address.push(step);

        let mut output = self.output.lock();
        node_at(&mut output.result, &address);
        output.mark_updated();

        QueryNode {
            output: self.output.clone(),
            address,
        }
    }
}

/// Copies one attribute value into the query output.
#[derive(Clone)]
pub(crate) struct AttributeWriter {
    output: SharedOutput,
    address: Vec<NodeStep>,
    name: String,
    kind: ValueKind,
}

impl AttributeWriter {
    pub(crate) fn write(
        &self,
        value: AttributeValue,
    ) -> Result<()> {
        if !value.is_kind(&self.kind) {
            return Err(Error::Internal(format!(
                "Attribute \"{}\" produced a {} value for a {} field.",
                self.name,
                value.kind(),
                self.kind
            )));
        }
        let mut output = self.output.lock();
        node_at(&mut output.result, &self.address).attributes.insert(self.name.clone(), value);
        Ok(())
    }

    /// Drops the mirrored value, leaving the field absent from the output.
    pub(crate) fn clear(&self) {
        let mut output = self.output.lock();
        if let Some(node) = find_node(&mut output.result, &self.address) {
            node.attributes.remove(&self.name);
        }
    }
}

/// Returns the node at `address`, creating it and its parents as needed.
fn node_at<'a>(
    root: &'a mut ResultGroup,
    address: &[NodeStep],
) -> &'a mut ResultGroup {
    let mut node = root;
    for step in address {
        node = match step {
            NodeStep::Group(name) => node.groups.entry(name.clone()).or_default(),
            NodeStep::Repeated(name, idx) => {
                let elements = node.repeated_groups.entry(name.clone()).or_default();
                if elements.len() <= *idx {
                    elements.resize_with(idx + 1, ResultGroup::default);
                }
                &mut elements[*idx]
            }
        };
    }
    node
}

fn find_node<'a>(
    root: &'a mut ResultGroup,
    address: &[NodeStep],
) -> Option<&'a mut ResultGroup> {
    let mut node = root;
    for step in address {
        node = match step {
            NodeStep::Group(name) => node.groups.get_mut(name)?,
            NodeStep::Repeated(name, idx) => node.repeated_groups.get_mut(name)?.get_mut(*idx)?,
        };
    }
    Some(node)
}
