use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;

use crate::AttributeValue;
use crate::Error;
use crate::PathEntry;
use crate::Result;

/// The output of a query: a partial mirror of the attribute tree holding
/// only the fields the query selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGroup {
    pub(crate) attributes: BTreeMap<String, AttributeValue>,
    pub(crate) groups: BTreeMap<String, ResultGroup>,
    pub(crate) repeated_groups: BTreeMap<String, Vec<ResultGroup>>,
}

impl ResultGroup {
    pub fn attribute(
        &self,
        name: &str,
    ) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn group(
        &self,
        name: &str,
    ) -> Option<&ResultGroup> {
        self.groups.get(name)
    }

    pub fn repeated_group(
        &self,
        name: &str,
        idx: usize,
    ) -> Option<&ResultGroup> {
        self.repeated_groups.get(name).and_then(|g| g.get(idx))
    }

    pub fn repeated_group_size(
        &self,
        name: &str,
    ) -> usize {
        self.repeated_groups.get(name).map_or(0, Vec::len)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.groups.is_empty() && self.repeated_groups.is_empty()
    }

    /// Follows `path` down to an attribute value.
    ///
    /// Wildcard entries cannot be followed and yield `None`.
    pub fn lookup(
        &self,
        path: &[PathEntry],
    ) -> Option<&AttributeValue> {
        let (last, parents) = path.split_last()?;
        let mut node = self;
        for entry in parents {
            node = match (entry.indexed, entry.all) {
                (false, _) => node.group(&entry.name)?,
                (true, false) => node.repeated_group(&entry.name, usize::try_from(entry.index).ok()?)?,
                (true, true) => return None,
            };
        }
        node.attribute(&last.name)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Internal(format!("Failed to encode query result: {e}")))
    }

    pub(crate) fn clear_field(
        &mut self,
        name: &str,
    ) {
        self.attributes.remove(name);
        self.groups.remove(name);
        self.repeated_groups.remove(name);
    }
}

impl Serialize for ResultGroup {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let len = self.attributes.len() + self.groups.len() + self.repeated_groups.len();
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        for (name, group) in &self.groups {
            map.serialize_entry(name, group)?;
        }
        for (name, groups) in &self.repeated_groups {
            map.serialize_entry(name, groups)?;
        }
        map.end()
    }
}
