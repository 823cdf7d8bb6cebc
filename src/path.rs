//! Query paths.
//!
//! A path is an ordered list of [`PathEntry`] segments starting at the root
//! group. The textual form accepted by [`parse_path`] is
//! `cards[@]/ports[0]/transceiver/`:
//!
//! - `name` selects a scalar attribute or a singular group
//! - `name[N]` selects element `N` of a repeated group
//! - `name[@]` (or `name[*]`) selects every element of a repeated group
//! - a trailing `/` marks the last segment as a terminal group, selecting all of
//!   its descendants

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::AttributeValue;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathEntry {
    pub name: String,
    /// Element of a repeated group. Ignored unless `indexed` is set.
    pub index: i32,
    pub indexed: bool,
    /// Wildcard over every element of a repeated group
    pub all: bool,
    /// Selects every descendant of the group this entry names
    pub terminal_group: bool,
}

pub type Path = Vec<PathEntry>;

/// Values keyed by the exact path they are written to.
pub type AttributeValueMap = HashMap<Path, AttributeValue>;

impl PathEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn indexed(
        name: impl Into<String>,
        index: i32,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            indexed: true,
            ..Default::default()
        }
    }

    pub fn wildcard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: true,
            all: true,
            ..Default::default()
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal_group = true;
        self
    }

    pub(crate) fn selects_index(
        &self,
        idx: usize,
    ) -> bool {
        self.all || (self.index >= 0 && self.index as usize == idx)
    }
}

impl fmt::Display for PathEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.all {
            write!(f, "[@]")?;
        } else if self.indexed {
            write!(f, "[{}]", self.index)?;
        }
        Ok(())
    }
}

/// Renders `path` in the textual form understood by [`parse_path`].
pub fn format_path(path: &[PathEntry]) -> String {
    let mut out = path.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("/");
    if path.last().is_some_and(|e| e.terminal_group) {
        out.push('/');
    }
    out
}

pub fn parse_path(query: &str) -> Result<Path> {
    let (body, terminal) = match query.strip_suffix('/') {
        Some(body) => (body, true),
        None => (query, false),
    };
    if body.is_empty() {
        return Err(Error::InvalidArgument(format!("Empty query path \"{query}\".")));
    }

    let mut path = body
        .split('/')
        .map(|segment| parse_entry(segment, query))
        .collect::<Result<Path>>()?;

    if terminal {
        if let Some(last) = path.last_mut() {
            last.terminal_group = true;
        }
    }
    Ok(path)
}

fn parse_entry(
    segment: &str,
    query: &str,
) -> Result<PathEntry> {
    let malformed = || Error::InvalidArgument(format!("Malformed segment \"{segment}\" in query \"{query}\"."));

    let (name, index) = match segment.find('[') {
        Some(open) => {
            let rest = segment[open + 1..].strip_suffix(']').ok_or_else(malformed)?;
            (&segment[..open], Some(rest))
        }
        None => (segment, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(malformed());
    }

    match index {
        None => Ok(PathEntry::new(name)),
        Some("@") | Some("*") => Ok(PathEntry::wildcard(name)),
        Some(n) => {
            let index = n.parse::<i32>().map_err(|_| malformed())?;
            Ok(PathEntry::indexed(name, index))
        }
    }
}
