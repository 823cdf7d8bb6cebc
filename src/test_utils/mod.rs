//! Shared fixtures for unit tests: a switch-like schema, data sources that
//! simulate hardware and a clock that only moves when told to.
mod clock;
mod datasource;

pub(crate) use clock::*;
pub(crate) use datasource::*;
pub(crate) use schema::*;

use crate::parse_path;
use crate::Path;

pub(crate) fn path(query: &str) -> Path {
    parse_path(query).expect("test path should parse")
}

pub(crate) fn paths(queries: &[&str]) -> Vec<Path> {
    queries.iter().map(|q| path(q)).collect()
}
