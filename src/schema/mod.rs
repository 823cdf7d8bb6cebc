//! Schema description for attribute groups.
//!
//! A group's schema names every field it may contain and whether that field
//! is a scalar attribute, a singular child group or a repeated child group.

mod descriptor;
mod value;

pub use descriptor::*;
pub use value::*;
