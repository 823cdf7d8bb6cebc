//! # attribute-db
//!
//! A schema-driven attribute database exposing switch hardware state as a
//! tree of queryable, settable and subscribable fields.
//!
//! - [`AttributeGroup`]: tree nodes conforming to a [`SchemaDescriptor`]
//! - [`ManagedAttribute`]: typed leaf values owned by a [`DataSource`]
//! - [`CachePolicy`]: decides when a data source must refresh
//! - [`AttributeGroupQuery`]: registered paths with a mirrored [`ResultGroup`]
//! - [`AttributeDatabase`]: root ownership, serialized Set and polling
//!   subscriptions
//! - [`Adapter`]: textual paths and value maps over the database
//!
//! ```ignore
//! let db = AttributeDatabase::new(root, AttributeDbConfig::new()?.validate()?)?;
//! let query = db.make_query(vec![parse_path("cards[@]/frequency")?])?;
//! let (result, status) = query.get().await;
//! ```

mod adapter;
mod attribute;
mod config;
mod constants;
mod database;
mod datasource;
mod errors;
mod group;
mod metrics;
mod path;
mod query;
mod schema;
pub mod utils;

pub use adapter::*;
pub use attribute::*;
pub use config::*;
pub use database::*;
pub use datasource::*;
pub use errors::*;
pub use group::*;
pub use metrics::*;
pub use path::*;
pub use query::*;
pub use schema::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
