//! Thin request translation layer over an [`AttributeDatabase`].
//!
//! Accepts textual paths (see [`parse_path`]) as well as parsed ones, and
//! turns partial Get results into plain errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::parse_path;
use crate::AttributeDatabase;
use crate::AttributeValue;
use crate::AttributeValueMap;
use crate::Path;
use crate::Result;
use crate::ResultGroup;
use crate::SubscriptionHandle;

#[derive(Clone)]
pub struct Adapter {
    database: Arc<AttributeDatabase>,
}

impl Adapter {
    pub fn new(database: Arc<AttributeDatabase>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Arc<AttributeDatabase> {
        &self.database
    }

    /// Reads `paths` once. Any data source failure fails the whole call.
    pub async fn get(
        &self,
        paths: Vec<Path>,
    ) -> Result<ResultGroup> {
        let query = self.database.make_query(paths)?;
        let (result, status) = query.get().await;
        status.map(|()| result)
    }

    pub async fn get_str(
        &self,
        queries: &[&str],
    ) -> Result<ResultGroup> {
        self.get(parse_paths(queries)?).await
    }

    pub fn set(
        &self,
        values: &AttributeValueMap,
    ) -> Result<()> {
        self.database.set(values)
    }

    pub fn set_str(
        &self,
        values: &[(&str, AttributeValue)],
    ) -> Result<()> {
        let mut parsed = AttributeValueMap::with_capacity(values.len());
        for (query, value) in values {
            if parsed.insert(parse_path(query)?, value.clone()).is_some() {
                warn!("duplicate set path \"{}\"; last value wins", query);
            }
        }
        self.database.set(&parsed)
    }

    /// Polls `paths` every `polling_interval`, or the configured default.
    ///
    /// The subscription stops when the handle is dropped or the receiver goes
    /// away.
    pub fn subscribe(
        &self,
        paths: Vec<Path>,
        polling_interval: Option<Duration>,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<ResultGroup>)> {
        self.database.make_query(paths)?.subscribe_channel(polling_interval)
    }
}

fn parse_paths(queries: &[&str]) -> Result<Vec<Path>> {
    queries.iter().map(|q| parse_path(q)).collect()
}
