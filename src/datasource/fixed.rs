use std::sync::Arc;
use std::sync::Weak;

use super::DataSource;
use super::DataSourceCore;
use super::NeverUpdate;
use crate::AttributeValue;
use crate::EnumType;
use crate::Error;
use crate::ManagedAttribute;
use crate::Result;

/// A data source holding one value that never changes.
pub struct FixedDataSource {
    core: DataSourceCore,
    attribute: Arc<ManagedAttribute>,
}

impl FixedDataSource {
    pub fn make(value: impl Into<AttributeValue>) -> Arc<Self> {
        let value = value.into();
        Arc::new_cyclic(|weak: &Weak<FixedDataSource>| {
            let datasource: Weak<dyn DataSource> = weak.clone();
            Self {
                core: DataSourceCore::new(Box::new(NeverUpdate)),
                attribute: Arc::new(ManagedAttribute::new(value, datasource)),
            }
        })
    }

    pub fn attribute(&self) -> Arc<ManagedAttribute> {
        self.attribute.clone()
    }
}

impl DataSource for FixedDataSource {
    fn core(&self) -> &DataSourceCore {
        &self.core
    }

    fn update_values(&self) -> Result<()> {
        Err(Error::Internal(
            "update_values() should never be called on a FixedDataSource.".into(),
        ))
    }
}

/// Builds a [`FixedDataSource`] for one value of an enum.
pub struct FixedEnumDataSource;

impl FixedEnumDataSource {
    pub fn make(
        enum_type: &Arc<EnumType>,
        index: usize,
    ) -> Result<Arc<FixedDataSource>> {
        Ok(FixedDataSource::make(enum_type.value(index)?))
    }
}
