use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;

use crate::AttributeGroup;
use crate::AttributeValue;
use crate::CachePolicy;
use crate::DataSource;
use crate::DataSourceCore;
use crate::Error;
use crate::ManagedAttribute;
use crate::NoCache;
use crate::Result;

/// A data source backed by an in-memory "device".
///
/// Refreshes copy the device registers into the attributes. Setters stage
/// values that only reach the device on flush. Both paths can be made to
/// fail on demand and are counted.
pub(crate) struct FakeHardwareSource {
    core: DataSourceCore,
    attributes: BTreeMap<String, Arc<ManagedAttribute>>,
    device: Arc<Mutex<BTreeMap<String, AttributeValue>>>,
    staged: Arc<Mutex<BTreeMap<String, AttributeValue>>>,
    refreshes: AtomicUsize,
    flushes: AtomicUsize,
    fail_refresh: AtomicBool,
    fail_flush: AtomicBool,
    refresh_delay: Mutex<Duration>,
}

impl FakeHardwareSource {
    /// Writable attributes, refreshed on every read.
    pub(crate) fn new(values: Vec<(&str, AttributeValue)>) -> Arc<Self> {
        Self::with_policy(values, Box::new(NoCache), true)
    }

    pub(crate) fn read_only(values: Vec<(&str, AttributeValue)>) -> Arc<Self> {
        Self::with_policy(values, Box::new(NoCache), false)
    }

    pub(crate) fn with_policy(
        values: Vec<(&str, AttributeValue)>,
        cache_policy: Box<dyn CachePolicy>,
        writable: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<FakeHardwareSource>| {
            let datasource: Weak<dyn DataSource> = weak.clone();
            let device = Arc::new(Mutex::new(BTreeMap::new()));
            let staged: Arc<Mutex<BTreeMap<String, AttributeValue>>> = Arc::new(Mutex::new(BTreeMap::new()));

            let mut attributes = BTreeMap::new();
            for (name, value) in values {
                device.lock().insert(name.to_string(), value.clone());
                let mut attribute = ManagedAttribute::new(value, datasource.clone());
                if writable {
                    let staged = staged.clone();
                    let register = name.to_string();
                    attribute = attribute.with_setter(move |value| {
                        staged.lock().insert(register.clone(), value);
                        Ok(())
                    });
                }
                attributes.insert(name.to_string(), Arc::new(attribute));
            }

            Self {
                core: DataSourceCore::new(cache_policy),
                attributes,
                device,
                staged,
                refreshes: AtomicUsize::new(0),
                flushes: AtomicUsize::new(0),
                fail_refresh: AtomicBool::new(false),
                fail_flush: AtomicBool::new(false),
                refresh_delay: Mutex::new(Duration::ZERO),
            }
        })
    }

    pub(crate) fn attribute(
        &self,
        name: &str,
    ) -> Arc<ManagedAttribute> {
        self.attributes.get(name).cloned().expect("attribute exists")
    }

    /// Changes a device register behind the database's back.
    pub(crate) fn set_device_value(
        &self,
        name: &str,
        value: impl Into<AttributeValue>,
    ) {
        self.device.lock().insert(name.to_string(), value.into());
    }

    pub(crate) fn device_value(
        &self,
        name: &str,
    ) -> AttributeValue {
        self.device.lock().get(name).cloned().expect("register exists")
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_refresh(
        &self,
        fail: bool,
    ) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Makes every refresh block its thread for `delay` first.
    pub(crate) fn slow_refresh(
        &self,
        delay: Duration,
    ) {
        *self.refresh_delay.lock() = delay;
    }

    pub(crate) fn fail_flush(
        &self,
        fail: bool,
    ) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }
}

impl DataSource for FakeHardwareSource {
    fn core(&self) -> &DataSourceCore {
        &self.core
    }

    fn update_values(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(*self.refresh_delay.lock());
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated refresh failure".into()));
        }
        let device = self.device.lock();
        for (name, attribute) in &self.attributes {
            if let Some(value) = device.get(name) {
                attribute.assign_value(value.clone())?;
            }
        }
        Ok(())
    }

    fn flush_writes(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated flush failure".into()));
        }
        let staged = std::mem::take(&mut *self.staged.lock());
        self.device.lock().extend(staged);
        Ok(())
    }
}

/// Appends a card with its own data source to `root`.
pub(crate) fn add_card(
    root: &AttributeGroup,
    frequency: u64,
    name: &str,
) -> (AttributeGroup, Arc<FakeHardwareSource>) {
    let source = FakeHardwareSource::new(vec![("frequency", frequency.into()), ("name", name.into())]);
    let card = root.acquire_mutable().add_repeated_child_group("cards").unwrap();
    {
        let mut card_w = card.acquire_mutable();
        card_w.add_attribute("frequency", source.attribute("frequency")).unwrap();
        card_w.add_attribute("name", source.attribute("name")).unwrap();
    }
    (card, source)
}
