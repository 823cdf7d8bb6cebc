//! A small simulated switch built only from the public API.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use attribute_db::AttributeDatabase;
use attribute_db::AttributeDbConfig;
use attribute_db::AttributeGroup;
use attribute_db::AttributeValue;
use attribute_db::CachePolicy;
use attribute_db::DataSource;
use attribute_db::DataSourceCore;
use attribute_db::EnumType;
use attribute_db::Error;
use attribute_db::FixedDataSource;
use attribute_db::ManagedAttribute;
use attribute_db::MessageSchema;
use attribute_db::NoCache;
use attribute_db::Result;
use attribute_db::SchemaRef;
use attribute_db::ValueKind;
use parking_lot::Mutex;

pub const CHASSIS_NAME: &str = "tor-17";

pub fn card_state() -> Arc<EnumType> {
    EnumType::new("CardState", ["CARD_STATE_UNKNOWN", "CARD_STATE_UP", "CARD_STATE_DOWN"])
}

pub fn switch_schema() -> SchemaRef {
    let card = MessageSchema::builder("Card")
        .scalar("frequency", ValueKind::Uint64)
        .scalar("name", ValueKind::String)
        .enumeration("state", card_state())
        .build();
    let psu = MessageSchema::builder("Psu").scalar("watts", ValueKind::Double).build();
    MessageSchema::builder("Switch")
        .scalar("chassis_name", ValueKind::String)
        .repeated_group("cards", card)
        .group("psu", psu)
        .build()
}

#[derive(Debug, Clone)]
struct CardRegisters {
    frequency: u64,
    name: String,
    state: usize,
}

/// One line card. `frequency` is writable; writes reach the registers on
/// flush.
pub struct SimulatedCard {
    core: DataSourceCore,
    frequency: Arc<ManagedAttribute>,
    name: Arc<ManagedAttribute>,
    state: Arc<ManagedAttribute>,
    registers: Mutex<CardRegisters>,
    staged_frequency: Arc<Mutex<Option<u64>>>,
    refreshes: AtomicUsize,
}

impl SimulatedCard {
    pub fn new(
        frequency: u64,
        name: &str,
        cache_policy: Box<dyn CachePolicy>,
    ) -> Arc<Self> {
        let up = card_state().value(1).expect("CARD_STATE_UP exists");
        Arc::new_cyclic(|weak: &Weak<SimulatedCard>| {
            let datasource: Weak<dyn DataSource> = weak.clone();
            let staged_frequency = Arc::new(Mutex::new(None));
            let frequency_attribute = ManagedAttribute::new(frequency, datasource.clone()).with_setter({
                let staged = staged_frequency.clone();
                move |value: AttributeValue| {
                    *staged.lock() = Some(u64::try_from(value)?);
                    Ok(())
                }
            });
            Self {
                core: DataSourceCore::new(cache_policy),
                frequency: Arc::new(frequency_attribute),
                name: Arc::new(ManagedAttribute::new(name, datasource.clone())),
                state: Arc::new(ManagedAttribute::new(up, datasource)),
                registers: Mutex::new(CardRegisters {
                    frequency,
                    name: name.to_string(),
                    state: 1,
                }),
                staged_frequency,
                refreshes: AtomicUsize::new(0),
            }
        })
    }

    /// Appends this card to the `cards` of `root`.
    pub fn install(
        &self,
        root: &AttributeGroup,
    ) -> Result<AttributeGroup> {
        let card = root.acquire_mutable().add_repeated_child_group("cards")?;
        {
            let mut card_w = card.acquire_mutable();
            card_w.add_attribute("frequency", self.frequency.clone())?;
            card_w.add_attribute("name", self.name.clone())?;
            card_w.add_attribute("state", self.state.clone())?;
        }
        Ok(card)
    }

    pub fn register_frequency(&self) -> u64 {
        self.registers.lock().frequency
    }

    pub fn set_register_frequency(
        &self,
        frequency: u64,
    ) {
        self.registers.lock().frequency = frequency;
    }

    pub fn go_down(&self) {
        self.registers.lock().state = 2;
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl DataSource for SimulatedCard {
    fn core(&self) -> &DataSourceCore {
        &self.core
    }

    fn update_values(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let registers = self.registers.lock().clone();
        self.frequency.assign_value(registers.frequency)?;
        self.name.assign_value(registers.name)?;
        self.state.assign_value(card_state().value(registers.state)?)?;
        Ok(())
    }

    fn flush_writes(&self) -> Result<()> {
        if let Some(frequency) = self.staged_frequency.lock().take() {
            if frequency == 0 {
                return Err(Error::InvalidArgument("a card cannot run at 0 Hz".into()));
            }
            self.registers.lock().frequency = frequency;
        }
        Ok(())
    }
}

pub struct Switch {
    pub database: Arc<AttributeDatabase>,
    pub cards: Vec<Arc<SimulatedCard>>,
}

/// A switch with one card per entry of `frequencies`, each card refreshed on
/// every read.
pub fn build_switch(
    frequencies: &[u64],
    config: AttributeDbConfig,
) -> Switch {
    let cards = frequencies
        .iter()
        .enumerate()
        .map(|(i, frequency)| SimulatedCard::new(*frequency, &format!("card-{i}"), Box::new(NoCache)))
        .collect();
    build_switch_with_cards(cards, config)
}

pub fn build_switch_with_cards(
    cards: Vec<Arc<SimulatedCard>>,
    config: AttributeDbConfig,
) -> Switch {
    let root = AttributeGroup::from_schema(switch_schema());
    let chassis = FixedDataSource::make(CHASSIS_NAME);
    root.acquire_mutable()
        .add_attribute("chassis_name", chassis.attribute())
        .unwrap();
    for card in &cards {
        card.install(&root).unwrap();
    }

    Switch {
        database: Arc::new(AttributeDatabase::new(root, config).unwrap()),
        cards,
    }
}
