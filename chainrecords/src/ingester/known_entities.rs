use std::collections::BTreeMap;

use ethers::types::Address;
use tracing::{debug, warn};

use crate::domains::{CreationEvent, Domain};
use crate::events::EventRecord;
use crate::repos::Repo;

/// Child contracts discovered through creation events, each with the record
/// that announced it. Only grows.
#[derive(Debug, Clone, Default)]
pub struct KnownEntities {
    origins: BTreeMap<Address, EventRecord>,
}

impl KnownEntities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the set by replaying persisted creation records
    pub async fn rehydrate(domain: &Domain, repo: &impl Repo) -> Self {
        let mut known_entities = Self::new();

        for (stream, creation) in domain.get_creation_streams() {
            for record in repo.load(stream).await {
                if let Some(child) = get_child_address(&record, creation) {
                    known_entities.register(child, record);
                }
            }
        }

        debug!(domain = %domain.name, known = known_entities.len(), "rehydrated known entities");

        known_entities
    }

    /// Returns false when the address was already known. The first origin wins.
    pub fn register(&mut self, address: Address, origin: EventRecord) -> bool {
        if self.origins.contains_key(&address) {
            return false;
        }

        self.origins.insert(address, origin);

        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.origins.contains_key(address)
    }

    pub fn get_origin(&self, address: &Address) -> Option<&EventRecord> {
        self.origins.get(address)
    }

    pub fn get_addresses(&self) -> Vec<Address> {
        self.origins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// Child address announced by a creation record, if the record is one
pub fn get_child_address(record: &EventRecord, creation: &CreationEvent) -> Option<Address> {
    if record.event_name != creation.event_name {
        return None;
    }

    let raw = record.get_raw_string(&creation.child_param)?;
    match raw.parse::<Address>() {
        Ok(address) => Some(address),
        Err(error) => {
            warn!(
                event = %record.event_name,
                transaction_hash = %record.transaction_hash,
                %raw,
                %error,
                "creation record holds an invalid child address"
            );

            None
        }
    }
}
