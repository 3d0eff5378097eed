pub mod collectibles;
pub mod staking;

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::contracts::{Interface, InterfaceError};
use crate::projections::ProjectionBuilder;

/// Factory event announcing a new child contract
#[derive(Debug, Clone, PartialEq)]
pub struct CreationEvent {
    pub event_name: String,
    /// Event parameter holding the child's address
    pub child_param: String,
}

/// A top-level contract whose events land in one stream
#[derive(Debug, Clone)]
pub struct FactorySource {
    /// Name of the binding, as configured
    pub contract_name: String,
    pub stream: String,
    /// Descriptor used when the configuration does not supply one
    pub interface: Arc<Interface>,
    pub creation: Option<CreationEvent>,
    /// Non-creation events to index. Empty means every other event of the
    /// bound interface.
    pub event_names: Vec<String>,
}

impl FactorySource {
    pub fn new(contract_name: &str, stream: &str, interface: Interface) -> Self {
        Self {
            contract_name: contract_name.to_string(),
            stream: stream.to_string(),
            interface: Arc::new(interface),
            creation: None,
            event_names: vec![],
        }
    }

    pub fn with_creation_event(mut self, event_name: &str, child_param: &str) -> Self {
        self.creation = Some(CreationEvent {
            event_name: event_name.to_string(),
            child_param: child_param.to_string(),
        });

        self
    }

    pub fn with_event_names(mut self, event_names: &[&str]) -> Self {
        self.event_names = event_names.iter().map(|name| name.to_string()).collect();

        self
    }

    pub fn get_creation_event_name(&self) -> Option<&str> {
        self.creation.as_ref().map(|creation| creation.event_name.as_str())
    }

    /// Resolves the non-creation events against the interface actually bound
    pub fn get_other_event_names(&self, bound: &Interface) -> Vec<String> {
        let creation = self.get_creation_event_name();

        if self.event_names.is_empty() {
            bound
                .get_events()
                .into_iter()
                .map(|event| event.name.clone())
                .filter(|name| Some(name.as_str()) != creation)
                .collect()
        } else {
            self.event_names.iter().filter(|name| Some(name.as_str()) != creation).cloned().collect()
        }
    }
}

/// A child event param denominated in a token named by the creation event
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAmount {
    pub param: String,
    /// Creation event param holding the token's address
    pub token_param: String,
}

/// Contracts discovered at runtime through a factory's creation events.
/// Every child shares one interface descriptor.
#[derive(Debug, Clone)]
pub struct ChildSource {
    pub contract_name: String,
    pub stream: String,
    pub interface: Arc<Interface>,
    pub token_amounts: Vec<TokenAmount>,
    /// Used to read `decimals()` of the tokens behind `token_amounts`
    pub erc20: Option<Arc<Interface>>,
}

impl ChildSource {
    pub fn new(contract_name: &str, stream: &str, interface: Interface) -> Self {
        Self {
            contract_name: contract_name.to_string(),
            stream: stream.to_string(),
            interface: Arc::new(interface),
            token_amounts: vec![],
            erc20: None,
        }
    }

    /// Displays each `(param, token_param)` amount in the decimals of the
    /// token the child's creation event names under `token_param`
    pub fn with_token_amounts(mut self, erc20: Interface, amounts: &[(&str, &str)]) -> Self {
        self.erc20 = Some(Arc::new(erc20));
        self.token_amounts = amounts
            .iter()
            .map(|(param, token_param)| TokenAmount {
                param: param.to_string(),
                token_param: token_param.to_string(),
            })
            .collect();

        self
    }
}

/// One independently indexed family of contracts, e.g. staking or collectibles
#[derive(Clone)]
pub struct Domain {
    pub name: String,
    pub factories: Vec<FactorySource>,
    pub child: Option<ChildSource>,
    pub projection: Option<Arc<dyn ProjectionBuilder>>,
}

impl Domain {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            factories: vec![],
            child: None,
            projection: None,
        }
    }

    pub fn add_factory(mut self, factory: FactorySource) -> Self {
        self.factories.push(factory);

        self
    }

    pub fn with_child(mut self, child: ChildSource) -> Self {
        self.child = Some(child);

        self
    }

    pub fn with_projection(mut self, projection: impl ProjectionBuilder + 'static) -> Self {
        self.projection = Some(Arc::new(projection));

        self
    }

    /// Every stream this domain writes to. The engine checkpoints all of them.
    pub fn get_streams(&self) -> Vec<String> {
        let factory_streams = self.factories.iter().map(|factory| &factory.stream);
        let child_stream = self.child.iter().map(|child| &child.stream);

        let mut streams: Vec<String> = vec![];
        for stream in factory_streams.chain(child_stream) {
            if !streams.contains(stream) {
                streams.push(stream.clone());
            }
        }

        streams
    }

    /// Streams fully indexed when only `bound_contracts` are bound. A stream
    /// shared with an unbound factory is left out, and so is the child stream
    /// while any creation factory is unbound, since children it would announce
    /// go undiscovered.
    pub fn get_covered_streams(&self, bound_contracts: &[&str]) -> BTreeSet<String> {
        let is_bound = |factory: &FactorySource| bound_contracts.contains(&factory.contract_name.as_str());

        let mut covered = BTreeSet::new();
        let mut uncovered = BTreeSet::new();
        for factory in self.factories.iter() {
            if is_bound(factory) {
                covered.insert(factory.stream.clone());
            } else {
                uncovered.insert(factory.stream.clone());
            }
        }

        if let Some(child) = self.child.as_ref() {
            let discovers_every_child = self
                .factories
                .iter()
                .filter(|factory| factory.creation.is_some())
                .all(is_bound);

            if discovers_every_child {
                covered.insert(child.stream.clone());
            } else {
                uncovered.insert(child.stream.clone());
            }
        }

        covered.retain(|stream| !uncovered.contains(stream));
        covered
    }

    /// Streams holding creation records, replayed to rediscover children
    pub fn get_creation_streams(&self) -> Vec<(&str, &CreationEvent)> {
        self.factories
            .iter()
            .filter_map(|factory| {
                factory.creation.as_ref().map(|creation| (factory.stream.as_str(), creation))
            })
            .collect()
    }

    pub fn get_builtin_interfaces(&self) -> HashMap<String, Arc<Interface>> {
        self.factories
            .iter()
            .map(|factory| (factory.contract_name.clone(), factory.interface.clone()))
            .collect()
    }

    pub fn is_projection_trigger(&self, child_event_name: &str) -> bool {
        self.projection.as_ref().is_some_and(|projection| {
            projection.get_child_triggers().contains(&child_event_name)
        })
    }
}

impl Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("factories", &self.factories)
            .field("child", &self.child)
            .field("projection", &self.projection.is_some())
            .finish()
    }
}

/// The domains shipped with the binary
pub fn all() -> Result<Vec<Domain>, InterfaceError> {
    Ok(vec![staking::domain()?, collectibles::domain()?])
}

/// Interfaces of every shipped top-level contract, keyed by contract name
pub fn get_builtin_interfaces(domains: &[Domain]) -> HashMap<String, Arc<Interface>> {
    domains.iter().flat_map(|domain| domain.get_builtin_interfaces()).collect()
}
