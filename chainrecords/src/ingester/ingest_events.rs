use std::collections::{BTreeMap, BTreeSet, HashMap};

use ethers::types::{Address, Log};
use tracing::{debug, info, warn};

use super::chunks::BlockRange;
use super::error::IngesterError;
use super::filters::{self, Filter};
use super::known_entities::{self, KnownEntities};
use super::token_decimals::TokenDecimals;
use crate::connection::{ConnectionManager, ContractCaller, Provider};
use crate::contracts::{ContractBinding, Interface};
use crate::domains::{Domain, FactorySource};
use crate::events::{self, EventRecord};
use crate::projections;
use crate::repos::Repo;
use crate::ChainRecordsRepo;

/// What one chunk contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkReport {
    pub records_added: usize,
    pub discovered: usize,
    pub projections_built: usize,
    /// Streams whose sources were all bound and queried over the chunk
    pub covered_streams: BTreeSet<String>,
}

/// Factories of `domain` that currently have a binding
pub async fn get_bound_factories<'a, P: Provider>(
    domain: &'a Domain,
    connection: &ConnectionManager<P>,
) -> Vec<(&'a FactorySource, ContractBinding)> {
    let mut bound_factories = vec![];

    for factory in domain.factories.iter() {
        match connection.get_contract(&factory.contract_name).await {
            Some(binding) => bound_factories.push((factory, binding)),
            None => debug!(
                domain = %domain.name,
                contract = %factory.contract_name,
                "factory is not bound, its streams are not checkpointed"
            ),
        }
    }

    bound_factories
}

pub fn get_covered_streams(
    domain: &Domain,
    bound_factories: &[(&FactorySource, ContractBinding)],
) -> BTreeSet<String> {
    let bound_contracts: Vec<_> =
        bound_factories.iter().map(|(factory, _)| factory.contract_name.as_str()).collect();

    domain.get_covered_streams(&bound_contracts)
}

/// Indexes one chunk in sequential passes: creation events first, then the
/// remaining factory events, then every known child including the ones just
/// discovered.
pub async fn run<P: Provider>(
    domain: &Domain,
    connection: &ConnectionManager<P>,
    repo: &ChainRecordsRepo,
    known_entities: &mut KnownEntities,
    token_decimals: &mut TokenDecimals,
    range: BlockRange,
) -> Result<ChunkReport, IngesterError> {
    let provider = connection.get_provider().await?;
    let bound_factories = get_bound_factories(domain, connection).await;
    let mut report = ChunkReport {
        covered_streams: get_covered_streams(domain, &bound_factories),
        ..Default::default()
    };

    for (factory, binding) in bound_factories.iter() {
        ingest_creation_events(
            domain,
            factory,
            binding,
            provider.as_ref(),
            repo,
            known_entities,
            range,
            &mut report,
        )
        .await?;
    }

    for (factory, binding) in bound_factories.iter() {
        let event_names = factory.get_other_event_names(&binding.interface);
        let topics = binding.interface.get_event_topics(&event_names);

        let Some(filter) = Filter::maybe_new(binding.address, &topics, range) else {
            continue;
        };
        let logs = fetch_logs(provider.as_ref(), &[filter]).await?;
        let records = normalize_all(&logs, &binding.interface, &binding.name, &BTreeMap::new());

        report.records_added += repo.append_batch(&factory.stream, records).await?;
    }

    ingest_child_events(
        domain,
        provider.as_ref(),
        repo,
        known_entities,
        token_decimals,
        range,
        &mut report,
    )
    .await?;

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn ingest_creation_events<P: Provider>(
    domain: &Domain,
    factory: &FactorySource,
    binding: &ContractBinding,
    provider: &P,
    repo: &ChainRecordsRepo,
    known_entities: &mut KnownEntities,
    range: BlockRange,
    report: &mut ChunkReport,
) -> Result<(), IngesterError> {
    let Some(creation) = factory.creation.as_ref() else {
        return Ok(());
    };

    let topics = binding.interface.get_event_topics(&[creation.event_name.clone()]);
    let Some(filter) = Filter::maybe_new(binding.address, &topics, range) else {
        warn!(
            contract = %binding.name,
            event = %creation.event_name,
            "bound interface lacks the creation event"
        );
        return Ok(());
    };

    let logs = fetch_logs(provider, &[filter]).await?;
    let records = normalize_all(&logs, &binding.interface, &binding.name, &BTreeMap::new());

    let mut children = vec![];
    for record in records.iter() {
        if let Some(child) = known_entities::get_child_address(record, creation) {
            if known_entities.register(child, record.clone()) {
                info!(
                    domain = %domain.name,
                    child = %events::address_to_string(&child),
                    block_number = record.block_number,
                    "discovered child contract"
                );
                report.discovered += 1;
            }
            children.push(child);
        }
    }

    report.records_added += repo.append_batch(&factory.stream, records).await?;

    for child in children {
        if let Some(origin) = known_entities.get_origin(&child) {
            report.projections_built +=
                build_projection(domain, origin, child, provider, repo).await as usize;
        }
    }

    Ok(())
}

async fn ingest_child_events<P: Provider>(
    domain: &Domain,
    provider: &P,
    repo: &ChainRecordsRepo,
    known_entities: &KnownEntities,
    token_decimals: &mut TokenDecimals,
    range: BlockRange,
    report: &mut ChunkReport,
) -> Result<(), IngesterError> {
    let Some(child) = domain.child.as_ref() else {
        return Ok(());
    };

    let topics = child.interface.get_all_event_topics();
    let filters = filters::get_for_addresses(&known_entities.get_addresses(), &topics, range);
    if filters.is_empty() {
        return Ok(());
    }

    let logs = fetch_logs(provider, &filters).await?;

    let mut display_decimals = BTreeMap::new();
    for log in logs.iter() {
        if display_decimals.contains_key(&log.address) {
            continue;
        }
        if let Some(origin) = known_entities.get_origin(&log.address) {
            let decimals = token_decimals.resolve_for_child(child, origin, provider).await;
            display_decimals.insert(log.address, decimals);
        }
    }
    let records = normalize_all(&logs, &child.interface, &child.contract_name, &display_decimals);

    let triggered: BTreeSet<Address> = records
        .iter()
        .filter(|record| domain.is_projection_trigger(&record.event_name))
        .filter_map(|record| record.contract_address.parse::<Address>().ok())
        .collect();

    report.records_added += repo.append_batch(&child.stream, records).await?;

    for address in triggered {
        if let Some(origin) = known_entities.get_origin(&address) {
            report.projections_built +=
                build_projection(domain, origin, address, provider, repo).await as usize;
        }
    }

    Ok(())
}

async fn fetch_logs<P: Provider>(provider: &P, filters: &[Filter]) -> Result<Vec<Log>, IngesterError> {
    let mut logs = vec![];

    for filter in filters {
        let fetched = provider
            .get_logs(&filter.value)
            .await
            .map_err(|error| IngesterError::query_range(filter.range, error))?;

        logs.extend(fetched);
    }

    Ok(logs)
}

/// Undecodable logs are logged and dropped
fn normalize_all(
    logs: &[Log],
    interface: &Interface,
    contract_name: &str,
    display_decimals: &BTreeMap<Address, HashMap<String, u8>>,
) -> Vec<EventRecord> {
    let no_decimals = HashMap::new();

    logs.iter()
        .filter_map(|log| {
            let decimals = display_decimals.get(&log.address).unwrap_or(&no_decimals);

            match events::normalize_with_decimals(log, interface, contract_name, decimals) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(
                        contract = %contract_name,
                        address = %events::address_to_string(&log.address),
                        %error,
                        "skipping undecodable log"
                    );

                    None
                }
            }
        })
        .collect()
}

/// Returns whether a projection was written
async fn build_projection<P: Provider>(
    domain: &Domain,
    origin: &EventRecord,
    child: Address,
    provider: &P,
    repo: &ChainRecordsRepo,
) -> bool {
    let Some(builder) = domain.projection.as_ref() else {
        return false;
    };

    let caller: &dyn ContractCaller = provider;
    let value = builder.build(origin, child, caller).await;
    let key = projections::get_projection_key(&child);

    match repo.put_projection(&key, value).await {
        Ok(()) => true,
        Err(error) => {
            warn!(domain = %domain.name, %key, %error, "cannot store projection");

            false
        }
    }
}
