//! Dataset registry
//!
//! Maps tickets to dataset producers and holds the static catalog of
//! flights advertised through `ListFlights`. A registry is filled in before
//! it is handed to a server; after that it is only shared immutably.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow_flight::{FlightDescriptor, FlightInfo};
use bytes::Bytes;
use tabula_core::{fixtures, Dataset};
use tracing::debug;

use crate::error::FlightError;
use crate::Result;

/// Builds a fresh dataset on every call
pub trait DatasetProducer: Send + Sync {
    fn produce(&self) -> tabula_core::Result<Dataset>;
}

impl<F> DatasetProducer for F
where
    F: Fn() -> tabula_core::Result<Dataset> + Send + Sync,
{
    fn produce(&self) -> tabula_core::Result<Dataset> {
        self()
    }
}

/// Decides whether a catalog entry is listed for a given criteria value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaPolicy {
    /// Listed only when the criteria bytes are exactly equal
    Exact(Bytes),
    /// Listed for every criteria value, including empty
    Always,
}

impl CriteriaPolicy {
    pub fn exact(criteria: impl Into<Bytes>) -> Self {
        CriteriaPolicy::Exact(criteria.into())
    }

    pub fn matches(&self, criteria: &[u8]) -> bool {
        match self {
            CriteriaPolicy::Exact(expected) => expected.as_ref() == criteria,
            CriteriaPolicy::Always => true,
        }
    }
}

struct CatalogEntry {
    info: FlightInfo,
    policy: CriteriaPolicy,
}

/// Ticket to producer mapping plus the advertised flight catalog
#[derive(Default)]
pub struct DatasetRegistry {
    /// Producers in registration order
    producers: Vec<(Bytes, Arc<dyn DatasetProducer>)>,
    index: HashMap<Bytes, usize>,
    catalog: Vec<CatalogEntry>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the constant `ints`, `dicts` and `multi` datasets and a
    /// single flight advertised under [`fixtures::EXPECTED_CRITERIA`]
    pub fn with_fixtures() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(fixtures::INTS_TICKET, fixtures::simple_ints_table)?;
        registry.register(fixtures::DICTS_TICKET, fixtures::simple_dicts_table)?;
        registry.register(fixtures::MULTI_TICKET, fixtures::multiple_column_table)?;

        let info = FlightInfo::new()
            .try_with_schema(&Schema::empty())?
            .with_descriptor(FlightDescriptor::new_path(vec![
                fixtures::ADVERTISED_PATH.to_string(),
            ]))
            .with_total_records(-1)
            .with_total_bytes(-1);
        registry.advertise(info, CriteriaPolicy::exact(fixtures::EXPECTED_CRITERIA));

        Ok(registry)
    }

    /// Register a producer under `ticket`
    pub fn register<P>(&mut self, ticket: impl Into<Bytes>, producer: P) -> Result<()>
    where
        P: DatasetProducer + 'static,
    {
        let ticket = ticket.into();
        if self.index.contains_key(&ticket) {
            return Err(FlightError::DuplicateTicket(display_ticket(&ticket)));
        }

        debug!("Registered ticket: {}", display_ticket(&ticket));
        self.index.insert(ticket.clone(), self.producers.len());
        self.producers.push((ticket, Arc::new(producer)));
        Ok(())
    }

    /// Add a flight to the `ListFlights` catalog
    pub fn advertise(&mut self, info: FlightInfo, policy: CriteriaPolicy) {
        self.catalog.push(CatalogEntry { info, policy });
    }

    /// Look up `ticket` and produce a new dataset for it
    pub fn resolve(&self, ticket: &[u8]) -> Result<Dataset> {
        let idx = self
            .index
            .get(ticket)
            .copied()
            .ok_or_else(|| FlightError::TicketNotFound(display_ticket(ticket)))?;

        let (_, producer) = &self.producers[idx];
        Ok(producer.produce()?)
    }

    pub fn contains(&self, ticket: &[u8]) -> bool {
        self.index.contains_key(ticket)
    }

    /// Registered tickets in registration order
    pub fn tickets(&self) -> impl Iterator<Item = &Bytes> {
        self.producers.iter().map(|(ticket, _)| ticket)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Lazily yield catalog entries whose policy accepts `criteria`
    pub fn matching(self: &Arc<Self>, criteria: Bytes) -> CatalogMatches {
        CatalogMatches {
            registry: Arc::clone(self),
            criteria,
            pos: 0,
        }
    }
}

/// Iterator over catalog entries matching one criteria value
pub struct CatalogMatches {
    registry: Arc<DatasetRegistry>,
    criteria: Bytes,
    pos: usize,
}

impl Iterator for CatalogMatches {
    type Item = FlightInfo;

    fn next(&mut self) -> Option<FlightInfo> {
        while let Some(entry) = self.registry.catalog.get(self.pos) {
            self.pos += 1;
            if entry.policy.matches(&self.criteria) {
                return Some(entry.info.clone());
            }
        }
        None
    }
}

pub(crate) fn display_ticket(ticket: &[u8]) -> String {
    String::from_utf8_lossy(ticket).into_owned()
}
