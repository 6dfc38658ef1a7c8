//! Per-run record of materialized primary resources.
//!
//! Deployment and Job handlers record what they built; dependent handlers
//! resolve sibling resources by name through the ledger instead of holding
//! references to the built objects.

use std::collections::BTreeMap;

use crate::model::{PortSpec, Protocol};
use crate::naming::{ResourceKind, SelectorLabel};

/// A primary resource that downstream handlers may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Declared workload name.
    pub workload: String,
    pub kind: ResourceKind,
    /// Canonical resource name, e.g. `hello-deployment`.
    pub resource_name: String,
    pub selector: SelectorLabel,
    pub image: String,
    pub ports: Vec<PortSpec>,
    /// Secret and ConfigMap resources mounted by the pod template.
    pub mounts: Vec<(ResourceKind, String)>,
}

impl LedgerEntry {
    /// Output group the entry's artifacts are written under.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.selector.value
    }

    /// The container port matching `port`, and `protocol` when one is given.
    #[must_use]
    pub fn exposes(&self, port: i32, protocol: Option<Protocol>) -> Option<&PortSpec> {
        self.ports.iter().find(|p| {
            p.container_port == port && protocol.is_none_or(|proto| p.protocol == proto)
        })
    }
}

/// Map of (kind, sanitized workload name) to the resource built for it.
#[derive(Debug, Clone, Default)]
pub struct NameLedger {
    entries: BTreeMap<(ResourceKind, String), LedgerEntry>,
}

impl NameLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a built resource, replacing any earlier entry for the same key.
    pub fn record(&mut self, entry: LedgerEntry) {
        let key = (entry.kind, entry.selector.value.clone());
        self.entries.insert(key, entry);
    }

    /// Resolve by sanitized workload name (the selector value).
    #[must_use]
    pub fn resolve(&self, kind: ResourceKind, workload_key: &str) -> Option<&LedgerEntry> {
        self.entries.get(&(kind, workload_key.to_string()))
    }

    /// Resolve by canonical resource name.
    #[must_use]
    pub fn resolve_resource(
        &self,
        kind: ResourceKind,
        resource_name: &str,
    ) -> Option<&LedgerEntry> {
        self.entries
            .values()
            .find(|entry| entry.kind == kind && entry.resource_name == resource_name)
    }

    /// First primary resource that mounts `name` as a `kind` volume.
    #[must_use]
    pub fn owner_of(&self, kind: ResourceKind, name: &str) -> Option<&LedgerEntry> {
        self.entries
            .values()
            .find(|entry| entry.mounts.iter().any(|(k, n)| *k == kind && n == name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
