//! Process-wide plugin registry.
//!
//! Maps an artifact identity to its [`PluginRecord`]. The registry lock covers
//! only the find-or-insert decision; loads run without it, so a load may
//! re-enter the loader for other artifacts.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{PluginError, Result};
use crate::native::MappedArtifact;
use crate::plugin::Plugin;

static GLOBAL_REGISTRY: Lazy<Arc<PluginRegistry>> = Lazy::new(|| Arc::new(PluginRegistry::new()));

/// Observable state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Loading,
    Loaded,
    Failed,
}

/// Per-artifact load state.
///
/// The outcome cell doubles as the ready signal: it is empty while loading
/// and is set exactly once, which wakes every waiter. Once mapped, the
/// artifact is held here whatever the outcome, so a failed load never
/// unmaps code that has already run.
pub struct PluginRecord {
    identity: String,
    outcome: OnceCell<Result<Plugin>>,
    artifact: OnceCell<Arc<dyn MappedArtifact>>,
}

impl PluginRecord {
    fn new(identity: String) -> Self {
        Self {
            identity,
            outcome: OnceCell::new(),
            artifact: OnceCell::new(),
        }
    }

    /// Keep `artifact` alive for as long as this record exists.
    pub(crate) fn retain(&self, artifact: Arc<dyn MappedArtifact>) {
        if self.artifact.set(artifact).is_err() {
            tracing::warn!("Plugin record {} already holds an artifact", self.identity);
        }
    }

    /// Whether an artifact was mapped for this record.
    pub fn is_mapped(&self) -> bool {
        self.artifact.get().is_some()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn status(&self) -> RecordStatus {
        match self.outcome.get() {
            None => RecordStatus::Loading,
            Some(Ok(_)) => RecordStatus::Loaded,
            Some(Err(_)) => RecordStatus::Failed,
        }
    }

    /// The outcome if the load has finished. Never blocks.
    pub fn outcome(&self) -> Option<&Result<Plugin>> {
        self.outcome.get()
    }

    /// Block until the owning load publishes, then return its outcome.
    pub fn wait(&self) -> &Result<Plugin> {
        if let Some(outcome) = self.outcome.get() {
            return outcome;
        }
        tracing::debug!("Waiting for in-flight load of {}", self.identity);
        self.outcome.wait()
    }
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("identity", &self.identity)
            .field("status", &self.status())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Result of [`PluginRegistry::find_or_reserve`].
#[derive(Debug)]
pub enum Reservation {
    /// Another caller created the record; it may still be loading.
    Existing(Arc<PluginRecord>),
    /// This caller created the record and must load it, then publish.
    Reserved(Arc<PluginRecord>),
}

/// Registry of plugin records, one per identity, never removed.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    records: Mutex<HashMap<String, Arc<PluginRecord>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use and never torn down.
    pub fn global() -> Arc<PluginRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Return the record for `identity`, inserting a loading placeholder if
    /// there is none. Exactly one caller per identity gets `Reserved`.
    pub fn find_or_reserve(&self, identity: &str) -> Reservation {
        let mut records = self.records.lock();
        if let Some(record) = records.get(identity) {
            return Reservation::Existing(Arc::clone(record));
        }
        let record = Arc::new(PluginRecord::new(identity.to_string()));
        records.insert(identity.to_string(), Arc::clone(&record));
        tracing::debug!("Reserved plugin record {}", identity);
        Reservation::Reserved(record)
    }

    /// Store the final outcome of a load and release all waiters.
    ///
    /// Returns the stored outcome. Publishing twice keeps the first outcome.
    pub fn publish(&self, record: &PluginRecord, outcome: Result<Plugin>) -> Result<Plugin> {
        match &outcome {
            Ok(plugin) => tracing::info!(
                "Loaded plugin {} ({} symbols)",
                record.identity,
                plugin.symbols().len()
            ),
            Err(e) => tracing::warn!("Failed to load plugin {}: {}", record.identity, e),
        }
        if record.outcome.set(outcome).is_err() {
            tracing::warn!("Plugin record {} was already published", record.identity);
        }
        match record.outcome.get() {
            Some(stored) => stored.clone(),
            None => Err(PluginError::module_init(
                record.identity.clone(),
                "plugin record lost its outcome",
            )),
        }
    }

    pub fn get(&self, identity: &str) -> Option<Arc<PluginRecord>> {
        self.records.lock().get(identity).cloned()
    }

    pub fn status(&self, identity: &str) -> Option<RecordStatus> {
        self.get(identity).map(|record| record.status())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Identity and status of every record, sorted by identity.
    pub fn snapshot(&self) -> Vec<(String, RecordStatus)> {
        let records: Vec<Arc<PluginRecord>> = self.records.lock().values().cloned().collect();
        let mut snapshot: Vec<_> = records
            .iter()
            .map(|record| (record.identity.clone(), record.status()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}
