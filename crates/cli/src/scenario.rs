//! JSON scenario files: a list of containers and their initial slots.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use stowage_inventory::partition::DEFAULT_COLUMNS;
use stowage_inventory::{BackingContainer, ContainerKind, InMemoryContainer, PartitionMeta, Slot};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub containers: Vec<ContainerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerEntry {
    #[serde(default = "default_kind")]
    pub kind: ContainerKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub columns: Option<u16>,
    /// `null` entries are empty slots.
    pub slots: Vec<Slot>,
}

fn default_kind() -> ContainerKind {
    ContainerKind::Simple
}

/// Live containers built from a scenario. The aggregate only holds weak handles, so these
/// must outlive it.
pub struct Loaded {
    pub containers: Vec<Arc<InMemoryContainer>>,
    pub metas: Vec<PartitionMeta>,
}

impl Loaded {
    pub fn handles(&self) -> Vec<(Arc<dyn BackingContainer>, PartitionMeta)> {
        self.containers
            .iter()
            .zip(&self.metas)
            .map(|(c, meta)| (c.clone() as Arc<dyn BackingContainer>, meta.clone()))
            .collect()
    }
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        anyhow::ensure!(!scenario.containers.is_empty(), "scenario has no containers");
        Ok(scenario)
    }

    pub fn build(self) -> Loaded {
        let mut containers = Vec::with_capacity(self.containers.len());
        let mut metas = Vec::with_capacity(self.containers.len());
        for entry in self.containers {
            let meta = PartitionMeta {
                title: entry.title,
                columns: entry.columns.unwrap_or(DEFAULT_COLUMNS),
            };
            containers.push(Arc::new(InMemoryContainer::with_slots(entry.kind, entry.slots)));
            metas.push(meta);
        }
        Loaded { containers, metas }
    }
}
