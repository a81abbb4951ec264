//! Read-only registry views published to consumers

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::connectors::{sanitize_prefix, ConnectorKind, ConnectorState};
use crate::types::ConnectorTool;

/// Status of one registered connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSummary {
    pub id: String,
    pub name: String,
    pub kind: ConnectorKind,
    pub enabled: bool,
    pub state: ConnectorState,
    pub tool_count: usize,
}

/// Registry contents at one revision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Incremented on every publish
    pub revision: u64,
    pub connectors: Vec<ConnectorSummary>,
    /// Aggregated tools of connected connectors
    pub tools: Vec<ConnectorTool>,
}

impl RegistrySnapshot {
    pub fn connector(&self, id: &str) -> Option<&ConnectorSummary> {
        self.connectors.iter().find(|c| c.id == id)
    }

    pub fn connected_count(&self) -> usize {
        self.connectors
            .iter()
            .filter(|c| c.state.is_connected())
            .count()
    }
}

fn prefixed(prefix: &str, name: &str, taken: &HashSet<String>) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }
    let candidate = format!("{}_{}", prefix, name);
    (!taken.contains(&candidate)).then_some(candidate)
}

/// Give every tool a unique exposed name.
///
/// Names that occur once are kept. Colliding names become
/// `{connector_name}_{tool}`, then `{connector_id}_{tool}`, then get a
/// numeric suffix.
pub(crate) fn disambiguate(tools: Vec<ConnectorTool>) -> Vec<ConnectorTool> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tool in &tools {
        *counts.entry(tool.name.clone()).or_default() += 1;
    }

    let mut taken: HashSet<String> = counts
        .iter()
        .filter(|(_, count)| **count == 1)
        .map(|(name, _)| name.clone())
        .collect();

    tools
        .into_iter()
        .map(|tool| {
            if counts.get(&tool.name).copied().unwrap_or(0) <= 1 {
                return tool;
            }
            let name = prefixed(&sanitize_prefix(&tool.connector_name), &tool.name, &taken)
                .or_else(|| prefixed(&sanitize_prefix(&tool.connector_id), &tool.name, &taken))
                .unwrap_or_else(|| {
                    let base = format!("{}_{}", sanitize_prefix(&tool.connector_id), tool.name);
                    let mut n = 2;
                    while taken.contains(&format!("{}_{}", base, n)) {
                        n += 1;
                    }
                    format!("{}_{}", base, n)
                });
            taken.insert(name.clone());
            tool.with_display_name(name)
        })
        .collect()
}
