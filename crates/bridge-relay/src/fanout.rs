use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bridge_db::RelayStore;
use bridge_types::ChannelId;
use serde::Deserialize;

use crate::call;
use crate::error::Result;

/// Fixed source-to-targets map, read once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StaticFanOut {
    routes: HashMap<ChannelId, Vec<ChannelId>>,
}

impl StaticFanOut {
    /// Parses `{ "<channel>": ["<channel>", ...] }`.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid static fan-out map")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read static fan-out map {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Configured targets of `channel`, without itself and without repeats.
    pub fn targets(&self, channel: ChannelId) -> Vec<ChannelId> {
        let mut seen = HashSet::new();
        self.routes
            .get(&channel)
            .into_iter()
            .flatten()
            .copied()
            .filter(|t| *t != channel && seen.insert(*t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Where the list of target channels for an event comes from.
#[derive(Debug, Clone)]
pub enum FanOutSource {
    /// Groups managed through the link commands.
    Links,
    /// Legacy fixed map; link commands still edit the store but do not affect relaying.
    Static(StaticFanOut),
}

impl FanOutSource {
    pub async fn targets(&self, store: &Arc<dyn RelayStore>, channel: ChannelId) -> Result<Vec<ChannelId>> {
        match self {
            Self::Links => call::blocking(store, move |s| s.fan_out_targets(channel)).await,
            Self::Static(map) => Ok(map.targets(channel)),
        }
    }
}

impl From<Option<StaticFanOut>> for FanOutSource {
    fn from(map: Option<StaticFanOut>) -> Self {
        map.map_or(Self::Links, Self::Static)
    }
}
