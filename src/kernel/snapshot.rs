//! Serializable view of a running simulation for trace capture.

use super::{Simulator, SimTime};
use crate::channel::ChannelStats;
use crate::signal::{SignalKind, SignalValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub name: String,
    pub kind: SignalKind,
    pub value: SignalValue,
    pub drivers: usize,
    pub active_drivers: usize,
    pub conflict_episodes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub name: String,
    pub capacity: usize,
    #[serde(with = "serde_bytes")]
    pub pending: Vec<u8>,
    pub stats: ChannelStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub name: String,
    pub kind: String,
    pub state: String,
    pub activations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub time: SimTime,
    pub nets: Vec<NetSnapshot>,
    pub channels: Vec<ChannelSnapshot>,
    pub components: Vec<ComponentSnapshot>,
}

impl Simulator {
    pub fn snapshot(&self) -> SimSnapshot {
        let nets = self
            .core
            .nets
            .iter()
            .map(|net| NetSnapshot {
                name: net.name.clone(),
                kind: net.kind,
                value: net.value,
                drivers: net.driver_count(),
                active_drivers: net.active_drivers(),
                conflict_episodes: net.conflict_episodes,
            })
            .collect();

        let channels = self
            .core
            .channels
            .iter()
            .map(|ch| ChannelSnapshot {
                name: ch.name().to_string(),
                capacity: ch.capacity(),
                pending: ch.iter().copied().collect(),
                stats: *ch.stats(),
            })
            .collect();

        let components = self
            .components
            .iter()
            .map(|entry| ComponentSnapshot {
                name: entry.name.clone(),
                kind: entry.component.kind().to_string(),
                state: entry.component.state_label(),
                activations: entry
                    .processes
                    .iter()
                    .map(|p| self.core.processes[p.index()].activations)
                    .sum(),
            })
            .collect();

        SimSnapshot {
            time: self.core.now,
            nets,
            channels,
            components,
        }
    }
}
