use rkyv::{Archive, Deserialize, Serialize};

use crate::clock::Tick;

use super::types::Snapshot;

/// One broadcast sample of the whole world. The tick applies to every entry.
#[derive(Debug, Clone, PartialEq, Default, Archive, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub entities: Vec<Snapshot>,
}

impl WorldSnapshot {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            entities: Vec::new(),
        }
    }

    pub fn with_entities(tick: Tick, entities: Vec<Snapshot>) -> Self {
        Self { tick, entities }
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.entities.iter().find(|s| s.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(Snapshot::id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
