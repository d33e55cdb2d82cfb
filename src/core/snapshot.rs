//! Per-timestep particle snapshots and the cache that serves them
//!
//! The simulation's state cache is an external collaborator; the writer only
//! needs [`ElementCache::load_timestep`]. [`MemoryCache`] is a plain
//! in-memory implementation for embedding and tests.

use crate::core::array::ParticleArray;
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which particle population a snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    /// Best-estimate particles, written to the primary destination
    Base,
    /// Uncertainty-bound particles, written to the uncertain twin
    Uncertain,
}

/// One population's particle arrays at one timestep
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSnapshot {
    pub population: Population,
    pub timestamp: NaiveDateTime,
    particle_count: usize,
    arrays: HashMap<String, ParticleArray>,
}

impl ParticleSnapshot {
    pub fn new(population: Population, timestamp: NaiveDateTime, particle_count: usize) -> Self {
        ParticleSnapshot {
            population,
            timestamp,
            particle_count,
            arrays: HashMap::new(),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_array(mut self, name: impl Into<String>, array: ParticleArray) -> Self {
        self.insert(name, array);
        self
    }

    /// Add or replace a named array
    pub fn insert(&mut self, name: impl Into<String>, array: ParticleArray) {
        self.arrays.insert(name.into(), array);
    }

    pub fn get(&self, name: &str) -> Option<&ParticleArray> {
        self.arrays.get(name)
    }

    /// Declared number of particles in this snapshot
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }
}

/// Source of per-timestep snapshots
pub trait ElementCache {
    /// All populations recorded for `step`
    fn load_timestep(&self, step: u32) -> Result<Vec<ParticleSnapshot>>;
}

/// In-memory [`ElementCache`]
#[derive(Debug, Default)]
pub struct MemoryCache {
    steps: BTreeMap<u32, Vec<ParticleSnapshot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache {
            steps: BTreeMap::new(),
        }
    }

    /// Record a snapshot for `step`, replacing any earlier snapshot of the
    /// same population
    pub fn insert(&mut self, step: u32, snapshot: ParticleSnapshot) {
        let entries = self.steps.entry(step).or_default();
        entries.retain(|s| s.population != snapshot.population);
        entries.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ElementCache for MemoryCache {
    fn load_timestep(&self, step: u32) -> Result<Vec<ParticleSnapshot>> {
        self.steps.get(&step).cloned().ok_or_else(|| {
            crate::error::TrajectoryError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no cached data for timestep {}", step),
            ))
        })
    }
}
