//! Ragged writer
//!
//! One [`RaggedWriter`] owns one destination file for the length of a run.
//! It keeps the running record offset: timestep `j` starts where the
//! previous write ended, so ranges stay contiguous however the particle
//! count varies between steps.

use crate::core::chunk::encode_chunk;
use crate::core::compression::CompressionConfig;
use crate::core::config::OutputFormat;
use crate::core::io::TrajectoryFile;
use crate::core::layout::{FileSchema, RunLayout};
use crate::core::snapshot::{ParticleSnapshot, Population};
use crate::error::{Result, TrajectoryError};
use chrono::NaiveDateTime;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of a timestep write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt {
    pub step: u32,
    /// Every destination of the run
    pub paths: Vec<PathBuf>,
    pub timestamp: NaiveDateTime,
}

pub struct RaggedWriter {
    file: TrajectoryFile,
    population: Population,
    compression: CompressionConfig,
    next_offset: u64,
}

impl RaggedWriter {
    /// Create the destination file and write its schema
    pub fn create<P: AsRef<Path>>(
        path: P,
        population: Population,
        layout: &RunLayout,
        schema: &FileSchema,
        format: OutputFormat,
        compression: CompressionConfig,
    ) -> Result<Self> {
        let file = TrajectoryFile::create(
            path,
            schema,
            format,
            compression.method,
            layout.step_count(),
        )?;

        Ok(RaggedWriter {
            file,
            population,
            compression,
            next_offset: 0,
        })
    }

    /// Write one timestep and return the record range it occupies
    ///
    /// The range starts at the sum of all earlier particle counts. A
    /// snapshot with zero particles yields an empty range and leaves the
    /// record axis unchanged.
    pub fn write_timestep(
        &mut self,
        layout: &RunLayout,
        step: u32,
        snapshot: &ParticleSnapshot,
    ) -> Result<Range<u64>> {
        if step >= layout.step_count() {
            return Err(TrajectoryError::StepOutOfRange {
                step,
                step_count: layout.step_count(),
            });
        }

        let start = self.next_offset;
        let count = snapshot.particle_count() as u64;
        if i32::try_from(count).is_err() {
            return Err(TrajectoryError::SchemaError(format!(
                "{} particles exceed the particle_count range",
                count
            )));
        }

        let chunk = encode_chunk(layout.manifest(), step, start, snapshot, &self.compression)?;
        let time = layout.elapsed_seconds(snapshot.timestamp);
        self.file.append_step(step, time, count, start, &chunk)?;

        self.next_offset = start + count;

        debug!(
            "Wrote timestep {} ({} particles, records {}..{}) to {:?}",
            step,
            count,
            start,
            self.next_offset,
            self.file.path()
        );

        Ok(start..self.next_offset)
    }

    /// Current length of the record axis
    pub fn record_len(&self) -> u64 {
        self.next_offset
    }

    pub fn population(&self) -> Population {
        self.population
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
