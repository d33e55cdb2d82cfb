//! # trajectory-rs - Ragged-Array Trajectory Output
//!
//! `trajectory-rs` records the particles of a Lagrangian spill simulation,
//! one timestep at a time, into a self-describing file that follows the
//! contiguous ragged array convention:
//!
//! - **Ragged layout**: a fixed `time` axis and a growable `data` axis;
//!   timestep `j` owns a contiguous run of records
//! - **Standard + extended fields**: a fixed manifest of particle properties,
//!   optionally widened with every array the particle sources declare
//! - **Uncertain twin**: uncertainty-bound particles go to a sibling file
//! - **Durable appends**: every timestep is synced before the write returns
//! - **Rewind**: deletes the run's files so the next run starts clean
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use trajectory_rs::{
//!     ParticleArray, ParticleSnapshot, Population, Result, RunParameters, TrajectoryOutput,
//! };
//!
//! # fn main() -> Result<()> {
//! let start = NaiveDate::from_ymd_opt(2013, 2, 13)
//!     .and_then(|d| d.and_hms_opt(9, 0, 0))
//!     .expect("valid date");
//!
//! let mut output = TrajectoryOutput::builder().path("run.traj").build()?;
//! output.prepare_for_model_run(RunParameters::new(start, 4))?;
//!
//! let snapshot = ParticleSnapshot::new(Population::Base, start, 2)
//!     .with_array("positions", ParticleArray::vector(vec![-72.5f64, 41.2, 0.0, -72.4, 41.3, 1.5]))
//!     .with_array("mass", ParticleArray::scalar(vec![100.0f64, 100.0]));
//! output.write_timestep(0, &snapshot)?;
//!
//! // Discard the run and its files
//! output.rewind()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing from a cache
//!
//! ```rust,no_run
//! use trajectory_rs::{MemoryCache, Result, RunParameters, TrajectoryOutput};
//!
//! # fn run(cache: &MemoryCache, params: RunParameters) -> Result<()> {
//! let mut output = TrajectoryOutput::builder()
//!     .path("run.traj")
//!     .all_data(true)
//!     .build()?;
//!
//! let steps = params.step_count.unwrap_or(0);
//! output.prepare_for_model_run(params.with_uncertain(true))?;
//! for step in 0..steps {
//!     let receipt = output.write_output(step, cache)?;
//!     println!("step {} -> {:?}", receipt.step, receipt.paths);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;

pub use crate::core::{
    array::{FieldData, ParticleArray},
    compression::CompressionMethod,
    config::{OutputConfig, OutputFormat},
    layout::{GlobalAttributes, LayoutPlanner, RunLayout, RunParameters},
    lifecycle::DestinationSet,
    reader::{StepRecord, TrajectoryReader},
    schema::{
        standard_manifest, DataType, FieldDescriptor, FieldShape, Manifest, SchemaRegistry,
        SourceDescriptor,
    },
    snapshot::{ElementCache, MemoryCache, ParticleSnapshot, Population},
    writer::WriteReceipt,
};
pub use crate::error::{Result, TrajectoryError};

use crate::core::lifecycle::FileLifecycle;
use crate::core::validation::validate_target;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Trajectory outputter
///
/// Owns the output configuration and at most one open run. Configuration
/// that shapes the files (path, field selection, format, compression) is
/// locked between [`prepare_for_model_run`](Self::prepare_for_model_run)
/// and [`rewind`](Self::rewind).
pub struct TrajectoryOutput {
    config: OutputConfig,
    globals: GlobalAttributes,
    planner: LayoutPlanner,
    lifecycle: FileLifecycle,
}

impl TrajectoryOutput {
    /// Create an outputter, validating the target path immediately
    pub fn new(config: OutputConfig) -> Result<Self> {
        config.validate()?;
        validate_target(&config.path)?;

        Ok(TrajectoryOutput {
            config,
            globals: GlobalAttributes::default(),
            planner: LayoutPlanner::default(),
            lifecycle: FileLifecycle::new(),
        })
    }

    pub fn builder() -> TrajectoryOutputBuilder {
        TrajectoryOutputBuilder::new()
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn global_attributes(&self) -> &GlobalAttributes {
        &self.globals
    }

    /// True while a run is open
    pub fn middle_of_run(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Layout of the open run
    pub fn layout(&self) -> Option<&RunLayout> {
        self.lifecycle.layout()
    }

    /// Destinations of the open run
    pub fn destinations(&self) -> Option<&DestinationSet> {
        self.lifecycle.destinations()
    }

    /// Records written so far for a population in the open run
    pub fn record_len(&self, population: Population) -> Option<u64> {
        self.lifecycle.record_len(population)
    }

    pub fn set_path<P: Into<PathBuf>>(&mut self, path: P) -> Result<()> {
        let path = path.into();
        self.ensure_unlocked("path")?;
        validate_target(&path)?;
        self.update(|c| c.path = path)
    }

    pub fn set_all_data(&mut self, all_data: bool) -> Result<()> {
        self.ensure_unlocked("all_data")?;
        self.update(|c| c.all_data = all_data)
    }

    pub fn set_compress(&mut self, compress: bool) -> Result<()> {
        self.ensure_unlocked("compress")?;
        self.update(|c| c.compress = compress)
    }

    pub fn set_format(&mut self, format: OutputFormat) -> Result<()> {
        self.ensure_unlocked("format")?;
        self.update(|c| c.format = format)
    }

    pub fn set_codec(&mut self, codec: CompressionMethod) -> Result<()> {
        self.ensure_unlocked("codec")?;
        self.update(|c| c.codec = codec)
    }

    pub fn set_global_attributes(&mut self, globals: GlobalAttributes) -> Result<()> {
        self.ensure_unlocked("global_attributes")?;
        self.globals = globals;
        Ok(())
    }

    /// Plan the run layout and create the destination files
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a run is open
    /// - `MissingParameter` / `MissingSources` / `SchemaError` from planning
    /// - `InvalidDestination` if any destination cannot be created
    pub fn prepare_for_model_run(&mut self, params: RunParameters) -> Result<&DestinationSet> {
        if self.lifecycle.is_open() {
            return Err(TrajectoryError::AlreadyRunning);
        }

        let layout = self.planner.plan(&params, self.config.all_data)?;
        let destinations = DestinationSet::derive(&self.config.path, layout.uncertain());

        info!(
            "Preparing trajectory output for {} timesteps from {} (uncertain: {}, all_data: {})",
            layout.step_count(),
            layout.start_time(),
            layout.uncertain(),
            self.config.all_data
        );

        self.lifecycle.begin_run(
            destinations,
            layout,
            &self.globals,
            self.config.format,
            self.config.compression(),
        )
    }

    /// Write one population's snapshot for `step`
    ///
    /// Base snapshots go to the primary destination and uncertain snapshots
    /// to the uncertain twin.
    pub fn write_timestep(&mut self, step: u32, snapshot: &ParticleSnapshot) -> Result<WriteReceipt> {
        self.lifecycle.write_timestep(step, snapshot)?;
        let path = self
            .lifecycle
            .destinations()
            .and_then(|d| d.path_for(snapshot.population))
            .map(Path::to_path_buf)
            .ok_or(TrajectoryError::WriteTargetClosed)?;

        Ok(WriteReceipt {
            step,
            paths: vec![path],
            timestamp: snapshot.timestamp,
        })
    }

    /// Write every population the cache holds for `step`
    ///
    /// The receipt lists all destinations of the run.
    pub fn write_output(&mut self, step: u32, cache: &dyn ElementCache) -> Result<WriteReceipt> {
        if !self.lifecycle.is_open() {
            return Err(TrajectoryError::WriteTargetClosed);
        }

        let snapshots = cache.load_timestep(step)?;
        let timestamp = match snapshots.first() {
            Some(s) => s.timestamp,
            None => {
                return Err(TrajectoryError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("cache holds no snapshots for timestep {}", step),
                )))
            }
        };

        for snapshot in &snapshots {
            self.lifecycle.write_timestep(step, snapshot)?;
        }

        debug!("Wrote {} population(s) for timestep {}", snapshots.len(), step);
        self.lifecycle.receipt(step, timestamp)
    }

    /// Delete the current run's files and unlock the configuration
    pub fn rewind(&mut self) -> Result<()> {
        self.lifecycle.rewind()
    }

    fn ensure_unlocked(&self, setting: &'static str) -> Result<()> {
        if self.lifecycle.is_open() {
            return Err(TrajectoryError::ConfigurationLocked(setting));
        }
        Ok(())
    }

    fn update(&mut self, apply: impl FnOnce(&mut OutputConfig)) -> Result<()> {
        let mut config = self.config.clone();
        apply(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }
}

/// Builder for [`TrajectoryOutput`]
pub struct TrajectoryOutputBuilder {
    path: Option<PathBuf>,
    all_data: bool,
    compress: bool,
    format: OutputFormat,
    codec: CompressionMethod,
    globals: GlobalAttributes,
}

impl TrajectoryOutputBuilder {
    pub fn new() -> Self {
        TrajectoryOutputBuilder {
            path: None,
            all_data: false,
            compress: true,
            format: OutputFormat::default(),
            codec: CompressionMethod::Lz4,
            globals: GlobalAttributes::default(),
        }
    }

    /// Set the primary output file (required)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Export every source array, not only the standard fields
    pub fn all_data(mut self, all_data: bool) -> Self {
        self.all_data = all_data;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn codec(mut self, codec: CompressionMethod) -> Self {
        self.codec = codec;
        self
    }

    pub fn global_attributes(mut self, globals: GlobalAttributes) -> Self {
        self.globals = globals;
        self
    }

    pub fn build(self) -> Result<TrajectoryOutput> {
        let path = self.path.ok_or(TrajectoryError::MissingParameter("path"))?;

        let config = OutputConfig {
            path,
            all_data: self.all_data,
            compress: self.compress,
            format: self.format,
            codec: self.codec,
        };

        let mut output = TrajectoryOutput::new(config)?;
        output.globals = self.globals;
        Ok(output)
    }
}

impl Default for TrajectoryOutputBuilder {
    fn default() -> Self {
        Self::new()
    }
}
