//! File lifecycle and rewind
//!
//! ```text
//! Idle --begin_run--> Open --rewind--> Idle
//! ```
//!
//! `begin_run` while Open is rejected with `AlreadyRunning`. `rewind` is
//! idempotent: it deletes whatever the current run created (tolerating
//! files that are already gone) and always returns to Idle.

use crate::core::compression::CompressionConfig;
use crate::core::config::OutputFormat;
use crate::core::layout::{GlobalAttributes, RunLayout};
use crate::core::snapshot::{ParticleSnapshot, Population};
use crate::core::validation::{uncertain_path, validate_target};
use crate::core::writer::{RaggedWriter, WriteReceipt};
use crate::error::{Result, TrajectoryError};
use chrono::{Local, NaiveDateTime, Timelike};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The one or two files a run writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSet {
    primary: PathBuf,
    uncertain: Option<PathBuf>,
}

impl DestinationSet {
    /// Primary destination plus, if `uncertain`, its derived twin
    pub fn derive<P: Into<PathBuf>>(primary: P, uncertain: bool) -> Self {
        let primary = primary.into();
        let uncertain = uncertain.then(|| uncertain_path(&primary));
        DestinationSet { primary, uncertain }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn uncertain(&self) -> Option<&Path> {
        self.uncertain.as_deref()
    }

    pub fn path_for(&self, population: Population) -> Option<&Path> {
        match population {
            Population::Base => Some(&self.primary),
            Population::Uncertain => self.uncertain(),
        }
    }

    /// All paths, primary first
    pub fn paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.primary.clone())
            .chain(self.uncertain.clone())
            .collect()
    }

    fn entries(&self) -> Vec<(Population, &Path)> {
        let mut entries = vec![(Population::Base, self.primary.as_path())];
        if let Some(path) = &self.uncertain {
            entries.push((Population::Uncertain, path.as_path()));
        }
        entries
    }
}

struct OpenRun {
    layout: RunLayout,
    destinations: DestinationSet,
    writers: Vec<RaggedWriter>,
}

/// Owns the destination files of at most one open run
#[derive(Default)]
pub struct FileLifecycle {
    run: Option<OpenRun>,
}

impl FileLifecycle {
    pub fn new() -> Self {
        FileLifecycle { run: None }
    }

    /// True between `begin_run` and `rewind`
    pub fn is_open(&self) -> bool {
        self.run.is_some()
    }

    pub fn layout(&self) -> Option<&RunLayout> {
        self.run.as_ref().map(|r| &r.layout)
    }

    pub fn destinations(&self) -> Option<&DestinationSet> {
        self.run.as_ref().map(|r| &r.destinations)
    }

    /// Create every destination fresh and move to Open
    ///
    /// All targets are validated before any file is created. If creating
    /// a later destination fails, files already created for this call are
    /// removed again.
    pub fn begin_run(
        &mut self,
        destinations: DestinationSet,
        layout: RunLayout,
        globals: &GlobalAttributes,
        format: OutputFormat,
        compression: CompressionConfig,
    ) -> Result<&DestinationSet> {
        if self.run.is_some() {
            return Err(TrajectoryError::AlreadyRunning);
        }

        for (_, path) in destinations.entries() {
            validate_target(path)?;
        }

        let created = creation_time();
        let schema = layout.file_schema(globals, created);

        let mut writers = Vec::new();
        for (population, path) in destinations.entries() {
            let writer = RaggedWriter::create(
                path,
                population,
                &layout,
                &schema,
                format,
                compression.clone(),
            );
            match writer {
                Ok(writer) => writers.push(writer),
                Err(e) => {
                    let partial: Vec<PathBuf> =
                        writers.iter().map(|w| w.path().to_path_buf()).collect();
                    drop(writers);
                    if let Err(cleanup) = remove_files(&partial) {
                        warn!("Failed to clean up after aborted run start: {}", cleanup);
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "Opened trajectory run: {} timesteps, {} fields, destinations {:?}",
            layout.step_count(),
            layout.manifest().len(),
            destinations.paths()
        );

        let run = self.run.insert(OpenRun {
            layout,
            destinations,
            writers,
        });
        Ok(&run.destinations)
    }

    /// Write one population's snapshot to its destination
    pub fn write_timestep(&mut self, step: u32, snapshot: &ParticleSnapshot) -> Result<Range<u64>> {
        let run = self.run.as_mut().ok_or(TrajectoryError::WriteTargetClosed)?;

        let writer = run
            .writers
            .iter_mut()
            .find(|w| w.population() == snapshot.population)
            .ok_or(TrajectoryError::NoUncertainDestination)?;

        writer.write_timestep(&run.layout, step, snapshot)
    }

    /// Receipt naming every destination of the open run
    pub fn receipt(&self, step: u32, timestamp: NaiveDateTime) -> Result<WriteReceipt> {
        let run = self.run.as_ref().ok_or(TrajectoryError::WriteTargetClosed)?;
        Ok(WriteReceipt {
            step,
            paths: run.destinations.paths(),
            timestamp,
        })
    }

    /// Record length written so far for a population
    pub fn record_len(&self, population: Population) -> Option<u64> {
        self.run.as_ref().and_then(|run| {
            run.writers
                .iter()
                .find(|w| w.population() == population)
                .map(RaggedWriter::record_len)
        })
    }

    /// Delete the current run's files and return to Idle
    ///
    /// Calling this while Idle is a no-op. Removal errors other than a
    /// missing file are returned, but the state is Idle either way.
    pub fn rewind(&mut self) -> Result<()> {
        let run = match self.run.take() {
            Some(run) => run,
            None => {
                debug!("Rewind with no open run");
                return Ok(());
            }
        };

        let paths = run.destinations.paths();
        // close every handle before unlinking
        drop(run.writers);

        remove_files(&paths)?;
        info!("Rewound trajectory run, removed {:?}", paths);
        Ok(())
    }
}

/// Remove each file if present
///
/// Missing files are ignored. Every path is attempted; the first other
/// error is returned.
pub fn remove_files(paths: &[PathBuf]) -> Result<()> {
    let mut first_error = None;

    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {:?}: {}", path, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(TrajectoryError::Io(e)),
        None => Ok(()),
    }
}

/// Local wall-clock time rounded to the nearest second
fn creation_time() -> NaiveDateTime {
    let now = Local::now().naive_local();
    let rounded = now.with_nanosecond(0).unwrap_or(now);
    if now.nanosecond() >= 500_000_000 {
        rounded + chrono::TimeDelta::seconds(1)
    } else {
        rounded
    }
}
