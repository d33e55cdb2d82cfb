//! Disk I/O for trajectory files

use crate::core::compression::CompressionMethod;
use crate::core::config::OutputFormat;
use crate::core::header::{read_u32, read_u64, Header, STEP_ENTRY_SIZE};
use crate::core::layout::FileSchema;
use crate::core::schema::{FILL_F64, FILL_I32};
use crate::error::{Result, TrajectoryError};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One slot of the fixed step table
///
/// Until a timestep is written its `time` and `particle_count` hold the
/// fill values of their types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEntry {
    /// Seconds since the time origin
    pub time: f64,
    pub particle_count: i32,
    pub written: bool,
    /// First record index of this timestep
    pub record_start: u64,
    pub chunk_offset: u64,
    pub chunk_len: u64,
}

impl StepEntry {
    pub fn unwritten() -> Self {
        StepEntry {
            time: FILL_F64,
            particle_count: FILL_I32,
            written: false,
            record_start: 0,
            chunk_offset: 0,
            chunk_len: 0,
        }
    }

    /// Record range `[start, end)` occupied by this timestep
    pub fn record_range(&self) -> std::ops::Range<u64> {
        if !self.written {
            return 0..0;
        }
        self.record_start..self.record_start + self.particle_count as u64
    }

    pub fn to_bytes(&self) -> [u8; STEP_ENTRY_SIZE] {
        let mut bytes = [0u8; STEP_ENTRY_SIZE];
        bytes[0..8].copy_from_slice(&self.time.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.particle_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&(self.written as u32).to_le_bytes());
        bytes[16..24].copy_from_slice(&self.record_start.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.chunk_offset.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.chunk_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < STEP_ENTRY_SIZE {
            return Err(TrajectoryError::Corrupt("truncated step table".to_string()));
        }
        Ok(StepEntry {
            time: f64::from_bits(read_u64(bytes, 0)),
            particle_count: read_u32(bytes, 8) as i32,
            written: read_u32(bytes, 12) != 0,
            record_start: read_u64(bytes, 16),
            chunk_offset: read_u64(bytes, 24),
            chunk_len: read_u64(bytes, 32),
        })
    }
}

/// Disk-backed trajectory file open for appending timesteps
pub struct TrajectoryFile {
    file: File,
    path: PathBuf,
    header: Header,
    end: u64,
}

impl TrajectoryFile {
    /// Create a new trajectory file
    ///
    /// Writes the header, the schema block and an unwritten step table, then
    /// syncs. Fails if anything already exists at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        schema: &FileSchema,
        format: OutputFormat,
        codec: CompressionMethod,
        step_count: u32,
    ) -> Result<Self> {
        let schema_bytes = schema.to_bytes()?;
        let header = Header::new(format, codec, step_count, schema_bytes.len() as u64);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut prelude = Vec::with_capacity(header.data_offset as usize);
        prelude.extend_from_slice(&header.to_bytes());
        prelude.extend_from_slice(&schema_bytes);
        let empty = StepEntry::unwritten().to_bytes();
        for _ in 0..step_count {
            prelude.extend_from_slice(&empty);
        }

        file.write_all(&prelude)?;
        file.sync_all()?;

        Ok(TrajectoryFile {
            file,
            path: path.as_ref().to_path_buf(),
            end: header.data_offset,
            header,
        })
    }

    /// Durably append one timestep
    ///
    /// The chunk is written first, then its step table entry, then the
    /// header counters, and finally the file is synced. A crash at any point
    /// leaves every earlier timestep intact.
    pub fn append_step(
        &mut self,
        step: u32,
        time: f64,
        particle_count: u64,
        record_start: u64,
        chunk: &[u8],
    ) -> Result<StepEntry> {
        if step >= self.header.step_count {
            return Err(TrajectoryError::StepOutOfRange {
                step,
                step_count: self.header.step_count,
            });
        }
        let count = i32::try_from(particle_count).map_err(|_| {
            TrajectoryError::SchemaError(format!(
                "{} particles exceed the particle_count range",
                particle_count
            ))
        })?;

        let entry = StepEntry {
            time,
            particle_count: count,
            written: true,
            record_start,
            chunk_offset: self.end,
            chunk_len: chunk.len() as u64,
        };

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(chunk)?;

        self.file.seek(SeekFrom::Start(self.header.entry_offset(step)))?;
        self.file.write_all(&entry.to_bytes())?;

        self.header.record_len = record_start + particle_count;
        self.header.steps_written = self.header.steps_written.max(step + 1);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;

        self.file.flush()?;
        self.file.sync_data()?;

        self.end += chunk.len() as u64;
        Ok(entry)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
