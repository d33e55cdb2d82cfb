//! Read-only access to trajectory files
//!
//! The file is memory-mapped once; chunks are decoded on demand. A file
//! left behind by an interrupted run is readable up to its last complete
//! timestep.

use crate::core::array::FieldData;
use crate::core::chunk::decode_chunk;
use crate::core::header::{Header, HEADER_SIZE, STEP_ENTRY_SIZE};
use crate::core::io::StepEntry;
use crate::core::layout::{timestamp_after, FileSchema};
use crate::core::schema::{AttrValue, Manifest};
use crate::error::{Result, TrajectoryError};
use chrono::NaiveDateTime;
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Decoded fields of one timestep, in manifest order
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: u32,
    pub entry: StepEntry,
    pub fields: Vec<FieldData>,
}

pub struct TrajectoryReader {
    mmap: Mmap,
    path: PathBuf,
    header: Header,
    schema: FileSchema,
    manifest: Manifest,
    entries: Vec<StepEntry>,
}

impl TrajectoryReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only and trajectory files are only
        // appended to by their single writer.
        let mmap = unsafe { Mmap::map(&file)? };

        let header = Header::from_bytes(&mmap)?;

        let schema_range = region(&mmap, header.schema_offset, header.schema_len, "schema block")?;
        let schema = FileSchema::from_bytes(&mmap[schema_range])?;
        let manifest = schema.manifest()?;

        let table_len = header.step_count as u64 * STEP_ENTRY_SIZE as u64;
        let table = region(&mmap, header.table_offset, table_len, "step table")?;
        let entries = mmap[table]
            .chunks_exact(STEP_ENTRY_SIZE)
            .map(StepEntry::from_bytes)
            .collect::<Result<Vec<_>>>()?;

        Ok(TrajectoryReader {
            mmap,
            path: path.as_ref().to_path_buf(),
            header,
            schema,
            manifest,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> &FileSchema {
        &self.schema
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn global_attribute(&self, name: &str) -> Option<&AttrValue> {
        self.schema.global_attributes.get(name)
    }

    /// Length of the time axis
    pub fn step_count(&self) -> u32 {
        self.header.step_count
    }

    /// Length of the record axis
    pub fn record_len(&self) -> u64 {
        self.header.record_len
    }

    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    /// The `particle_count` variable (fill value for unwritten steps)
    pub fn particle_counts(&self) -> Vec<i32> {
        self.entries.iter().map(|e| e.particle_count).collect()
    }

    /// The `time` variable in seconds since the origin
    pub fn times(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.time).collect()
    }

    /// Absolute timestamps, `None` for unwritten steps
    pub fn timestamps(&self) -> Result<Vec<Option<NaiveDateTime>>> {
        let origin = self.schema.time_origin()?;
        Ok(self
            .entries
            .iter()
            .map(|e| e.written.then(|| timestamp_after(origin, e.time)))
            .collect())
    }

    /// Record range of a timestep (empty if unwritten)
    pub fn step_range(&self, step: u32) -> Result<Range<u64>> {
        Ok(self.entry(step)?.record_range())
    }

    /// Decode one timestep; unwritten steps yield empty fields
    pub fn read_step(&self, step: u32) -> Result<StepRecord> {
        let entry = *self.entry(step)?;

        if !entry.written {
            return Ok(StepRecord {
                step,
                entry,
                fields: self
                    .manifest
                    .fields()
                    .iter()
                    .map(|f| FieldData::empty(f.dtype))
                    .collect(),
            });
        }

        let range = region(&self.mmap, entry.chunk_offset, entry.chunk_len, "chunk")?;
        let (chunk, fields) = decode_chunk(&self.manifest, &self.mmap[range])?;

        if chunk.step != step
            || chunk.record_start != entry.record_start
            || chunk.count != entry.particle_count as u64
        {
            return Err(TrajectoryError::Corrupt(format!(
                "chunk for timestep {} disagrees with its step table entry",
                step
            )));
        }

        Ok(StepRecord {
            step,
            entry,
            fields,
        })
    }

    /// A whole record variable, concatenated over written timesteps in
    /// record order
    pub fn read_field(&self, name: &str) -> Result<FieldData> {
        let index = self
            .manifest
            .position(name)
            .ok_or_else(|| TrajectoryError::UnknownField(name.to_string()))?;

        let mut steps: Vec<u32> = (0..self.step_count())
            .filter(|&s| self.entries[s as usize].written)
            .collect();
        steps.sort_by_key(|&s| self.entries[s as usize].record_start);

        let mut data = FieldData::empty(self.manifest.fields()[index].dtype);
        for step in steps {
            let mut record = self.read_step(step)?;
            data.append(record.fields.swap_remove(index))?;
        }
        Ok(data)
    }

    /// Decode every written chunk, checking checksums and offsets
    pub fn verify(&self) -> Result<()> {
        let mut expected_start = 0;
        let mut written: Vec<&StepEntry> = self.entries.iter().filter(|e| e.written).collect();
        written.sort_by_key(|e| e.record_start);

        for entry in written {
            if entry.record_start != expected_start {
                return Err(TrajectoryError::Corrupt(format!(
                    "record offsets jump from {} to {}",
                    expected_start, entry.record_start
                )));
            }
            expected_start = entry.record_range().end;
        }

        if expected_start != self.header.record_len {
            return Err(TrajectoryError::Corrupt(format!(
                "header records {} rows but steps cover {}",
                self.header.record_len, expected_start
            )));
        }

        for step in 0..self.step_count() {
            self.read_step(step)?;
        }
        Ok(())
    }

    fn entry(&self, step: u32) -> Result<&StepEntry> {
        self.entries
            .get(step as usize)
            .ok_or(TrajectoryError::StepOutOfRange {
                step,
                step_count: self.header.step_count,
            })
    }
}

/// Bounds-checked byte range inside the mapping
fn region(bytes: &[u8], offset: u64, len: u64, what: &str) -> Result<Range<usize>> {
    let start = offset as usize;
    let end = offset
        .checked_add(len)
        .map(|e| e as usize)
        .filter(|&e| e <= bytes.len() && start >= HEADER_SIZE)
        .ok_or_else(|| TrajectoryError::Corrupt(format!("{} lies outside the file", what)))?;
    Ok(start..end)
}
