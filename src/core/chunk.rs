//! Timestep chunk encoding
//!
//! A chunk holds one timestep's slice of every record variable:
//!
//! ```text
//! [magic "STEP"][step: u32][record_start: u64][count: u64][codec: u8]
//! [raw_len: u64][stored_len: u64][crc32: u32][payload: stored_len bytes]
//! ```
//!
//! The raw payload is the concatenation, in manifest order, of each field's
//! `count * width` little-endian values. Fields the snapshot does not
//! supply are written as the type's fill value. The CRC covers the stored
//! (possibly compressed) payload.

use crate::core::array::FieldData;
use crate::core::compression::{compress_if_beneficial, decompress, CompressionConfig, CompressionMethod};
use crate::core::header::{read_u32, read_u64};
use crate::core::schema::{FieldBinding, FieldDescriptor, FieldShape, Manifest, VECTOR_WIDTH};
use crate::core::snapshot::ParticleSnapshot;
use crate::error::{Result, TrajectoryError};

pub const CHUNK_MAGIC: [u8; 4] = *b"STEP";
pub const CHUNK_HEADER_SIZE: usize = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub step: u32,
    pub record_start: u64,
    pub count: u64,
    pub codec: CompressionMethod,
    pub raw_len: u64,
    pub stored_len: u64,
    pub crc32: u32,
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(CHUNK_HEADER_SIZE);
        bytes.extend_from_slice(&CHUNK_MAGIC);
        bytes.extend_from_slice(&self.step.to_le_bytes());
        bytes.extend_from_slice(&self.record_start.to_le_bytes());
        bytes.extend_from_slice(&self.count.to_le_bytes());
        bytes.push(self.codec as u8);
        bytes.extend_from_slice(&self.raw_len.to_le_bytes());
        bytes.extend_from_slice(&self.stored_len.to_le_bytes());
        bytes.extend_from_slice(&self.crc32.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(TrajectoryError::Corrupt("truncated chunk header".to_string()));
        }
        if bytes[0..4] != CHUNK_MAGIC {
            return Err(TrajectoryError::Corrupt("bad chunk magic".to_string()));
        }

        let codec = CompressionMethod::from_u8(bytes[24])
            .ok_or_else(|| TrajectoryError::Corrupt(format!("unknown codec tag {}", bytes[24])))?;

        Ok(ChunkHeader {
            step: read_u32(bytes, 4),
            record_start: read_u64(bytes, 8),
            count: read_u64(bytes, 16),
            codec,
            raw_len: read_u64(bytes, 25),
            stored_len: read_u64(bytes, 33),
            crc32: read_u32(bytes, 41),
        })
    }
}

/// Encode one snapshot into chunk bytes (header + payload)
///
/// # Errors
///
/// - `UnsupportedFieldShape` if a bound snapshot array has the wrong shape
/// - `ParticleCountMismatch` if a bound array does not hold `count` particles
pub fn encode_chunk(
    manifest: &Manifest,
    step: u32,
    record_start: u64,
    snapshot: &ParticleSnapshot,
    compression: &CompressionConfig,
) -> Result<Vec<u8>> {
    let count = snapshot.particle_count();
    let mut payload = Vec::with_capacity(count * manifest.particle_stride());

    for field in manifest.fields() {
        encode_field(field, snapshot, count, &mut payload)?;
    }

    let (stored, codec) = compress_if_beneficial(&payload, compression)?;

    let header = ChunkHeader {
        step,
        record_start,
        count: count as u64,
        codec,
        raw_len: payload.len() as u64,
        stored_len: stored.len() as u64,
        crc32: crc32fast::hash(&stored),
    };

    let mut bytes = header.to_bytes();
    bytes.extend_from_slice(&stored);
    Ok(bytes)
}

fn encode_field(
    field: &FieldDescriptor,
    snapshot: &ParticleSnapshot,
    count: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let width = field.width();

    let array = match snapshot.get(field.binding.array_name()) {
        Some(array) => array,
        None => {
            // absent arrays are left at the fill value
            let fill = field.dtype.fill_bytes();
            for _ in 0..count * width {
                out.extend_from_slice(&fill);
            }
            return Ok(());
        }
    };

    match &field.binding {
        FieldBinding::Array(_) => {
            if array.shape != field.shape {
                return Err(shape_error(field, array.shape));
            }
            check_len(field, &array.data, count * width)?;
            array.data.encode_as(field.dtype, 0..count * width, out);
        }
        FieldBinding::Component { index, .. } => {
            if array.shape != FieldShape::Vector3 || field.shape != FieldShape::Scalar {
                return Err(shape_error(field, array.shape));
            }
            if *index >= VECTOR_WIDTH {
                return Err(TrajectoryError::SchemaError(format!(
                    "field '{}' binds component {} of a {}-wide array",
                    field.name, index, VECTOR_WIDTH
                )));
            }
            check_len(field, &array.data, count * VECTOR_WIDTH)?;
            let index = *index;
            array
                .data
                .encode_as(field.dtype, (0..count).map(|i| i * VECTOR_WIDTH + index), out);
        }
    }

    Ok(())
}

fn check_len(field: &FieldDescriptor, data: &FieldData, expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(TrajectoryError::ParticleCountMismatch {
            field: field.name.clone(),
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

fn shape_error(field: &FieldDescriptor, found: FieldShape) -> TrajectoryError {
    TrajectoryError::UnsupportedFieldShape {
        field: field.name.clone(),
        detail: format!(
            "snapshot array '{}' is {:?}, field expects {:?}",
            field.binding.array_name(),
            found,
            field.shape
        ),
    }
}

/// Decode chunk bytes into one [`FieldData`] per manifest field
pub fn decode_chunk(manifest: &Manifest, bytes: &[u8]) -> Result<(ChunkHeader, Vec<FieldData>)> {
    let header = ChunkHeader::from_bytes(bytes)?;
    let end = usize::try_from(header.stored_len)
        .ok()
        .and_then(|len| CHUNK_HEADER_SIZE.checked_add(len))
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            TrajectoryError::Corrupt(format!("chunk for timestep {} is truncated", header.step))
        })?;

    let count = usize::try_from(header.count).map_err(|_| {
        TrajectoryError::Corrupt(format!("chunk for timestep {} has a bad count", header.step))
    })?;
    // header fields are not covered by the CRC
    let expected = count
        .checked_mul(manifest.particle_stride())
        .filter(|&expected| header.raw_len == expected as u64)
        .ok_or_else(|| {
            TrajectoryError::Corrupt(format!(
                "chunk for timestep {} declares {} raw bytes for {} particles",
                header.step, header.raw_len, header.count
            ))
        })?;

    let stored = &bytes[CHUNK_HEADER_SIZE..end];
    if crc32fast::hash(stored) != header.crc32 {
        return Err(TrajectoryError::ChecksumMismatch(header.step));
    }

    let payload = decompress(stored, header.codec, expected)?;
    if payload.len() != expected {
        return Err(TrajectoryError::Corrupt(format!(
            "chunk for timestep {} holds {} bytes, manifest needs {}",
            header.step,
            payload.len(),
            expected
        )));
    }

    let mut fields = Vec::with_capacity(manifest.len());
    let mut offset = 0;
    for field in manifest.fields() {
        let len = count * field.width() * field.dtype.size();
        fields.push(FieldData::decode(field.dtype, &payload[offset..offset + len])?);
        offset += len;
    }

    Ok((header, fields))
}
