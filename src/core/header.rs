use crate::core::compression::CompressionMethod;
use crate::core::config::OutputFormat;
use crate::core::schema::VECTOR_WIDTH;
use crate::error::{Result, TrajectoryError};

pub const MAGIC: [u8; 8] = *b"PTRJ\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 256;

/// Size of one step table entry in bytes
pub const STEP_ENTRY_SIZE: usize = 40;

/// Trajectory file header
///
/// The header occupies the first 256 bytes and locates the three regions
/// that follow it: the JSON schema block, the fixed step table (one entry
/// per time slot) and the append-only chunk area. `record_len` and
/// `steps_written` are the only fields that change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: "PTRJ\x00\x01\x00\x00"
    pub magic: [u8; 8],

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    pub format: OutputFormat,

    /// Codec requested at creation; individual chunks may still be raw
    pub codec: CompressionMethod,

    /// Length of the component axis (always 3)
    pub vector_width: u16,

    /// Length of the time axis
    pub step_count: u32,

    pub schema_offset: u64,
    pub schema_len: u64,
    pub table_offset: u64,

    /// Offset of the first chunk
    pub data_offset: u64,

    /// Current length of the record (`data`) dimension
    pub record_len: u64,

    /// Number of timesteps written so far
    pub steps_written: u32,
}

impl Header {
    /// Create a header for a file with `step_count` time slots and a
    /// schema block of `schema_len` bytes
    pub fn new(
        format: OutputFormat,
        codec: CompressionMethod,
        step_count: u32,
        schema_len: u64,
    ) -> Self {
        let schema_offset = HEADER_SIZE as u64;
        let table_offset = schema_offset + schema_len;
        let data_offset = table_offset + step_count as u64 * STEP_ENTRY_SIZE as u64;

        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            format,
            codec,
            vector_width: VECTOR_WIDTH as u16,
            step_count,
            schema_offset,
            schema_len,
            table_offset,
            data_offset,
            record_len: 0,
            steps_written: 0,
        }
    }

    /// Validate the header magic, version and region layout
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(TrajectoryError::InvalidMagic);
        }

        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(TrajectoryError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.vector_width as usize != VECTOR_WIDTH {
            return Err(TrajectoryError::Corrupt(format!(
                "vector width {} (expected {})",
                self.vector_width, VECTOR_WIDTH
            )));
        }

        let expected_table = self.schema_offset + self.schema_len;
        let expected_data = expected_table + self.step_count as u64 * STEP_ENTRY_SIZE as u64;
        if self.schema_offset != HEADER_SIZE as u64
            || self.table_offset != expected_table
            || self.data_offset != expected_data
        {
            return Err(TrajectoryError::Corrupt(
                "header region offsets are inconsistent".to_string(),
            ));
        }

        if self.steps_written > self.step_count {
            return Err(TrajectoryError::Corrupt(format!(
                "steps written ({}) exceeds time axis length ({})",
                self.steps_written, self.step_count
            )));
        }

        Ok(())
    }

    /// File offset of the step table entry for `step`
    pub fn entry_offset(&self, step: u32) -> u64 {
        self.table_offset + step as u64 * STEP_ENTRY_SIZE as u64
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.push(self.format as u8);
        bytes.push(self.codec as u8);
        bytes.extend_from_slice(&self.vector_width.to_le_bytes());
        bytes.extend_from_slice(&self.step_count.to_le_bytes());
        bytes.extend_from_slice(&self.schema_offset.to_le_bytes());
        bytes.extend_from_slice(&self.schema_len.to_le_bytes());
        bytes.extend_from_slice(&self.table_offset.to_le_bytes());
        bytes.extend_from_slice(&self.data_offset.to_le_bytes());
        bytes.extend_from_slice(&self.record_len.to_le_bytes());
        bytes.extend_from_slice(&self.steps_written.to_le_bytes());

        // Pad to HEADER_SIZE
        bytes.resize(HEADER_SIZE, 0);

        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TrajectoryError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        if magic != MAGIC {
            return Err(TrajectoryError::InvalidMagic);
        }

        let format = OutputFormat::from_u8(bytes[12])
            .ok_or_else(|| TrajectoryError::Corrupt(format!("unknown format tag {}", bytes[12])))?;
        let codec = CompressionMethod::from_u8(bytes[13])
            .ok_or_else(|| TrajectoryError::Corrupt(format!("unknown codec tag {}", bytes[13])))?;

        let header = Header {
            magic,
            version_major: read_u16(bytes, 8),
            version_minor: read_u16(bytes, 10),
            format,
            codec,
            vector_width: read_u16(bytes, 14),
            step_count: read_u32(bytes, 16),
            schema_offset: read_u64(bytes, 20),
            schema_len: read_u64(bytes, 28),
            table_offset: read_u64(bytes, 36),
            data_offset: read_u64(bytes, 44),
            record_len: read_u64(bytes, 52),
            steps_written: read_u32(bytes, 60),
        };

        header.validate()?;
        Ok(header)
    }
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header::new(OutputFormat::Enhanced, CompressionMethod::Lz4, 24, 1000);
        assert_eq!(header.schema_offset, 256);
        assert_eq!(header.table_offset, 1256);
        assert_eq!(header.data_offset, 1256 + 24 * 40);
        assert_eq!(header.entry_offset(2), 1256 + 80);
        header.validate().unwrap();
    }

    #[test]
    fn test_header_serialization() {
        let mut header = Header::new(OutputFormat::Classic, CompressionMethod::None, 3, 512);
        header.record_len = 7;
        header.steps_written = 3;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let parsed = Header::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = Header::new(OutputFormat::Enhanced, CompressionMethod::Lz4, 1, 10).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(TrajectoryError::InvalidMagic)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut header = Header::new(OutputFormat::Enhanced, CompressionMethod::Lz4, 1, 10);
        header.version_major = 9;
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(TrajectoryError::UnsupportedVersion { major: 9, .. })
        ));
    }

    #[test]
    fn test_steps_written_bounded() {
        let mut header = Header::new(OutputFormat::Enhanced, CompressionMethod::Lz4, 2, 10);
        header.steps_written = 3;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_truncated_header() {
        assert!(Header::from_bytes(&[0u8; 16]).is_err());
    }
}
