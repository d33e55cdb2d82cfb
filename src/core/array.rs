//! Typed per-particle value arrays
//!
//! [`FieldData`] is the flat, typed buffer used both for snapshot input and
//! for values read back from a trajectory file. Vector fields are stored
//! row-major: particle `i` occupies `[i * 3, i * 3 + 3)`.

use crate::core::schema::{DataType, FieldShape};
use crate::error::{Result, TrajectoryError};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I32(Vec<i32>),
}

impl FieldData {
    /// Empty buffer of the given type
    pub fn empty(dtype: DataType) -> Self {
        match dtype {
            DataType::Float32 => FieldData::F32(Vec::new()),
            DataType::Float64 => FieldData::F64(Vec::new()),
            DataType::Int8 => FieldData::I8(Vec::new()),
            DataType::Int32 => FieldData::I32(Vec::new()),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            FieldData::F32(_) => DataType::Float32,
            FieldData::F64(_) => DataType::Float64,
            FieldData::I8(_) => DataType::Int8,
            FieldData::I32(_) => DataType::Int32,
        }
    }

    /// Number of stored values (not particles)
    pub fn len(&self) -> usize {
        match self {
            FieldData::F32(v) => v.len(),
            FieldData::F64(v) => v.len(),
            FieldData::I8(v) => v.len(),
            FieldData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to f64
    pub fn value_f64(&self, index: usize) -> f64 {
        match self {
            FieldData::F32(v) => v[index] as f64,
            FieldData::F64(v) => v[index],
            FieldData::I8(v) => v[index] as f64,
            FieldData::I32(v) => v[index] as f64,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            FieldData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            FieldData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        match self {
            FieldData::I8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            FieldData::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Append the values at `indices`, cast to `target`, as little-endian bytes
    ///
    /// Same-type writes are bit exact. Cross-type writes follow Rust `as`
    /// casting: values outside an integer target's range saturate to its
    /// bounds, NaN becomes 0, and f64 to f32 rounds to nearest.
    pub fn encode_as(
        &self,
        target: DataType,
        indices: impl Iterator<Item = usize>,
        out: &mut Vec<u8>,
    ) {
        match (self, target) {
            (FieldData::F32(v), DataType::Float32) => {
                indices.for_each(|i| out.extend_from_slice(&v[i].to_le_bytes()))
            }
            (FieldData::F64(v), DataType::Float64) => {
                indices.for_each(|i| out.extend_from_slice(&v[i].to_le_bytes()))
            }
            (FieldData::I8(v), DataType::Int8) => {
                indices.for_each(|i| out.extend_from_slice(&v[i].to_le_bytes()))
            }
            (FieldData::I32(v), DataType::Int32) => {
                indices.for_each(|i| out.extend_from_slice(&v[i].to_le_bytes()))
            }
            (_, DataType::Float32) => indices
                .for_each(|i| out.extend_from_slice(&(self.value_f64(i) as f32).to_le_bytes())),
            (_, DataType::Float64) => {
                indices.for_each(|i| out.extend_from_slice(&self.value_f64(i).to_le_bytes()))
            }
            (_, DataType::Int8) => indices
                .for_each(|i| out.extend_from_slice(&(self.value_f64(i) as i8).to_le_bytes())),
            (_, DataType::Int32) => indices
                .for_each(|i| out.extend_from_slice(&(self.value_f64(i) as i32).to_le_bytes())),
        }
    }

    /// Decode little-endian bytes of `dtype`
    pub fn decode(dtype: DataType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.size() != 0 {
            return Err(TrajectoryError::Corrupt(format!(
                "{} bytes is not a whole number of {} values",
                bytes.len(),
                dtype
            )));
        }

        let data = match dtype {
            DataType::Float32 => FieldData::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Float64 => FieldData::F64(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(c);
                        f64::from_le_bytes(b)
                    })
                    .collect(),
            ),
            DataType::Int8 => FieldData::I8(bytes.iter().map(|&b| b as i8).collect()),
            DataType::Int32 => FieldData::I32(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        };

        Ok(data)
    }

    /// Append `other`; both must share a type
    pub fn append(&mut self, other: FieldData) -> Result<()> {
        match (self, other) {
            (FieldData::F32(a), FieldData::F32(b)) => a.extend(b),
            (FieldData::F64(a), FieldData::F64(b)) => a.extend(b),
            (FieldData::I8(a), FieldData::I8(b)) => a.extend(b),
            (FieldData::I32(a), FieldData::I32(b)) => a.extend(b),
            (a, b) => {
                return Err(TrajectoryError::SchemaError(format!(
                    "cannot append {} values to a {} array",
                    b.dtype(),
                    a.dtype()
                )))
            }
        }
        Ok(())
    }
}

impl From<Vec<f32>> for FieldData {
    fn from(v: Vec<f32>) -> Self {
        FieldData::F32(v)
    }
}

impl From<Vec<f64>> for FieldData {
    fn from(v: Vec<f64>) -> Self {
        FieldData::F64(v)
    }
}

impl From<Vec<i8>> for FieldData {
    fn from(v: Vec<i8>) -> Self {
        FieldData::I8(v)
    }
}

impl From<Vec<i32>> for FieldData {
    fn from(v: Vec<i32>) -> Self {
        FieldData::I32(v)
    }
}

/// A snapshot array: typed values plus per-particle shape
///
/// Values are cast to the output field's declared type when written. A
/// narrowing integer cast saturates rather than failing, so a `spill_num`
/// of 200 lands in the int8 `id` field as 127. Supply arrays already in the
/// field's type when exact values matter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleArray {
    pub shape: FieldShape,
    pub data: FieldData,
}

impl ParticleArray {
    pub fn scalar(data: impl Into<FieldData>) -> Self {
        ParticleArray {
            shape: FieldShape::Scalar,
            data: data.into(),
        }
    }

    /// Flat row-major triplets
    pub fn vector(data: impl Into<FieldData>) -> Self {
        ParticleArray {
            shape: FieldShape::Vector3,
            data: data.into(),
        }
    }

    /// Number of particles held, or `None` if the buffer is not a whole
    /// number of rows
    pub fn particle_count(&self) -> Option<usize> {
        let width = self.shape.width();
        let len = self.data.len();
        (len % width == 0).then_some(len / width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_same_type_is_exact() {
        let data = FieldData::F64(vec![1.0e-12, -3.5, 7.25]);
        let mut out = Vec::new();
        data.encode_as(DataType::Float64, 0..3, &mut out);
        assert_eq!(FieldData::decode(DataType::Float64, &out).unwrap(), data);
    }

    #[test]
    fn test_encode_casts_to_target() {
        let data = FieldData::F64(vec![1.5, 2.25, -4.0]);
        let mut out = Vec::new();
        data.encode_as(DataType::Float32, [2, 0].into_iter(), &mut out);
        assert_eq!(
            FieldData::decode(DataType::Float32, &out).unwrap(),
            FieldData::F32(vec![-4.0, 1.5])
        );

        let codes = FieldData::I32(vec![2, 3, 10]);
        let mut out = Vec::new();
        codes.encode_as(DataType::Int8, 0..3, &mut out);
        assert_eq!(out, vec![2u8, 3, 10]);
    }

    #[test]
    fn test_narrowing_casts_saturate() {
        let spill = FieldData::I32(vec![200, -300, 5]);
        let mut out = Vec::new();
        spill.encode_as(DataType::Int8, 0..3, &mut out);
        assert_eq!(
            FieldData::decode(DataType::Int8, &out).unwrap(),
            FieldData::I8(vec![127, -128, 5])
        );

        let age = FieldData::F64(vec![f64::NAN, 1.0e12, 3.9]);
        let mut out = Vec::new();
        age.encode_as(DataType::Int32, 0..3, &mut out);
        assert_eq!(
            FieldData::decode(DataType::Int32, &out).unwrap(),
            FieldData::I32(vec![0, i32::MAX, 3])
        );
    }

    #[test]
    fn test_decode_rejects_partial_values() {
        assert!(FieldData::decode(DataType::Int32, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_particle_count() {
        assert_eq!(ParticleArray::vector(vec![0.0f64; 9]).particle_count(), Some(3));
        assert_eq!(ParticleArray::vector(vec![0.0f64; 8]).particle_count(), None);
        assert_eq!(ParticleArray::scalar(vec![1i8, 2]).particle_count(), Some(2));
    }

    #[test]
    fn test_append_type_mismatch() {
        let mut a = FieldData::F32(vec![1.0]);
        assert!(a.append(FieldData::I8(vec![1])).is_err());
        a.append(FieldData::F32(vec![2.0])).unwrap();
        assert_eq!(a, FieldData::F32(vec![1.0, 2.0]));
    }
}
