//! Schema registry for trajectory output
//!
//! Declares the standard per-particle output fields and derives the
//! "extended" fields from the array descriptors of the active particle
//! sources. The two together form the [`Manifest`] committed to a run.
//!
//! Standard fields are bound to snapshot arrays that do not share their
//! name: `longitude`, `latitude` and `depth` are the three components of
//! `positions`, `status` reads `status_codes` and `id` reads `spill_num`.
//! Extended fields always read the snapshot array of the same name.

use crate::error::{Result, TrajectoryError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default fill value for float32 variables
pub const FILL_F32: f32 = 9.969_209_968_386_869e36;
/// Default fill value for float64 variables
pub const FILL_F64: f64 = 9.969_209_968_386_869e36;
/// Default fill value for int8 variables
pub const FILL_I8: i8 = -127;
/// Default fill value for int32 variables
pub const FILL_I32: i32 = -2_147_483_647;

/// Width of the trailing component axis for vector fields
pub const VECTOR_WIDTH: usize = 3;

/// Source array names whose content is already written by a standard field.
const COVERED_ARRAYS: &[&str] = &[
    "positions",
    "current_time_stamp",
    "status_codes",
    "spill_num",
    "age",
    "mass",
    "flag",
];

/// Names of the per-timestep variables every file carries besides the manifest.
pub const AXIS_VARIABLES: &[&str] = &["time", "particle_count"];

/// Element type of an output variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Float64,
    Int8,
    Int32,
}

impl DataType {
    /// Size of one element in bytes
    pub const fn size(self) -> usize {
        match self {
            DataType::Float32 | DataType::Int32 => 4,
            DataType::Float64 => 8,
            DataType::Int8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int8 => "int8",
            DataType::Int32 => "int32",
        }
    }

    /// Little-endian bytes of this type's fill value
    pub fn fill_bytes(self) -> Vec<u8> {
        match self {
            DataType::Float32 => FILL_F32.to_le_bytes().to_vec(),
            DataType::Float64 => FILL_F64.to_le_bytes().to_vec(),
            DataType::Int8 => FILL_I8.to_le_bytes().to_vec(),
            DataType::Int32 => FILL_I32.to_le_bytes().to_vec(),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-particle shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldShape {
    /// One value per particle, dimensioned `(data)`
    Scalar,
    /// Three values per particle, dimensioned `(data, world_point)`
    Vector3,
}

impl FieldShape {
    /// Map an array shape tuple onto a field shape the ragged format can hold.
    ///
    /// Only `()` and `(3,)` are representable.
    pub fn from_dims(dims: &[usize]) -> Option<Self> {
        match dims {
            [] => Some(FieldShape::Scalar),
            [VECTOR_WIDTH] => Some(FieldShape::Vector3),
            _ => None,
        }
    }

    /// Number of values stored per particle
    pub const fn width(self) -> usize {
        match self {
            FieldShape::Scalar => 1,
            FieldShape::Vector3 => VECTOR_WIDTH,
        }
    }

    /// Dimension names of a variable with this shape
    pub fn dimensions(self) -> Vec<String> {
        match self {
            FieldShape::Scalar => vec!["data".to_string()],
            FieldShape::Vector3 => vec!["data".to_string(), "world_point".to_string()],
        }
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::IntList(value)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(v) => write!(f, "{:?}", v),
            AttrValue::IntList(v) => write!(f, "{:?}", v),
            AttrValue::FloatList(v) => write!(f, "{:?}", v),
        }
    }
}

/// Insertion-ordered attribute mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(Vec::new())
    }

    /// Add or replace an attribute, keeping the original position on replace
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a field's values come from in a timestep snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBinding {
    /// The whole snapshot array with this name
    Array(String),
    /// One component of a 3-wide snapshot array
    Component { array: String, index: usize },
}

impl FieldBinding {
    /// Name of the snapshot array read by this binding
    pub fn array_name(&self) -> &str {
        match self {
            FieldBinding::Array(name) => name,
            FieldBinding::Component { array, .. } => array,
        }
    }
}

/// Whether a field belongs to the always-present set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrigin {
    Standard,
    Extended,
}

/// Description of one persisted per-particle field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub dtype: DataType,
    pub shape: FieldShape,
    pub attributes: Attributes,
    pub binding: FieldBinding,
    pub origin: FieldOrigin,
}

impl FieldDescriptor {
    /// A standard scalar field reading the snapshot array of the same name
    pub fn standard(name: &str, dtype: DataType, attributes: Attributes) -> Self {
        FieldDescriptor {
            name: name.to_string(),
            dtype,
            shape: FieldShape::Scalar,
            attributes,
            binding: FieldBinding::Array(name.to_string()),
            origin: FieldOrigin::Standard,
        }
    }

    /// Override the snapshot binding
    pub fn bound_to(mut self, binding: FieldBinding) -> Self {
        self.binding = binding;
        self
    }

    /// Values per particle
    pub fn width(&self) -> usize {
        self.shape.width()
    }
}

/// Array declaration exposed by a particle source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub dtype: DataType,
    /// Shape of one particle's value: `[]` for scalars, `[3]` for vectors
    pub shape: Vec<usize>,
}

impl SourceDescriptor {
    pub fn scalar(name: impl Into<String>, dtype: DataType) -> Self {
        SourceDescriptor {
            name: name.into(),
            dtype,
            shape: Vec::new(),
        }
    }

    pub fn vector(name: impl Into<String>, dtype: DataType, width: usize) -> Self {
        SourceDescriptor {
            name: name.into(),
            dtype,
            shape: vec![width],
        }
    }
}

/// Ordered set of field descriptors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    fields: Vec<FieldDescriptor>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest { fields: Vec::new() }
    }

    /// Append a field. Names must be unique within a manifest.
    pub fn push(&mut self, field: FieldDescriptor) -> Result<()> {
        if self.contains(&field.name) {
            return Err(TrajectoryError::SchemaError(format!(
                "duplicate field '{}'",
                field.name
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Append every field of `other`, rejecting name collisions
    pub fn extend(&mut self, other: Manifest) -> Result<()> {
        for field in other.fields {
            self.push(field)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn extended(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.origin == FieldOrigin::Extended)
    }

    pub fn has_vector_fields(&self) -> bool {
        self.fields.iter().any(|f| f.shape == FieldShape::Vector3)
    }

    /// Bytes one particle occupies across all fields
    pub fn particle_stride(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.dtype.size() * f.width())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Schema registry
///
/// Owns the standard manifest and the list of source array names it
/// already covers. Constructed explicitly and handed to the planner.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    standard: Manifest,
    covered: HashSet<String>,
}

impl SchemaRegistry {
    /// Registry with the standard particle trajectory fields
    pub fn new() -> Self {
        let standard = standard_manifest();
        let mut covered: HashSet<String> = COVERED_ARRAYS
            .iter()
            .chain(AXIS_VARIABLES)
            .map(|s| s.to_string())
            .collect();
        covered.extend(standard.names().map(str::to_string));
        SchemaRegistry { standard, covered }
    }

    /// Registry over a caller-supplied standard manifest
    ///
    /// `covered` lists snapshot arrays that the standard fields already write.
    /// The time-axis variable names are always reserved.
    pub fn with_standard(standard: Manifest, covered: &[&str]) -> Self {
        let mut set: HashSet<String> = covered
            .iter()
            .chain(AXIS_VARIABLES)
            .map(|s| s.to_string())
            .collect();
        set.extend(standard.names().map(str::to_string));
        SchemaRegistry {
            standard,
            covered: set,
        }
    }

    /// The fixed, ordered set of always-present fields
    pub fn standard_fields(&self) -> Manifest {
        self.standard.clone()
    }

    /// True if a source array with this name is already written as standard data
    pub fn is_covered(&self, name: &str) -> bool {
        self.covered.contains(name)
    }

    /// Derive extended fields from particle source descriptors
    ///
    /// Descriptors are unioned by name in the order given; the first
    /// declaration of a name wins. Names covered by standard data, and the
    /// `time` and `particle_count` axis variables, are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if a descriptor is neither scalar nor 3-wide.
    pub fn derive_extended_fields(&self, sources: &[SourceDescriptor]) -> Result<Manifest> {
        let mut extended = Manifest::new();

        for source in sources {
            if self.is_covered(&source.name) || extended.contains(&source.name) {
                continue;
            }

            let shape = FieldShape::from_dims(&source.shape).ok_or_else(|| {
                TrajectoryError::SchemaError(format!(
                    "'{}' has an undefined dimension: {:?}",
                    source.name, source.shape
                ))
            })?;

            extended.push(FieldDescriptor {
                name: source.name.clone(),
                dtype: source.dtype,
                shape,
                attributes: Attributes::new(),
                binding: FieldBinding::Array(source.name.clone()),
                origin: FieldOrigin::Extended,
            })?;
        }

        Ok(extended)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard trajectory fields, in file order
pub fn standard_manifest() -> Manifest {
    let position = |index: usize| FieldBinding::Component {
        array: "positions".to_string(),
        index,
    };

    let fields = vec![
        FieldDescriptor::standard(
            "longitude",
            DataType::Float32,
            Attributes::new()
                .with("long_name", "longitude of the particle")
                .with("units", "degrees_east"),
        )
        .bound_to(position(0)),
        FieldDescriptor::standard(
            "latitude",
            DataType::Float32,
            Attributes::new()
                .with("long_name", "latitude of the particle")
                .with("units", "degrees_north"),
        )
        .bound_to(position(1)),
        FieldDescriptor::standard(
            "depth",
            DataType::Float32,
            Attributes::new()
                .with("long_name", "particle depth below sea surface")
                .with("units", "meters")
                .with("axis", "z positive down"),
        )
        .bound_to(position(2)),
        FieldDescriptor::standard("mass", DataType::Float32, Attributes::new().with("units", "grams")),
        FieldDescriptor::standard(
            "age",
            DataType::Int32,
            Attributes::new()
                .with("long_name", "from age at time of release")
                .with("units", "seconds"),
        ),
        FieldDescriptor::standard(
            "flag",
            DataType::Int8,
            Attributes::new()
                .with("long_name", "particle status flag")
                .with("valid_range", vec![0i64, 5])
                .with("flag_values", vec![1i64, 2, 3, 4])
                .with("flag_meanings", "on_land off_maps evaporated below_surface"),
        ),
        FieldDescriptor::standard(
            "status",
            DataType::Int8,
            Attributes::new()
                .with("long_name", "particle status flag")
                .with("valid_range", vec![0i64, 10])
                .with("flag_values", vec![2i64, 3, 7, 10])
                .with("flag_meanings", "2:in_water 3:on_land 7:off_maps 10:evaporated"),
        )
        .bound_to(FieldBinding::Array("status_codes".to_string())),
        FieldDescriptor::standard(
            "id",
            DataType::Int8,
            Attributes::new()
                .with("long_name", "particle ID")
                .with("units", "1"),
        )
        .bound_to(FieldBinding::Array("spill_num".to_string())),
    ];

    Manifest { fields }
}
