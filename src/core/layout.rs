//! Layout planning for a trajectory run
//!
//! The planner runs once at run start. It fixes the time axis length and
//! the component axis, commits the field manifest and produces the
//! self-describing [`FileSchema`] written into every destination.

use crate::core::schema::{
    AttrValue, Attributes, DataType, FieldDescriptor, FieldOrigin, FieldShape, Manifest,
    SchemaRegistry, SourceDescriptor, VECTOR_WIDTH,
};
use crate::error::{Result, TrajectoryError};
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Format of timestamps inside `units` and `creation_date`
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const TIME_UNITS_PREFIX: &str = "seconds since ";

/// Inputs to [`LayoutPlanner::plan`]
#[derive(Debug, Clone, Default)]
pub struct RunParameters {
    /// Model start time; the time axis origin
    pub start_time: Option<NaiveDateTime>,

    /// Total number of timesteps in the run
    pub step_count: Option<u32>,

    /// Track the uncertain population in a second destination
    pub uncertain: bool,

    /// Array descriptors of every active particle source
    pub sources: Option<Vec<SourceDescriptor>>,
}

impl RunParameters {
    pub fn new(start_time: NaiveDateTime, step_count: u32) -> Self {
        RunParameters {
            start_time: Some(start_time),
            step_count: Some(step_count),
            uncertain: false,
            sources: None,
        }
    }

    pub fn with_uncertain(mut self, uncertain: bool) -> Self {
        self.uncertain = uncertain;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceDescriptor>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// Committed, immutable shape of one run's output
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    start_time: NaiveDateTime,
    step_count: u32,
    uncertain: bool,
    manifest: Manifest,
}

impl RunLayout {
    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    /// Length of the time axis
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn vector_width(&self) -> usize {
        VECTOR_WIDTH
    }

    pub fn uncertain(&self) -> bool {
        self.uncertain
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// `units` attribute of the time variable
    pub fn time_units(&self) -> String {
        format!(
            "{}{}",
            TIME_UNITS_PREFIX,
            self.start_time.format(TIME_FORMAT)
        )
    }

    /// Seconds elapsed since the time origin
    pub fn elapsed_seconds(&self, timestamp: NaiveDateTime) -> f64 {
        seconds_between(self.start_time, timestamp)
    }

    /// Build the schema block for this layout
    pub fn file_schema(&self, globals: &GlobalAttributes, created: NaiveDateTime) -> FileSchema {
        let dimensions = vec![
            Dimension::fixed("time", self.step_count as u64),
            Dimension::unlimited("data"),
            Dimension::fixed("world_point", VECTOR_WIDTH as u64),
        ];

        let mut variables = vec![
            VariableSchema {
                name: "time".to_string(),
                dtype: DataType::Float64,
                dimensions: vec!["time".to_string()],
                attributes: Attributes::new()
                    .with("units", self.time_units())
                    .with("long_name", "time")
                    .with("standard_name", "time")
                    .with("calendar", "gregorian")
                    .with("comment", "unspecified time zone"),
                origin: None,
            },
            VariableSchema {
                name: "particle_count".to_string(),
                dtype: DataType::Int32,
                dimensions: vec!["time".to_string()],
                attributes: Attributes::new()
                    .with("units", "1")
                    .with("long_name", "number of particles in a given timestep")
                    .with("ragged_row_count", "particle count at nth timestep"),
                origin: None,
            },
        ];
        variables.extend(self.manifest.fields().iter().map(VariableSchema::from_field));

        FileSchema {
            global_attributes: globals.to_attributes(created),
            dimensions,
            variables,
        }
    }
}

/// Seconds from `origin` to `timestamp`, microsecond resolution
pub fn seconds_between(origin: NaiveDateTime, timestamp: NaiveDateTime) -> f64 {
    let delta = timestamp.signed_duration_since(origin);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Inverse of [`seconds_between`]
pub fn timestamp_after(origin: NaiveDateTime, seconds: f64) -> NaiveDateTime {
    origin + TimeDelta::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// Global descriptive metadata written into every destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAttributes {
    pub comment: String,
    pub source: String,
    pub references: String,
    pub feature_type: String,
    pub institution: String,
    pub conventions: String,
}

impl Default for GlobalAttributes {
    fn default() -> Self {
        GlobalAttributes {
            comment: "Particle trajectory output".to_string(),
            source: format!("trajectory-rs version {}", env!("CARGO_PKG_VERSION")),
            references: "TBD".to_string(),
            feature_type: "particle_trajectory".to_string(),
            institution: "unspecified".to_string(),
            conventions: "CF-1.6".to_string(),
        }
    }
}

impl GlobalAttributes {
    pub fn to_attributes(&self, created: NaiveDateTime) -> Attributes {
        Attributes::new()
            .with("comment", self.comment.as_str())
            .with("creation_date", created.format("%Y-%m-%d %H:%M:%S").to_string())
            .with("source", self.source.as_str())
            .with("references", self.references.as_str())
            .with("feature_type", self.feature_type.as_str())
            .with("institution", self.institution.as_str())
            .with("conventions", self.conventions.as_str())
    }
}

/// A named axis; `length: None` marks the growable record axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub length: Option<u64>,
}

impl Dimension {
    pub fn fixed(name: &str, length: u64) -> Self {
        Dimension {
            name: name.to_string(),
            length: Some(length),
        }
    }

    pub fn unlimited(name: &str) -> Self {
        Dimension {
            name: name.to_string(),
            length: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.length.is_none()
    }
}

/// One variable as declared in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSchema {
    pub name: String,
    pub dtype: DataType,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<FieldOrigin>,
}

impl VariableSchema {
    fn from_field(field: &FieldDescriptor) -> Self {
        VariableSchema {
            name: field.name.clone(),
            dtype: field.dtype,
            dimensions: field.shape.dimensions(),
            attributes: field.attributes.clone(),
            origin: Some(field.origin),
        }
    }

    /// True for variables on the record (`data`) axis
    pub fn is_record_variable(&self) -> bool {
        self.dimensions.first().map(String::as_str) == Some("data")
    }
}

/// Schema block stored after the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSchema {
    pub global_attributes: Attributes,
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<VariableSchema>,
}

impl FileSchema {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSchema> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Rebuild the field manifest (record variables in declaration order)
    pub fn manifest(&self) -> Result<Manifest> {
        let mut manifest = Manifest::new();
        for var in self.variables.iter().filter(|v| v.is_record_variable()) {
            let shape = match var.dimensions.len() {
                1 => FieldShape::Scalar,
                2 if var.dimensions[1] == "world_point" => FieldShape::Vector3,
                _ => {
                    return Err(TrajectoryError::SchemaError(format!(
                        "variable '{}' has unsupported dimensions {:?}",
                        var.name, var.dimensions
                    )))
                }
            };
            manifest.push(FieldDescriptor {
                name: var.name.clone(),
                dtype: var.dtype,
                shape,
                attributes: var.attributes.clone(),
                binding: crate::core::schema::FieldBinding::Array(var.name.clone()),
                origin: var.origin.unwrap_or(FieldOrigin::Extended),
            })?;
        }
        Ok(manifest)
    }

    /// Time origin parsed back from the time variable's `units`
    pub fn time_origin(&self) -> Result<NaiveDateTime> {
        let units = match self.variable("time").and_then(|v| v.attributes.get("units")) {
            Some(AttrValue::Text(units)) => units,
            _ => {
                return Err(TrajectoryError::SchemaError(
                    "time variable has no units".to_string(),
                ))
            }
        };

        let origin = units.strip_prefix(TIME_UNITS_PREFIX).ok_or_else(|| {
            TrajectoryError::SchemaError(format!("unrecognized time units '{}'", units))
        })?;

        NaiveDateTime::parse_from_str(origin, TIME_FORMAT).map_err(|e| {
            TrajectoryError::SchemaError(format!("bad time origin '{}': {}", origin, e))
        })
    }
}

/// Layout planner
///
/// Holds the schema registry the run's manifest is derived from.
#[derive(Debug, Clone, Default)]
pub struct LayoutPlanner {
    registry: SchemaRegistry,
}

impl LayoutPlanner {
    pub fn new(registry: SchemaRegistry) -> Self {
        LayoutPlanner { registry }
    }

    /// Compute the layout of a run
    ///
    /// # Errors
    ///
    /// - `MissingParameter` if the start time or step count is absent
    /// - `Config` if the step count is zero
    /// - `MissingSources` if `extended` is requested without source descriptors
    /// - `SchemaError` if a source array cannot be expressed in the ragged format
    pub fn plan(&self, params: &RunParameters, extended: bool) -> Result<RunLayout> {
        let start_time = params
            .start_time
            .ok_or(TrajectoryError::MissingParameter("start_time"))?;
        let step_count = params
            .step_count
            .ok_or(TrajectoryError::MissingParameter("step_count"))?;

        if step_count == 0 {
            return Err(TrajectoryError::Config(
                "step_count must be positive".to_string(),
            ));
        }

        let mut manifest = self.registry.standard_fields();
        if extended {
            let sources = params.sources.as_ref().ok_or(TrajectoryError::MissingSources)?;
            manifest.extend(self.registry.derive_extended_fields(sources)?)?;
        }

        Ok(RunLayout {
            start_time,
            step_count,
            uncertain: params.uncertain,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 2, 13)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_plan_standard_only() {
        let planner = LayoutPlanner::default();
        let layout = planner.plan(&RunParameters::new(t0(), 3), false).unwrap();

        assert_eq!(layout.step_count(), 3);
        assert_eq!(layout.vector_width(), 3);
        assert_eq!(layout.manifest().len(), 8);
        assert!(layout.manifest().extended().next().is_none());
        assert!(!layout.uncertain());
    }

    #[test]
    fn test_plan_missing_parameters() {
        let planner = LayoutPlanner::default();

        let params = RunParameters {
            step_count: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            planner.plan(&params, false),
            Err(TrajectoryError::MissingParameter("start_time"))
        ));

        let params = RunParameters {
            start_time: Some(t0()),
            ..Default::default()
        };
        assert!(matches!(
            planner.plan(&params, false),
            Err(TrajectoryError::MissingParameter("step_count"))
        ));
    }

    #[test]
    fn test_plan_extended_requires_sources() {
        let planner = LayoutPlanner::default();
        let err = planner.plan(&RunParameters::new(t0(), 3), true).unwrap_err();
        assert!(matches!(err, TrajectoryError::MissingSources));
    }

    #[test]
    fn test_plan_extended_appends_after_standard() {
        let planner = LayoutPlanner::default();
        let params = RunParameters::new(t0(), 5).with_sources(vec![
            SourceDescriptor::vector("windages", DataType::Float64, 3),
            SourceDescriptor::scalar("status_codes", DataType::Int8),
        ]);
        let layout = planner.plan(&params, true).unwrap();
        let names: Vec<_> = layout.manifest().names().collect();
        assert_eq!(names.last(), Some(&"windages"));
        assert_eq!(layout.manifest().len(), 9);
    }

    #[test]
    fn test_sources_ignored_without_extended() {
        let planner = LayoutPlanner::default();
        let params = RunParameters::new(t0(), 5)
            .with_sources(vec![SourceDescriptor::scalar("density", DataType::Float32)]);
        let layout = planner.plan(&params, false).unwrap();
        assert!(!layout.manifest().contains("density"));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let planner = LayoutPlanner::default();
        assert!(planner.plan(&RunParameters::new(t0(), 0), false).is_err());
    }

    #[test]
    fn test_time_units_and_elapsed() {
        let layout = LayoutPlanner::default()
            .plan(&RunParameters::new(t0(), 2), false)
            .unwrap();
        assert_eq!(layout.time_units(), "seconds since 2013-02-13 09:00:00");

        let later = t0() + TimeDelta::minutes(15);
        assert_eq!(layout.elapsed_seconds(later), 900.0);
        assert_eq!(timestamp_after(t0(), 900.0), later);
    }

    #[test]
    fn test_file_schema_dimensions() {
        let planner = LayoutPlanner::default();
        let standard = planner.plan(&RunParameters::new(t0(), 4), false).unwrap();
        let schema = standard.file_schema(&GlobalAttributes::default(), t0());

        assert_eq!(schema.dimensions.len(), 3);
        assert_eq!(schema.dimensions[0], Dimension::fixed("time", 4));
        assert!(schema.dimensions[1].is_unlimited());
        assert_eq!(schema.dimensions[2], Dimension::fixed("world_point", 3));
        assert_eq!(schema.variables[0].name, "time");
        assert_eq!(schema.variables[1].name, "particle_count");
        assert_eq!(schema.time_origin().unwrap(), t0());
        assert_eq!(schema.manifest().unwrap().len(), 8);

        let params = RunParameters::new(t0(), 4)
            .with_sources(vec![SourceDescriptor::vector("windages", DataType::Float64, 3)]);
        let extended = planner.plan(&params, true).unwrap();
        let schema = extended.file_schema(&GlobalAttributes::default(), t0());
        assert_eq!(schema.dimensions[2], Dimension::fixed("world_point", 3));
        assert_eq!(
            schema.variable("windages").unwrap().dimensions,
            ["data", "world_point"]
        );
    }

    #[test]
    fn test_file_schema_json_roundtrip() {
        let layout = LayoutPlanner::default()
            .plan(&RunParameters::new(t0(), 2), false)
            .unwrap();
        let schema = layout.file_schema(&GlobalAttributes::default(), t0());
        let bytes = schema.to_bytes().unwrap();
        assert_eq!(FileSchema::from_bytes(&bytes).unwrap(), schema);
    }
}
