//! Extended field export tests
//!
//! With `all_data` on, every array declared by the particle sources that the
//! standard fields do not already write becomes an extra record variable.

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use trajectory_rs::core::schema::{FieldOrigin, FILL_F64};
use trajectory_rs::{
    DataType, FieldShape, ParticleArray, ParticleSnapshot, Population, RunParameters,
    SourceDescriptor, TrajectoryError, TrajectoryOutput, TrajectoryReader,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 2, 13)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn sources() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::vector("positions", DataType::Float64, 3),
        SourceDescriptor::scalar("mass", DataType::Float64),
        SourceDescriptor::scalar("windages", DataType::Float64),
        SourceDescriptor::vector("velocity", DataType::Float64, 3),
        // second spill declares windages again with another dtype
        SourceDescriptor::scalar("windages", DataType::Float32),
        SourceDescriptor::scalar("rise_vel", DataType::Float32),
    ]
}

fn output_at(temp: &TempDir) -> TrajectoryOutput {
    TrajectoryOutput::builder()
        .path(temp.path().join("run.traj"))
        .all_data(true)
        .build()
        .unwrap()
}

#[test]
fn test_extended_manifest() {
    let temp = TempDir::new().unwrap();
    let mut output = output_at(&temp);
    output
        .prepare_for_model_run(RunParameters::new(t0(), 2).with_sources(sources()))
        .unwrap();

    let manifest = output.layout().unwrap().manifest();
    let extended: Vec<&str> = manifest.extended().map(|f| f.name.as_str()).collect();
    assert_eq!(extended, vec!["windages", "velocity", "rise_vel"]);

    let windages = manifest.get("windages").unwrap();
    assert_eq!(windages.dtype, DataType::Float64);
    assert_eq!(windages.origin, FieldOrigin::Extended);
    assert_eq!(manifest.get("velocity").unwrap().shape, FieldShape::Vector3);
    assert!(manifest.has_vector_fields());
}

#[test]
fn test_sources_cannot_shadow_axis_variables() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");
    let mut output = output_at(&temp);
    let shadowing = vec![
        SourceDescriptor::scalar("time", DataType::Float64),
        SourceDescriptor::scalar("particle_count", DataType::Int32),
        SourceDescriptor::scalar("rise_vel", DataType::Float32),
    ];
    output
        .prepare_for_model_run(RunParameters::new(t0(), 1).with_sources(shadowing))
        .unwrap();
    output
        .write_timestep(0, &ParticleSnapshot::new(Population::Base, t0(), 0))
        .unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();
    let names: Vec<&str> = reader
        .schema()
        .variables
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    assert_eq!(names.iter().filter(|&&n| n == "time").count(), 1);
    assert_eq!(names.iter().filter(|&&n| n == "particle_count").count(), 1);
    assert_eq!(names.last(), Some(&"rise_vel"));
}

#[test]
fn test_extended_requires_sources() {
    let temp = TempDir::new().unwrap();
    let mut output = output_at(&temp);
    assert!(matches!(
        output.prepare_for_model_run(RunParameters::new(t0(), 2)),
        Err(TrajectoryError::MissingSources)
    ));
    assert!(!temp.path().join("run.traj").exists());
}

#[test]
fn test_unsupported_source_shape() {
    let temp = TempDir::new().unwrap();
    let mut output = output_at(&temp);
    let bad = vec![SourceDescriptor::vector("tensor", DataType::Float64, 2)];
    assert!(matches!(
        output.prepare_for_model_run(RunParameters::new(t0(), 2).with_sources(bad)),
        Err(TrajectoryError::SchemaError(_))
    ));
    assert!(!output.middle_of_run());
}

#[test]
fn test_standard_only_ignores_sources() {
    let temp = TempDir::new().unwrap();
    let mut output = TrajectoryOutput::builder()
        .path(temp.path().join("run.traj"))
        .build()
        .unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 1).with_sources(sources()))
        .unwrap();
    assert_eq!(output.layout().unwrap().manifest().extended().count(), 0);
}

#[test]
fn test_extended_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");
    let mut output = output_at(&temp);
    output
        .prepare_for_model_run(RunParameters::new(t0(), 2).with_sources(sources()))
        .unwrap();

    // windages arrives as f32 and is widened to the declared f64
    let snap = ParticleSnapshot::new(Population::Base, t0(), 2)
        .with_array("positions", ParticleArray::vector(vec![1.0f64, 2.0, 0.0, 3.0, 4.0, 5.0]))
        .with_array("windages", ParticleArray::scalar(vec![0.01f32, 0.04]))
        .with_array(
            "velocity",
            ParticleArray::vector(vec![0.5f64, -0.5, 0.0, 1.5, 0.25, 0.0]),
        );
    output.write_timestep(0, &snap).unwrap();

    // second step omits the extended arrays
    let bare = ParticleSnapshot::new(Population::Base, t0(), 1)
        .with_array("positions", ParticleArray::vector(vec![9.0f64, 9.0, 9.0]));
    output.write_timestep(1, &bare).unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();
    let dims: Vec<&str> = reader.schema().dimensions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(dims, vec!["time", "data", "world_point"]);

    let velocity = reader.schema().variable("velocity").unwrap();
    assert_eq!(velocity.dimensions, vec!["data", "world_point"]);

    let windages = reader.read_field("windages").unwrap();
    let values = windages.as_f64().unwrap();
    assert_eq!(values[0], 0.01f32 as f64);
    assert_eq!(values[1], 0.04f32 as f64);
    assert_eq!(values[2], FILL_F64);

    let velocity = reader.read_field("velocity").unwrap();
    assert_eq!(
        velocity.as_f64().unwrap(),
        &[0.5, -0.5, 0.0, 1.5, 0.25, 0.0, FILL_F64, FILL_F64, FILL_F64]
    );
    reader.verify().unwrap();
}

#[test]
fn test_wrong_shape_for_extended_field() {
    let temp = TempDir::new().unwrap();
    let mut output = output_at(&temp);
    output
        .prepare_for_model_run(RunParameters::new(t0(), 1).with_sources(sources()))
        .unwrap();

    let snap = ParticleSnapshot::new(Population::Base, t0(), 2)
        .with_array("velocity", ParticleArray::scalar(vec![1.0f64, 2.0]));
    assert!(matches!(
        output.write_timestep(0, &snap),
        Err(TrajectoryError::UnsupportedFieldShape { .. })
    ));
    assert_eq!(output.record_len(Population::Base), Some(0));
}
