//! Ragged record layout tests
//!
//! Writes runs with varying particle counts and reads them back to check
//! offsets, the record dimension, and field values.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tempfile::TempDir;
use trajectory_rs::core::schema::{FILL_F32, FILL_I32, FILL_I8};
use trajectory_rs::{
    OutputFormat, ParticleArray, ParticleSnapshot, Population, RunParameters, TrajectoryOutput,
    TrajectoryReader,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 2, 13)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn snapshot(count: usize, step: u32) -> ParticleSnapshot {
    let positions: Vec<f64> = (0..count)
        .flat_map(|i| [-72.0 + i as f64 * 0.25, 41.0 + step as f64, i as f64])
        .collect();
    ParticleSnapshot::new(
        Population::Base,
        t0() + TimeDelta::minutes(15 * step as i64),
        count,
    )
    .with_array("positions", ParticleArray::vector(positions))
    .with_array("mass", ParticleArray::scalar(vec![250.0f64; count]))
    .with_array("age", ParticleArray::scalar(vec![900 * step as i32; count]))
    .with_array("status_codes", ParticleArray::scalar(vec![2i8; count]))
    .with_array("spill_num", ParticleArray::scalar(vec![0i8; count]))
}

#[test]
fn test_three_step_scenario() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder().path(&path).build().unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 3))
        .unwrap();

    let layout = output.layout().unwrap();
    assert_eq!(layout.step_count(), 3);
    assert_eq!(layout.manifest().extended().count(), 0);

    for (step, count) in [(0u32, 2usize), (1, 5), (2, 0)] {
        let receipt = output.write_timestep(step, &snapshot(count, step)).unwrap();
        assert_eq!(receipt.step, step);
        assert_eq!(receipt.paths, vec![path.clone()]);
    }
    assert_eq!(output.record_len(Population::Base), Some(7));

    let reader = TrajectoryReader::open(&path).unwrap();
    assert_eq!(reader.record_len(), 7);
    assert_eq!(reader.step_range(0).unwrap(), 0..2);
    assert_eq!(reader.step_range(1).unwrap(), 2..7);
    assert_eq!(reader.step_range(2).unwrap(), 7..7);
    assert_eq!(reader.particle_counts(), vec![2, 5, 0]);
    assert_eq!(reader.times(), vec![0.0, 900.0, 1800.0]);
    reader.verify().unwrap();
}

#[test]
fn test_round_trip_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder().path(&path).build().unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 2))
        .unwrap();
    output.write_timestep(0, &snapshot(3, 0)).unwrap();
    output.write_timestep(1, &snapshot(2, 1)).unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();

    let lon = reader.read_field("longitude").unwrap();
    assert_eq!(lon.as_f32().unwrap(), &[-72.0, -71.75, -71.5, -72.0, -71.75]);
    let lat = reader.read_field("latitude").unwrap();
    assert_eq!(lat.as_f32().unwrap(), &[41.0, 41.0, 41.0, 42.0, 42.0]);
    let depth = reader.read_field("depth").unwrap();
    assert_eq!(depth.as_f32().unwrap(), &[0.0, 1.0, 2.0, 0.0, 1.0]);

    let age = reader.read_field("age").unwrap();
    assert_eq!(age.as_i32().unwrap(), &[0, 0, 0, 900, 900]);
    let status = reader.read_field("status").unwrap();
    assert_eq!(status.as_i8().unwrap(), &[2; 5]);
    let mass = reader.read_field("mass").unwrap();
    assert_eq!(mass.as_f32().unwrap(), &[250.0; 5]);

    // flag is never supplied
    let flag = reader.read_field("flag").unwrap();
    assert_eq!(flag.as_i8().unwrap(), &[FILL_I8; 5]);
}

#[test]
fn test_absent_fields_are_filled() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder().path(&path).build().unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 1))
        .unwrap();

    let bare = ParticleSnapshot::new(Population::Base, t0(), 4);
    output.write_timestep(0, &bare).unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();
    assert_eq!(reader.read_field("longitude").unwrap().as_f32().unwrap(), &[FILL_F32; 4]);
    assert_eq!(reader.read_field("age").unwrap().as_i32().unwrap(), &[FILL_I32; 4]);
}

#[test]
fn test_classic_format_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder()
        .path(&path)
        .format(OutputFormat::Classic)
        .build()
        .unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 1))
        .unwrap();
    output.write_timestep(0, &snapshot(1000, 0)).unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();
    assert_eq!(reader.header().format, OutputFormat::Classic);
    assert_eq!(reader.read_field("mass").unwrap().len(), 1000);
    reader.verify().unwrap();
}

#[test]
fn test_schema_block_describes_layout() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder().path(&path).build().unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 6))
        .unwrap();

    let reader = TrajectoryReader::open(&path).unwrap();
    let schema = reader.schema();

    let dims: Vec<(&str, Option<u64>)> = schema
        .dimensions
        .iter()
        .map(|d| (d.name.as_str(), d.length))
        .collect();
    assert_eq!(
        dims,
        vec![("time", Some(6)), ("data", None), ("world_point", Some(3))]
    );

    let names: Vec<&str> = schema.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "time",
            "particle_count",
            "longitude",
            "latitude",
            "depth",
            "mass",
            "age",
            "flag",
            "status",
            "id"
        ]
    );

    assert_eq!(schema.time_origin().unwrap(), t0());
    assert!(reader.global_attribute("creation_date").is_some());
    assert!(reader.global_attribute("conventions").is_some());

    // nothing written yet
    assert_eq!(reader.record_len(), 0);
    assert_eq!(reader.particle_counts(), vec![FILL_I32; 6]);
}

#[test]
fn test_interrupted_run_keeps_earlier_steps() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("run.traj");

    let mut output = TrajectoryOutput::builder().path(&path).build().unwrap();
    output
        .prepare_for_model_run(RunParameters::new(t0(), 4))
        .unwrap();
    output.write_timestep(0, &snapshot(3, 0)).unwrap();
    output.write_timestep(1, &snapshot(4, 1)).unwrap();

    // a bad snapshot fails without touching what is on disk
    let bad = snapshot(2, 2).with_array("mass", ParticleArray::scalar(vec![1.0f64; 3]));
    assert!(output.write_timestep(2, &bad).is_err());

    // simulate a crash: the handle goes away without rewind
    drop(output);

    let reader = TrajectoryReader::open(&path).unwrap();
    assert_eq!(reader.header().steps_written, 2);
    assert_eq!(reader.record_len(), 7);
    assert_eq!(reader.step_range(1).unwrap(), 3..7);
    reader.verify().unwrap();
}
