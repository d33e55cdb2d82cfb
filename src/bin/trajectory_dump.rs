//! trajectory-dump
//!
//! Prints the header, dimensions, variables and per-timestep record ranges
//! of a trajectory file.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use trajectory_rs::TrajectoryReader;

#[derive(Parser, Debug)]
#[command(name = "trajectory-dump")]
#[command(about = "Inspect a ragged-array trajectory file")]
struct Args {
    /// Path to the trajectory file
    file: PathBuf,

    /// Print the time, particle count and record range of every timestep
    #[arg(short = 's', long)]
    steps: bool,

    /// Print the values of one record variable
    #[arg(short = 'f', long)]
    field: Option<String>,

    /// Limit the number of values printed with --field
    #[arg(long, default_value = "20")]
    limit: usize,

    /// Decode every chunk and check checksums and offsets
    #[arg(long)]
    verify: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let reader = TrajectoryReader::open(&args.file)
        .with_context(|| format!("failed to open {:?}", args.file))?;
    info!("Opened {:?}", reader.path());

    let header = reader.header();
    println!("file: {}", args.file.display());
    println!(
        "format: {:?} v{}.{}  codec: {:?}",
        header.format, header.version_major, header.version_minor, header.codec
    );
    println!(
        "steps written: {}/{}  records: {}",
        header.steps_written, header.step_count, header.record_len
    );

    println!("\nglobal attributes:");
    for (key, value) in reader.schema().global_attributes.iter() {
        println!("  {} = {}", key, value);
    }

    println!("\ndimensions:");
    for dim in &reader.schema().dimensions {
        match dim.length {
            Some(len) => println!("  {} = {}", dim.name, len),
            None => println!("  {} = UNLIMITED ({} currently)", dim.name, reader.record_len()),
        }
    }

    println!("\nvariables:");
    for var in &reader.schema().variables {
        println!("  {} {}({})", var.dtype, var.name, var.dimensions.join(", "));
        for (key, value) in var.attributes.iter() {
            println!("    {}:{} = {}", var.name, key, value);
        }
    }

    if args.steps {
        println!("\nsteps:");
        let stamps = reader.timestamps()?;
        for (step, (entry, stamp)) in reader.entries().iter().zip(stamps).enumerate() {
            match stamp {
                Some(stamp) => {
                    let range = entry.record_range();
                    println!(
                        "  {:>5}  {}  count {:>8}  records [{}, {})",
                        step, stamp, entry.particle_count, range.start, range.end
                    );
                }
                None => println!("  {:>5}  (not written)", step),
            }
        }
    }

    if let Some(name) = &args.field {
        let data = reader
            .read_field(name)
            .with_context(|| format!("failed to read field '{}'", name))?;
        println!("\n{} ({} values):", name, data.len());
        for i in 0..data.len().min(args.limit) {
            println!("  [{}] {}", i, data.value_f64(i));
        }
        if data.len() > args.limit {
            println!("  ... {} more", data.len() - args.limit);
        }
    }

    if args.verify {
        if let Err(e) = reader.verify() {
            bail!("verification failed: {}", e);
        }
        println!("\nverify: ok");
    }

    Ok(())
}
