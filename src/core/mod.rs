//! Trajectory file format internals
//!
//! ## Modules
//!
//! - [`schema`] - Standard field manifest, extended field derivation, fill values
//! - [`array`] - Typed particle arrays and on-disk value encoding
//! - [`validation`] - Output target checks and uncertain twin naming
//! - [`config`] - `OutputConfig` and TOML loading
//! - [`layout`] - Run parameters, layout planning, schema block
//! - [`header`] - Fixed 256-byte file header
//! - [`compression`] - Chunk codecs (LZ4 / Zstd)
//! - [`chunk`] - One timestep's slice of every record variable
//! - [`io`] - Creating files and durably appending timesteps
//! - [`snapshot`] - Particle snapshots and the element cache seam
//! - [`writer`] - Ragged writer with cumulative record offsets
//! - [`lifecycle`] - Run state machine, destinations and rewind
//! - [`reader`] - Memory-mapped read-back
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Trajectory File                  │
//! ├─────────────────────────────────────────────┤
//! │ Header (256 bytes)                          │
//! │  - Magic: "PTRJ\x00\x01\x00\x00"            │
//! │  - Version: 1.0                             │
//! │  - step_count, record_len, region offsets   │
//! ├─────────────────────────────────────────────┤
//! │ Schema block (JSON)                         │
//! │  - Global attributes, dimensions            │
//! │  - Variables with dtype and attributes      │
//! ├─────────────────────────────────────────────┤
//! │ Step table (step_count x 40 bytes)          │
//! │  - time, particle_count, record_start       │
//! │  - Chunk location                           │
//! ├─────────────────────────────────────────────┤
//! │ Chunks (one per written timestep)           │
//! │  - CRC32 checked, optionally compressed     │
//! │  - Field slices in manifest order           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Timestep `j` occupies records `[sum(count[0..j]), sum(count[0..=j]))`
//! of the `data` dimension.

pub mod array;
pub mod chunk;
pub mod compression;
pub mod config;
pub mod header;
pub mod io;
pub mod layout;
pub mod lifecycle;
pub mod reader;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod writer;
