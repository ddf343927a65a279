//! # sipm_framer
//!
//! sipm_framer is the spill framer for the SiPM ring-imaging test-beam DAQ, written in
//! Rust. It takes the decoded readout streams of the ALCOR front-end (one stream per
//! FIFO of every readout board), reconstructs the hit times, groups the hits of all
//! streams into fixed-width time frames within each beam spill, and writes them to a
//! compact HDF5 frame store that downstream reconstruction reads frame by frame.
//!
//! ## Building
//!
//! HDF5 must be installed before building. Typically this will be installed using a
//! package manager (homebrew, apt, etc), and the Rust libraries will auto detect the
//! location of the HDF install. If it lives in a custom location, write the following
//! snippet into the file `.cargo/config.toml` of the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! To build and install the CLI use `cargo install --path ./sipm_framer_cli`.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows (`sipm_framer_cli new -p
//! config.yml` writes a template):
//!
//! ```yml
//! streams:
//! - /data/run/kc705-192/decoded/alcdaq.fifo_0.dat
//! output_path: /data/run/lightdata.h5
//! fine_histogram_path: null
//! frame_size: 256
//! max_spills: null
//! trigger_offsets:
//! - device: 192
//!   offset: 112
//! trigger0_device: 192
//! timing_chips:
//! - device: 207
//!   chip: 4
//! - device: 207
//!   chip: 5
//! tracking_chips:
//! - device: 200
//!   chip: 4
//! - device: 201
//!   chip: 4
//! selection:
//!   minimal: false
//!   trigger0: false
//!   timing_or: false
//!   timing_and: false
//!   tracking_or: false
//!   tracking_and: false
//! ```
//!
//! ## Input
//!
//! Each stream is a flat file of 40-byte records: ten little-endian i32 holding
//! device, fifo, type, counter, column, pixel, tdc, rollover, coarse and fine. Record
//! types are 1 (pixel hit), 7 (spill start), 9 (trigger tag) and 15 (spill end).
//! Missing stream files are skipped.
//!
//! ## Output
//!
//! ```text
//! lightdata.h5
//! spills - min_spill, max_spill, n_spills, frame_size, version
//! |---- spill_#  - id, part_n, dead_n, frame_n, trigger0_size, timing_size, cherenkov_size, tracking_size
//! |    |---- part_device, part_mask, dead_device, dead_mask
//! |    |---- frame, trigger0_n, trigger0_coarse
//! |    |---- timing_n, timing_device, timing_index, timing_coarse, timing_fine, timing_tdc
//! |    |---- cherenkov_n, ... (same as timing)
//! |    |---- tracking_n, ... (same as timing)
//! ```
//!
//! All frames of a spill share the flat hit arrays; the per-frame `_n` counts locate
//! the hits of each frame. Coarse values are relative to the start of their frame.
pub mod calibration;
pub mod config;
pub mod constants;
pub mod error;
pub mod fine_histogram;
pub mod frame_store;
pub mod framer;
pub mod hit;
pub mod light_hit;
pub mod process;
pub mod raw_stream;
pub mod selection;
pub mod spill;
pub mod spill_record;
pub mod worker_status;
