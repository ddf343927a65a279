use std::path::PathBuf;
use thiserror::Error;

use super::constants::CALIBRATION_CHANNELS;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("CalibrationTable failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Could not load CalibrationTable because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration dataset {0} has length {1}; expected {exp}", exp=CALIBRATION_CHANNELS)]
    BadLength(String, usize),
    #[error("Calibration index {0} is out of range")]
    BadIndex(usize),
}

#[derive(Debug, Clone, Error)]
pub enum HitError {
    #[error("Invalid hit type code {0} found in decoded record")]
    BadHitType(i32),
}

#[derive(Debug, Error)]
pub enum RawStreamError {
    #[error("Could not open raw stream because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Raw stream failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Raw stream contained a bad record at entry {0}: {1}")]
    BadRecord(u64, HitError),
}

#[derive(Debug, Error)]
pub enum FramerError {
    #[error("Framer was given an invalid frame size {0}")]
    BadFrameSize(u32),
    #[error("Framer checkpoint of {0} cursors does not match the {1} given streams")]
    MismatchedCheckpoint(usize, usize),
}

#[derive(Debug, Error)]
pub enum FrameStoreError {
    #[error("FrameStore failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Could not open FrameStore because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("FrameStore write called before new_spill")]
    NoOpenSpill,
    #[error("FrameStore hit added before new_frame")]
    NoOpenFrame,
    #[error("FrameStore value {value} does not fit the stored width of field {field}")]
    ValueOutOfRange { field: &'static str, value: i64 },
    #[error("FrameStore spill record is inconsistent: {0}")]
    Corrupted(String),
}

#[derive(Debug, Error)]
pub enum FineHistogramError {
    #[error("FineHistogram failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config does not list any input streams")]
    NoStreams,
    #[error("Config has an invalid frame size {0}")]
    BadFrameSize(u32),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Framer error: {0}")]
    FramerError(#[from] FramerError),
    #[error("Processor failed due to FrameStore error: {0}")]
    FrameStoreError(#[from] FrameStoreError),
    #[error("Processor failed due to FineHistogram error: {0}")]
    FineHistogramError(#[from] FineHistogramError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
