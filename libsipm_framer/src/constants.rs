// Clock conversion for the ALCOR TDC
pub const ROLLOVER_TO_CLOCK: i64 = 32768;
pub const COARSE_TO_NS: f64 = 3.125;
pub const ROLLOVER_TO_NS: f64 = 102400.0;

/// Coarse time reported by a FIFO which is dead at the start of a spill
pub const DEAD_SENTINEL: u32 = 0xDEADBEEF;

// Calibration table shape
pub const CALIBRATION_CHANNELS: usize = 768;
pub const FINE_BINS: usize = 256;
pub const DEFAULT_CUT_TOLERANCE: f64 = 1.0;

// Hardware layout
pub const FIFOS_PER_CHIP: i32 = 4;
pub const CHANNELS_PER_CHIP: i32 = 32;
pub const TDCS_PER_PIXEL: i32 = 4;

// Decoded stream record: ten little-endian i32
pub const RAW_RECORD_FIELDS: usize = 10;
pub const RAW_RECORD_SIZE: u64 = (RAW_RECORD_FIELDS * 4) as u64;

// Hit type codes as written by the decoder
pub const TYPE_PIXEL_HIT: i32 = 1;
pub const TYPE_SPILL_START: i32 = 7;
pub const TYPE_TRIGGER_TAG: i32 = 9;
pub const TYPE_SPILL_END: i32 = 15;

pub const DEFAULT_FRAME_SIZE: u32 = 256;
/// Frame-relative coarse times are stored as u16
pub const MAX_FRAME_SIZE: u32 = u16::MAX as u32 + 1;
