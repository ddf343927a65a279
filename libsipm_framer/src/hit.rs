use std::cmp::Ordering;

use super::calibration::CalibrationTable;
use super::constants::*;
use super::error::HitError;

/// The kind of entry found in a decoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitType {
    PixelHit,
    TriggerTag,
    SpillStart,
    SpillEnd,
}

impl HitType {
    pub fn code(&self) -> i32 {
        match self {
            Self::PixelHit => TYPE_PIXEL_HIT,
            Self::TriggerTag => TYPE_TRIGGER_TAG,
            Self::SpillStart => TYPE_SPILL_START,
            Self::SpillEnd => TYPE_SPILL_END,
        }
    }
}

impl TryFrom<i32> for HitType {
    type Error = HitError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            TYPE_PIXEL_HIT => Ok(Self::PixelHit),
            TYPE_TRIGGER_TAG => Ok(Self::TriggerTag),
            TYPE_SPILL_START => Ok(Self::SpillStart),
            TYPE_SPILL_END => Ok(Self::SpillEnd),
            _ => Err(HitError::BadHitType(value)),
        }
    }
}

/// Status of a FIFO as reported by its SpillStart record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoStatus {
    Alive,
    Dead,
}

/// One decoded entry of a readout stream.
///
/// All the indices (chip, channel, calibration index) and times are derived from the
/// raw fields on demand. Calibrated times need the [`CalibrationTable`] of the unit
/// the hit came from.
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub device: i32,
    pub fifo: i32,
    pub hit_type: HitType,
    pub counter: i32,
    pub column: i32,
    pub pixel: i32,
    pub tdc: i32,
    pub rollover: i32,
    pub coarse: i32,
    pub fine: i32,
}

impl HitRecord {
    pub fn chip(&self) -> i32 {
        self.fifo / FIFOS_PER_CHIP
    }

    /// Electronics channel within the chip
    pub fn eo_channel(&self) -> i32 {
        self.pixel + 4 * self.column
    }

    pub fn calibration_index(&self) -> usize {
        (self.tdc + TDCS_PER_PIXEL * self.pixel + 16 * self.column + 128 * self.chip()) as usize
    }

    /// Channel number within the whole device
    pub fn device_channel(&self) -> i32 {
        self.eo_channel() + CHANNELS_PER_CHIP * self.chip()
    }

    pub fn coarse_time_clock(&self) -> i64 {
        self.coarse as i64 + self.rollover as i64 * ROLLOVER_TO_CLOCK
    }

    pub fn coarse_time_ns(&self) -> f64 {
        self.coarse as f64 * COARSE_TO_NS + self.rollover as f64 * ROLLOVER_TO_NS
    }

    pub fn fine_phase(&self, calibration: &CalibrationTable) -> f64 {
        calibration.phase(self.calibration_index(), self.fine)
    }

    /// Fixed offset in ns; zero when there is no fine measurement
    pub fn fine_offset(&self, calibration: &CalibrationTable) -> f64 {
        if self.fine == 0 {
            return 0.0;
        }
        calibration.offset(self.calibration_index())
    }

    pub fn is_near_cut(&self, calibration: &CalibrationTable, tolerance: f64) -> bool {
        calibration.is_near_cut(self.calibration_index(), self.fine, tolerance)
    }

    pub fn fine_time_clock(&self, calibration: &CalibrationTable) -> f64 {
        self.coarse_time_clock() as f64 - self.fine_phase(calibration)
    }

    pub fn fine_time_ns(&self, calibration: &CalibrationTable) -> f64 {
        self.coarse_time_ns()
            - self.fine_phase(calibration) * COARSE_TO_NS
            - self.fine_offset(calibration)
    }

    /// Frame a hit falls in, flooring toward negative infinity
    pub fn frame_index(&self, frame_size: u32) -> i64 {
        self.coarse_time_clock().div_euclid(frame_size as i64)
    }

    /// For a SpillStart record, whether the FIFO reported in alive or dead.
    ///
    /// The dead marker is compared against the low 32 bits of the coarse clock.
    pub fn fifo_status(&self) -> Option<FifoStatus> {
        if self.hit_type != HitType::SpillStart {
            return None;
        }
        if self.coarse_time_clock() as u32 == DEAD_SENTINEL {
            Some(FifoStatus::Dead)
        } else {
            Some(FifoStatus::Alive)
        }
    }

    pub fn is_pixel_hit(&self) -> bool {
        self.hit_type == HitType::PixelHit
    }

    pub fn is_trigger_tag(&self) -> bool {
        self.hit_type == HitType::TriggerTag
    }

    pub fn is_spill_start(&self) -> bool {
        self.hit_type == HitType::SpillStart
    }

    pub fn is_spill_end(&self) -> bool {
        self.hit_type == HitType::SpillEnd
    }
}

/// Order two hits by calibrated time in clock cycles
pub fn compare_fine_time(a: &HitRecord, b: &HitRecord, calibration: &CalibrationTable) -> Ordering {
    a.fine_time_clock(calibration)
        .total_cmp(&b.fine_time_clock(calibration))
}

#[cfg(test)]
pub(crate) fn make_hit(device: i32, fifo: i32, hit_type: HitType, rollover: i32, coarse: i32) -> HitRecord {
    HitRecord {
        device,
        fifo,
        hit_type,
        counter: 0,
        column: 0,
        pixel: 0,
        tdc: 0,
        rollover,
        coarse,
        fine: 0,
    }
}
