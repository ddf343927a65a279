use std::cmp::Ordering;

use super::constants::{CHANNELS_PER_CHIP, COARSE_TO_NS, TDCS_PER_PIXEL};

/// The compact hit kept in the frame store.
///
/// `index` is the device channel and `coarse` is relative to the start of the frame.
/// Trigger hits only carry `coarse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightHit {
    pub device: u8,
    pub index: u8,
    pub coarse: u16,
    pub fine: u8,
    pub tdc: u8,
}

impl LightHit {
    pub fn new(device: u8, index: u8, coarse: u16, fine: u8, tdc: u8) -> Self {
        Self {
            device,
            index,
            coarse,
            fine,
            tdc,
        }
    }

    pub fn trigger(coarse: u16) -> Self {
        Self {
            coarse,
            ..Default::default()
        }
    }

    pub fn chip(&self) -> i32 {
        self.index as i32 / CHANNELS_PER_CHIP
    }

    pub fn eo_channel(&self) -> i32 {
        self.index as i32 % CHANNELS_PER_CHIP
    }

    pub fn calibration_index(&self) -> usize {
        (self.tdc as i32 + TDCS_PER_PIXEL * self.index as i32) as usize
    }

    pub fn coarse_time_ns(&self) -> f64 {
        self.coarse as f64 * COARSE_TO_NS
    }
}

/// Order two hits by frame-relative coarse time
pub fn compare_coarse(a: &LightHit, b: &LightHit) -> Ordering {
    a.coarse.cmp(&b.coarse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices() {
        let hit = LightHit::new(207, 78, 12, 40, 3);
        assert_eq!(hit.chip(), 2);
        assert_eq!(hit.eo_channel(), 14);
        // same as tdc + 4*pixel + 16*column + 128*chip for pixel 2, column 3
        assert_eq!(hit.calibration_index(), 3 + 8 + 48 + 256);
        assert_eq!(hit.coarse_time_ns(), 37.5);
    }

    #[test]
    fn test_sort_by_coarse() {
        let mut hits = vec![LightHit::trigger(9), LightHit::trigger(2), LightHit::trigger(5)];
        hits.sort_by(compare_coarse);
        let coarse: Vec<u16> = hits.iter().map(|h| h.coarse).collect();
        assert_eq!(coarse, vec![2, 5, 9]);
    }
}
