use serde::{Deserialize, Serialize};

use super::spill::Frame;
use super::spill_record::HitCategory;

/// A chip of a given device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChipId {
    pub device: i32,
    pub chip: i32,
}

impl ChipId {
    pub fn new(device: i32, chip: i32) -> Self {
        Self { device, chip }
    }
}

/// Which frames are kept when writing the frame store. Everything is kept by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Drop frames with no trigger0, timing or tracking hits
    pub minimal: bool,
    /// Require a trigger0 hit
    pub trigger0: bool,
    pub timing_or: bool,
    pub timing_and: bool,
    pub tracking_or: bool,
    pub tracking_and: bool,
}

/// Applies the selection policy to frames and routes hits to their store category
#[derive(Debug, Clone)]
pub struct FrameSelector {
    policy: SelectionConfig,
    trigger0_device: i32,
    timing_chips: Vec<ChipId>,
    tracking_chips: Vec<ChipId>,
}

impl FrameSelector {
    pub fn new(
        policy: SelectionConfig,
        trigger0_device: i32,
        timing_chips: Vec<ChipId>,
        tracking_chips: Vec<ChipId>,
    ) -> Self {
        Self {
            policy,
            trigger0_device,
            timing_chips,
            tracking_chips,
        }
    }

    pub fn trigger0_device(&self) -> i32 {
        self.trigger0_device
    }

    /// Store category of a hit from the given chip
    pub fn category(&self, device: i32, chip: i32) -> HitCategory {
        let id = ChipId::new(device, chip);
        if self.timing_chips.contains(&id) {
            HitCategory::Timing
        } else if self.tracking_chips.contains(&id) {
            HitCategory::Tracking
        } else {
            HitCategory::Cherenkov
        }
    }

    /// Whether a frame passes the selection
    pub fn accept(&self, frame: &Frame) -> bool {
        let trigger0_n = frame.trigger_count(self.trigger0_device);
        let timing_n: Vec<usize> = self
            .timing_chips
            .iter()
            .map(|c| frame.chip_hit_count(c.device, c.chip))
            .collect();
        let tracking_n: Vec<usize> = self
            .tracking_chips
            .iter()
            .map(|c| frame.chip_hit_count(c.device, c.chip))
            .collect();

        let policy = &self.policy;
        if policy.minimal
            && trigger0_n == 0
            && timing_n.iter().all(|n| *n == 0)
            && tracking_n.iter().all(|n| *n == 0)
        {
            return false;
        }
        if policy.trigger0 && trigger0_n == 0 {
            return false;
        }
        if policy.timing_or && !timing_n.iter().any(|n| *n > 0) {
            return false;
        }
        if policy.timing_and && timing_n.iter().any(|n| *n == 0) {
            return false;
        }
        if policy.tracking_or && !tracking_n.iter().any(|n| *n > 0) {
            return false;
        }
        if policy.tracking_and && tracking_n.iter().any(|n| *n == 0) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::{make_hit, HitType};
    use crate::spill::Spill;

    fn selector(policy: SelectionConfig) -> FrameSelector {
        FrameSelector::new(
            policy,
            192,
            vec![ChipId::new(207, 4), ChipId::new(207, 5)],
            vec![ChipId::new(200, 4), ChipId::new(201, 4)],
        )
    }

    // frame 0: trigger + one timing chip; frame 1: cherenkov only; frame 2: both timing chips
    fn sample_spill() -> Spill {
        let mut spill = Spill::default();
        spill.add_trigger(0, make_hit(192, 24, HitType::TriggerTag, 0, 3));
        spill.add_hit(0, make_hit(207, 16, HitType::PixelHit, 0, 4));
        spill.add_hit(1, make_hit(194, 0, HitType::PixelHit, 0, 300));
        spill.add_hit(2, make_hit(207, 16, HitType::PixelHit, 0, 520));
        spill.add_hit(2, make_hit(207, 20, HitType::PixelHit, 0, 521));
        spill
    }

    fn accepted(selector: &FrameSelector, spill: &Spill) -> Vec<i64> {
        spill
            .frames()
            .iter()
            .filter(|(_, frame)| selector.accept(frame))
            .map(|(index, _)| *index)
            .collect()
    }

    #[test]
    fn test_policies() {
        let spill = sample_spill();
        assert_eq!(accepted(&selector(SelectionConfig::default()), &spill), vec![0, 1, 2]);
        let minimal = SelectionConfig {
            minimal: true,
            ..Default::default()
        };
        assert_eq!(accepted(&selector(minimal), &spill), vec![0, 2]);
        let trigger0 = SelectionConfig {
            trigger0: true,
            ..Default::default()
        };
        assert_eq!(accepted(&selector(trigger0), &spill), vec![0]);
        let timing_or = SelectionConfig {
            timing_or: true,
            ..Default::default()
        };
        assert_eq!(accepted(&selector(timing_or), &spill), vec![0, 2]);
        let timing_and = SelectionConfig {
            timing_and: true,
            ..Default::default()
        };
        assert_eq!(accepted(&selector(timing_and), &spill), vec![2]);
        let tracking_or = SelectionConfig {
            tracking_or: true,
            ..Default::default()
        };
        assert!(accepted(&selector(tracking_or), &spill).is_empty());
    }

    #[test]
    fn test_routing() {
        let selector = selector(SelectionConfig::default());
        assert_eq!(selector.category(207, 4), HitCategory::Timing);
        assert_eq!(selector.category(201, 4), HitCategory::Tracking);
        assert_eq!(selector.category(201, 5), HitCategory::Cherenkov);
        assert_eq!(selector.category(192, 0), HitCategory::Cherenkov);
    }
}
