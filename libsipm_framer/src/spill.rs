use std::collections::BTreeMap;

use super::hit::{FifoStatus, HitRecord};

/// Bitmask over the FIFO ids of one device
pub type FifoMask = u32;

/// Hits and triggers of a single device inside a frame.
///
/// Hits are kept flat in arrival order; the chip/channel grouping is built on request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFrame {
    hits: Vec<HitRecord>,
    triggers: Vec<HitRecord>,
}

impl DeviceFrame {
    pub fn hits(&self) -> &[HitRecord] {
        &self.hits
    }

    pub fn triggers(&self) -> &[HitRecord] {
        &self.triggers
    }

    /// Group the hits by (chip, electronics channel), keeping arrival order per channel
    pub fn channels(&self) -> BTreeMap<(i32, i32), Vec<&HitRecord>> {
        let mut channels: BTreeMap<(i32, i32), Vec<&HitRecord>> = BTreeMap::new();
        for hit in self.hits.iter() {
            channels
                .entry((hit.chip(), hit.eo_channel()))
                .or_default()
                .push(hit);
        }
        channels
    }

    pub fn chip_hits(&self, chip: i32) -> impl Iterator<Item = &HitRecord> {
        self.hits.iter().filter(move |hit| hit.chip() == chip)
    }

    pub fn chip_hit_count(&self, chip: i32) -> usize {
        self.chip_hits(chip).count()
    }
}

/// A fixed-width time bucket of a spill, keyed by device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    devices: BTreeMap<i32, DeviceFrame>,
}

impl Frame {
    pub fn device(&self, device: i32) -> Option<&DeviceFrame> {
        self.devices.get(&device)
    }

    pub fn devices(&self) -> impl Iterator<Item = (&i32, &DeviceFrame)> {
        self.devices.iter()
    }

    pub fn trigger_count(&self, device: i32) -> usize {
        self.devices
            .get(&device)
            .map_or(0, |d| d.triggers.len())
    }

    pub fn chip_hit_count(&self, device: i32, chip: i32) -> usize {
        self.devices
            .get(&device)
            .map_or(0, |d| d.chip_hit_count(chip))
    }

    pub fn n_hits(&self) -> usize {
        self.devices.values().map(|d| d.hits.len()).sum()
    }

    pub fn n_triggers(&self) -> usize {
        self.devices.values().map(|d| d.triggers.len()).sum()
    }
}

/// Everything read between the SpillStart and SpillEnd markers of all streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spill {
    frames: BTreeMap<i64, Frame>,
    participation_mask: BTreeMap<i32, FifoMask>,
    dead_mask: BTreeMap<i32, FifoMask>,
}

impl Spill {
    /// Frames in increasing frame index
    pub fn frames(&self) -> &BTreeMap<i64, Frame> {
        &self.frames
    }

    pub fn participation_mask(&self) -> &BTreeMap<i32, FifoMask> {
        &self.participation_mask
    }

    pub fn dead_mask(&self) -> &BTreeMap<i32, FifoMask> {
        &self.dead_mask
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.participation_mask.is_empty()
    }

    pub fn n_hits(&self) -> usize {
        self.frames.values().map(|f| f.n_hits()).sum()
    }

    pub fn n_triggers(&self) -> usize {
        self.frames.values().map(|f| f.n_triggers()).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.participation_mask.clear();
        self.dead_mask.clear();
    }

    /// Record the FIFO of a SpillStart in the participation (and maybe dead) mask
    pub(crate) fn add_start(&mut self, start: &HitRecord) {
        let bit = match u32::try_from(start.fifo)
            .ok()
            .and_then(|fifo| 1u32.checked_shl(fifo))
        {
            Some(bit) => bit,
            None => {
                spdlog::warn!(
                    "SpillStart from device {} has invalid fifo {}; ignoring it",
                    start.device,
                    start.fifo
                );
                return;
            }
        };
        *self.participation_mask.entry(start.device).or_insert(0) |= bit;
        if start.fifo_status() == Some(FifoStatus::Dead) {
            *self.dead_mask.entry(start.device).or_insert(0) |= bit;
        }
    }

    pub(crate) fn add_hit(&mut self, frame: i64, hit: HitRecord) {
        self.frames
            .entry(frame)
            .or_default()
            .devices
            .entry(hit.device)
            .or_default()
            .hits
            .push(hit);
    }

    pub(crate) fn add_trigger(&mut self, frame: i64, trigger: HitRecord) {
        self.frames
            .entry(frame)
            .or_default()
            .devices
            .entry(trigger.device)
            .or_default()
            .triggers
            .push(trigger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEAD_SENTINEL;
    use crate::hit::{make_hit, HitType};

    #[test]
    fn test_masks() {
        let mut spill = Spill::default();
        spill.add_start(&make_hit(200, 2, HitType::SpillStart, 0, 5));
        spill.add_start(&make_hit(200, 5, HitType::SpillStart, 0, DEAD_SENTINEL as i32));
        spill.add_start(&make_hit(201, 40, HitType::SpillStart, 0, 5));
        assert_eq!(spill.participation_mask()[&200], (1 << 2) | (1 << 5));
        assert_eq!(spill.dead_mask()[&200], 1 << 5);
        assert!(!spill.participation_mask().contains_key(&201));
        assert!(!spill.dead_mask().contains_key(&201));
    }

    #[test]
    fn test_channel_grouping_keeps_order() {
        let mut spill = Spill::default();
        let mut first = make_hit(200, 4, HitType::PixelHit, 0, 30);
        first.pixel = 1;
        let mut other = make_hit(200, 4, HitType::PixelHit, 0, 10);
        other.pixel = 2;
        let mut second = make_hit(200, 4, HitType::PixelHit, 0, 20);
        second.pixel = 1;
        spill.add_hit(0, first.clone());
        spill.add_hit(0, other);
        spill.add_hit(0, second.clone());

        let device = spill.frames()[&0].device(200).unwrap();
        let channels = device.channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[&(1, 1)], vec![&first, &second]);
        assert_eq!(device.chip_hit_count(1), 3);
        assert_eq!(spill.frames()[&0].chip_hit_count(200, 0), 0);
        assert_eq!(spill.n_hits(), 3);
    }
}
