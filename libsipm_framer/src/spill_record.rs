use std::collections::BTreeMap;

use super::error::FrameStoreError;
use super::light_hit::LightHit;
use super::spill::FifoMask;

/// Categories of channel hits kept in the frame store.
///
/// Triggers are stored separately (coarse only) and are not a HitCategory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HitCategory {
    Timing,
    Cherenkov,
    Tracking,
}

impl HitCategory {
    pub const ALL: [HitCategory; 3] = [Self::Timing, Self::Cherenkov, Self::Tracking];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Timing => "timing",
            Self::Cherenkov => "cherenkov",
            Self::Tracking => "tracking",
        }
    }
}

/// Flat arrays of one hit category for a whole spill, plus the per-frame counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitColumns {
    pub n: Vec<u16>,
    pub device: Vec<u8>,
    pub index: Vec<u8>,
    pub coarse: Vec<u16>,
    pub fine: Vec<u8>,
    pub tdc: Vec<u8>,
}

impl HitColumns {
    /// Number of hits in the spill
    pub fn size(&self) -> usize {
        self.device.len()
    }

    pub fn hit(&self, i: usize) -> LightHit {
        LightHit::new(
            self.device[i],
            self.index[i],
            self.coarse[i],
            self.fine[i],
            self.tdc[i],
        )
    }

    fn push(&mut self, hit: LightHit) {
        self.device.push(hit.device);
        self.index.push(hit.index);
        self.coarse.push(hit.coarse);
        self.fine.push(hit.fine);
        self.tdc.push(hit.tdc);
    }

    fn validate(&self, name: &str, frame_n: usize) -> Result<(), FrameStoreError> {
        let size = self.size();
        if self.n.len() != frame_n {
            return Err(FrameStoreError::Corrupted(format!(
                "{name} has {} frame counts for {frame_n} frames",
                self.n.len()
            )));
        }
        if [self.index.len(), self.coarse.len(), self.fine.len(), self.tdc.len()]
            .iter()
            .any(|len| *len != size)
        {
            return Err(FrameStoreError::Corrupted(format!(
                "{name} columns have different lengths"
            )));
        }
        let total: usize = self.n.iter().map(|n| *n as usize).sum();
        if total != size {
            return Err(FrameStoreError::Corrupted(format!(
                "{name} frame counts sum to {total} but the spill holds {size} hits"
            )));
        }
        Ok(())
    }
}

/// A whole spill in the columnar layout of the frame store.
///
/// All frames share the flat hit arrays; frame `k` of a category owns the slice
/// starting at the sum of the counts of frames `0..k`. Nothing else locates a hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpillRecord {
    pub id: u32,
    pub part_device: Vec<u8>,
    pub part_mask: Vec<FifoMask>,
    pub dead_device: Vec<u8>,
    pub dead_mask: Vec<FifoMask>,
    pub frame: Vec<u32>,
    pub trigger0_n: Vec<u16>,
    pub trigger0_coarse: Vec<u16>,
    pub timing: HitColumns,
    pub cherenkov: HitColumns,
    pub tracking: HitColumns,
}

impl SpillRecord {
    pub fn frame_n(&self) -> usize {
        self.frame.len()
    }

    pub fn trigger0_size(&self) -> usize {
        self.trigger0_coarse.len()
    }

    pub fn category(&self, category: HitCategory) -> &HitColumns {
        match category {
            HitCategory::Timing => &self.timing,
            HitCategory::Cherenkov => &self.cherenkov,
            HitCategory::Tracking => &self.tracking,
        }
    }

    fn category_mut(&mut self, category: HitCategory) -> &mut HitColumns {
        match category {
            HitCategory::Timing => &mut self.timing,
            HitCategory::Cherenkov => &mut self.cherenkov,
            HitCategory::Tracking => &mut self.tracking,
        }
    }

    /// Participation mask per device
    pub fn participation(&self) -> impl Iterator<Item = (u8, FifoMask)> + '_ {
        self.part_device
            .iter()
            .copied()
            .zip(self.part_mask.iter().copied())
    }

    /// Dead mask per device
    pub fn dead(&self) -> impl Iterator<Item = (u8, FifoMask)> + '_ {
        self.dead_device
            .iter()
            .copied()
            .zip(self.dead_mask.iter().copied())
    }

    /// Check that every count agrees with the arrays it describes
    pub fn validate(&self) -> Result<(), FrameStoreError> {
        if self.part_device.len() != self.part_mask.len() {
            return Err(FrameStoreError::Corrupted(String::from(
                "participation devices and masks differ in length",
            )));
        }
        if self.dead_device.len() != self.dead_mask.len() {
            return Err(FrameStoreError::Corrupted(String::from(
                "dead devices and masks differ in length",
            )));
        }
        let frame_n = self.frame_n();
        if self.trigger0_n.len() != frame_n {
            return Err(FrameStoreError::Corrupted(format!(
                "trigger0 has {} frame counts for {frame_n} frames",
                self.trigger0_n.len()
            )));
        }
        let trigger_total: usize = self.trigger0_n.iter().map(|n| *n as usize).sum();
        if trigger_total != self.trigger0_size() {
            return Err(FrameStoreError::Corrupted(format!(
                "trigger0 frame counts sum to {trigger_total} but the spill holds {} triggers",
                self.trigger0_size()
            )));
        }
        for category in HitCategory::ALL {
            self.category(category).validate(category.name(), frame_n)?;
        }
        Ok(())
    }

    /// Start reading the frames of this spill from the first one
    pub fn frames(&self) -> Result<SpillCursor<'_>, FrameStoreError> {
        self.validate()?;
        Ok(SpillCursor {
            record: self,
            frame_current: 0,
            trigger0_offset: 0,
            offsets: [0; 3],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Idle,
    InSpill,
    InFrame,
}

/// Accumulates one spill through the write protocol of the frame store:
/// `new_spill`, then `add_part`/`add_dead`, then `new_frame` followed by the hits of
/// that frame, repeated, and finally `finish`.
///
/// Calls out of that order are rejected instead of corrupting the counts.
#[derive(Debug, Clone)]
pub struct SpillBuilder {
    record: SpillRecord,
    state: BuilderState,
}

impl Default for SpillBuilder {
    fn default() -> Self {
        Self {
            record: SpillRecord::default(),
            state: BuilderState::Idle,
        }
    }
}

impl SpillBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_spill(&mut self, id: u32) {
        self.record = SpillRecord {
            id,
            ..Default::default()
        };
        self.state = BuilderState::InSpill;
    }

    pub fn new_frame(&mut self, frame_id: u32) -> Result<(), FrameStoreError> {
        if self.state == BuilderState::Idle {
            return Err(FrameStoreError::NoOpenSpill);
        }
        self.record.frame.push(frame_id);
        self.record.trigger0_n.push(0);
        for category in HitCategory::ALL {
            self.record.category_mut(category).n.push(0);
        }
        self.state = BuilderState::InFrame;
        Ok(())
    }

    pub fn add_part(&mut self, device: u8, mask: FifoMask) -> Result<(), FrameStoreError> {
        if self.state == BuilderState::Idle {
            return Err(FrameStoreError::NoOpenSpill);
        }
        self.record.part_device.push(device);
        self.record.part_mask.push(mask);
        Ok(())
    }

    pub fn add_dead(&mut self, device: u8, mask: FifoMask) -> Result<(), FrameStoreError> {
        if self.state == BuilderState::Idle {
            return Err(FrameStoreError::NoOpenSpill);
        }
        self.record.dead_device.push(device);
        self.record.dead_mask.push(mask);
        Ok(())
    }

    pub fn add_trigger0(&mut self, coarse: u16) -> Result<(), FrameStoreError> {
        self.check_frame()?;
        let count = last_count(&mut self.record.trigger0_n)?;
        *count = increment(*count, "trigger0_n")?;
        self.record.trigger0_coarse.push(coarse);
        Ok(())
    }

    pub fn add_hit(&mut self, category: HitCategory, hit: LightHit) -> Result<(), FrameStoreError> {
        self.check_frame()?;
        let columns = self.record.category_mut(category);
        let count = last_count(&mut columns.n)?;
        *count = increment(*count, category.name())?;
        columns.push(hit);
        Ok(())
    }

    pub fn add_timing(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.add_hit(HitCategory::Timing, hit)
    }

    pub fn add_cherenkov(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.add_hit(HitCategory::Cherenkov, hit)
    }

    pub fn add_tracking(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.add_hit(HitCategory::Tracking, hit)
    }

    /// The spill being built, if any
    pub fn current(&self) -> Option<&SpillRecord> {
        match self.state {
            BuilderState::Idle => None,
            _ => Some(&self.record),
        }
    }

    /// Hand out the finished spill. A new `new_spill` must precede further writes.
    pub fn finish(&mut self) -> Result<SpillRecord, FrameStoreError> {
        if self.state == BuilderState::Idle {
            return Err(FrameStoreError::NoOpenSpill);
        }
        self.state = BuilderState::Idle;
        Ok(std::mem::take(&mut self.record))
    }

    fn check_frame(&self) -> Result<(), FrameStoreError> {
        match self.state {
            BuilderState::Idle => Err(FrameStoreError::NoOpenSpill),
            BuilderState::InSpill => Err(FrameStoreError::NoOpenFrame),
            BuilderState::InFrame => Ok(()),
        }
    }
}

fn last_count(counts: &mut [u16]) -> Result<&mut u16, FrameStoreError> {
    counts.last_mut().ok_or(FrameStoreError::NoOpenFrame)
}

fn increment(count: u16, field: &'static str) -> Result<u16, FrameStoreError> {
    count.checked_add(1).ok_or(FrameStoreError::ValueOutOfRange {
        field,
        value: count as i64 + 1,
    })
}

/// The hits of one frame, rebuilt from a SpillRecord
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightFrame {
    pub id: u32,
    pub trigger0: Vec<LightHit>,
    pub timing: Vec<LightHit>,
    pub cherenkov: Vec<LightHit>,
    pub tracking: Vec<LightHit>,
}

impl LightFrame {
    pub fn hits(&self, category: HitCategory) -> &[LightHit] {
        match category {
            HitCategory::Timing => &self.timing,
            HitCategory::Cherenkov => &self.cherenkov,
            HitCategory::Tracking => &self.tracking,
        }
    }

    /// Hits of a category grouped by (device, device channel), in storage order.
    ///
    /// Callers needing time order must sort each list, e.g. with
    /// [`compare_coarse`](crate::light_hit::compare_coarse).
    pub fn hit_map(&self, category: HitCategory) -> BTreeMap<(u8, u8), Vec<LightHit>> {
        let mut map: BTreeMap<(u8, u8), Vec<LightHit>> = BTreeMap::new();
        for hit in self.hits(category) {
            map.entry((hit.device, hit.index)).or_default().push(*hit);
        }
        map
    }

    pub fn timing_map(&self) -> BTreeMap<(u8, u8), Vec<LightHit>> {
        self.hit_map(HitCategory::Timing)
    }

    pub fn cherenkov_map(&self) -> BTreeMap<(u8, u8), Vec<LightHit>> {
        self.hit_map(HitCategory::Cherenkov)
    }

    pub fn tracking_map(&self) -> BTreeMap<(u8, u8), Vec<LightHit>> {
        self.hit_map(HitCategory::Tracking)
    }
}

/// Sequential reader over the frames of one SpillRecord.
///
/// Keeps one read offset per category; each frame consumes its stored counts.
#[derive(Debug, Clone)]
pub struct SpillCursor<'a> {
    record: &'a SpillRecord,
    frame_current: usize,
    trigger0_offset: usize,
    offsets: [usize; 3],
}

impl SpillCursor<'_> {
    /// Index (within the spill) of the next frame to be read
    pub fn current_frame(&self) -> usize {
        self.frame_current
    }

    /// Slice out the next frame, or None once the spill is exhausted
    pub fn next_frame(&mut self) -> Option<LightFrame> {
        let record = self.record;
        if self.frame_current >= record.frame_n() {
            return None;
        }
        let iframe = self.frame_current;

        let n_triggers = record.trigger0_n[iframe] as usize;
        let trigger0 = record.trigger0_coarse[self.trigger0_offset..self.trigger0_offset + n_triggers]
            .iter()
            .map(|coarse| LightHit::trigger(*coarse))
            .collect();
        self.trigger0_offset += n_triggers;

        let mut frame = LightFrame {
            id: record.frame[iframe],
            trigger0,
            ..Default::default()
        };
        for (slot, category) in HitCategory::ALL.into_iter().enumerate() {
            let columns = record.category(category);
            let n_hits = columns.n[iframe] as usize;
            let offset = self.offsets[slot];
            let hits: Vec<LightHit> = (offset..offset + n_hits).map(|i| columns.hit(i)).collect();
            match category {
                HitCategory::Timing => frame.timing = hits,
                HitCategory::Cherenkov => frame.cherenkov = hits,
                HitCategory::Tracking => frame.tracking = hits,
            }
            self.offsets[slot] += n_hits;
        }

        self.frame_current += 1;
        Some(frame)
    }
}

impl Iterator for SpillCursor<'_> {
    type Item = LightFrame;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> SpillRecord {
    let mut builder = SpillBuilder::new();
    builder.new_spill(3);
    builder.add_part(192, 0b1).unwrap();
    builder.add_part(207, 0b110000).unwrap();
    builder.add_dead(207, 0b100000).unwrap();

    builder.new_frame(10).unwrap();
    builder.add_trigger0(17).unwrap();
    builder.add_timing(LightHit::new(207, 130, 20, 44, 1)).unwrap();
    builder.add_cherenkov(LightHit::new(192, 5, 30, 60, 2)).unwrap();
    builder.add_cherenkov(LightHit::new(192, 6, 31, 61, 3)).unwrap();
    builder.add_cherenkov(LightHit::new(192, 5, 25, 62, 0)).unwrap();

    builder.new_frame(11).unwrap();

    builder.new_frame(40).unwrap();
    builder.add_trigger0(3).unwrap();
    builder.add_trigger0(200).unwrap();
    builder.add_tracking(LightHit::new(200, 140, 1, 2, 3)).unwrap();
    builder.add_cherenkov(LightHit::new(193, 7, 90, 91, 1)).unwrap();
    builder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sum_to_totals() {
        let record = sample_record();
        assert_eq!(record.id, 3);
        assert_eq!(record.frame, vec![10, 11, 40]);
        assert_eq!(record.trigger0_n, vec![1, 0, 2]);
        assert_eq!(record.trigger0_size(), 3);
        assert_eq!(record.cherenkov.n, vec![3, 0, 1]);
        assert_eq!(record.cherenkov.size(), 4);
        assert_eq!(record.timing.size(), 1);
        assert_eq!(record.tracking.n, vec![0, 0, 1]);
        assert!(record.validate().is_ok());
        assert_eq!(record.participation().collect::<Vec<_>>(), vec![(192, 1), (207, 0b110000)]);
        assert_eq!(record.dead().collect::<Vec<_>>(), vec![(207, 0b100000)]);
    }

    #[test]
    fn test_read_back_frames() {
        let record = sample_record();
        let mut cursor = record.frames().unwrap();

        let first = cursor.next_frame().unwrap();
        assert_eq!(first.id, 10);
        assert_eq!(first.trigger0, vec![LightHit::trigger(17)]);
        assert_eq!(first.timing, vec![LightHit::new(207, 130, 20, 44, 1)]);
        assert_eq!(
            first.cherenkov,
            vec![
                LightHit::new(192, 5, 30, 60, 2),
                LightHit::new(192, 6, 31, 61, 3),
                LightHit::new(192, 5, 25, 62, 0),
            ]
        );
        let map = first.cherenkov_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&(192, 5)].iter().map(|h| h.coarse).collect::<Vec<_>>(), vec![30, 25]);
        assert!(first.tracking_map().is_empty());

        let empty = cursor.next_frame().unwrap();
        assert_eq!(empty.id, 11);
        assert!(empty.trigger0.is_empty() && empty.timing.is_empty());
        assert!(empty.cherenkov.is_empty() && empty.tracking.is_empty());

        let last = cursor.next_frame().unwrap();
        assert_eq!(last.id, 40);
        assert_eq!(last.trigger0.len(), 2);
        assert_eq!(last.tracking, vec![LightHit::new(200, 140, 1, 2, 3)]);
        assert_eq!(last.cherenkov, vec![LightHit::new(193, 7, 90, 91, 1)]);
        assert_eq!(last.timing_map().len(), 0);

        assert_eq!(cursor.current_frame(), 3);
        assert!(cursor.next_frame().is_none());
        // a fresh cursor starts over
        assert_eq!(record.frames().unwrap().count(), 3);
    }

    #[test]
    fn test_contract_violations() {
        let mut builder = SpillBuilder::new();
        assert!(matches!(builder.new_frame(1), Err(FrameStoreError::NoOpenSpill)));
        assert!(matches!(builder.add_part(1, 1), Err(FrameStoreError::NoOpenSpill)));
        assert!(matches!(builder.add_trigger0(1), Err(FrameStoreError::NoOpenSpill)));
        assert!(matches!(builder.finish(), Err(FrameStoreError::NoOpenSpill)));
        builder.new_spill(0);
        assert!(matches!(
            builder.add_timing(LightHit::default()),
            Err(FrameStoreError::NoOpenFrame)
        ));
        assert!(matches!(builder.add_trigger0(1), Err(FrameStoreError::NoOpenFrame)));
        builder.new_frame(0).unwrap();
        builder.add_trigger0(1).unwrap();
        builder.finish().unwrap();
        assert!(matches!(builder.add_trigger0(1), Err(FrameStoreError::NoOpenSpill)));
        assert!(builder.current().is_none());
    }

    #[test]
    fn test_inconsistent_record_is_rejected() {
        let mut record = sample_record();
        record.cherenkov.n[0] = 2;
        assert!(matches!(record.frames(), Err(FrameStoreError::Corrupted(_))));
        let mut record = sample_record();
        record.timing.fine.pop();
        assert!(matches!(record.validate(), Err(FrameStoreError::Corrupted(_))));
    }
}
