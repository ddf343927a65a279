use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::RAW_RECORD_SIZE;
use super::error::{FramerError, RawStreamError};
use super::hit::HitType;
use super::raw_stream::RawStreamReader;
use super::spill::Spill;

/// Resume position of one input stream.
///
/// `next_entry` is the first record that has not been consumed by a completed spill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCursor {
    pub path: PathBuf,
    pub next_entry: u64,
    pub n_entries: u64,
}

impl StreamCursor {
    pub fn new(path: &Path) -> Self {
        let n_entries = path
            .metadata()
            .map(|m| m.len() / RAW_RECORD_SIZE)
            .unwrap_or(0);
        Self {
            path: path.to_path_buf(),
            next_entry: 0,
            n_entries,
        }
    }
}

/// The Framer merges the decoded streams of many FIFOs into spills of time frames.
///
/// Each call to [`Framer::next_spill`] scans every stream from its cursor up to (and
/// including) the next SpillEnd, bucketing pixel hits and trigger tags by
/// `coarse_time_clock / frame_size`. Streams are scanned one after the other; the time
/// alignment across streams comes only from the frame index. Only one spill is held in
/// memory: the previous one is dropped when the next is requested.
#[derive(Debug)]
pub struct Framer {
    cursors: Vec<StreamCursor>,
    frame_size: u32,
    trigger_coarse_offset: FxHashMap<i32, i32>,
    spill: Spill,
}

impl Framer {
    /// Create a Framer reading each stream from its beginning
    pub fn new(streams: &[PathBuf], frame_size: u32) -> Result<Self, FramerError> {
        let cursors = streams.iter().map(|p| StreamCursor::new(p)).collect();
        Self::from_cursors(cursors, frame_size)
    }

    /// Create a Framer from a checkpoint taken with [`Framer::checkpoint`].
    ///
    /// The checkpoint must list the same streams, in the same order.
    pub fn resume(
        streams: &[PathBuf],
        frame_size: u32,
        checkpoint: Vec<StreamCursor>,
    ) -> Result<Self, FramerError> {
        let matches = streams.len() == checkpoint.len()
            && streams.iter().zip(checkpoint.iter()).all(|(s, c)| *s == c.path);
        if !matches {
            return Err(FramerError::MismatchedCheckpoint(checkpoint.len(), streams.len()));
        }
        Self::from_cursors(checkpoint, frame_size)
    }

    fn from_cursors(cursors: Vec<StreamCursor>, frame_size: u32) -> Result<Self, FramerError> {
        if frame_size == 0 {
            return Err(FramerError::BadFrameSize(frame_size));
        }
        Ok(Self {
            cursors,
            frame_size,
            trigger_coarse_offset: FxHashMap::default(),
            spill: Spill::default(),
        })
    }

    /// Subtract `offset` from the coarse counter of every trigger tag of `device`.
    ///
    /// Must be configured before the first call to `next_spill`.
    pub fn set_trigger_coarse_offset(&mut self, device: i32, offset: i32) {
        self.trigger_coarse_offset.insert(device, offset);
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// The spill built by the last call to `next_spill`
    pub fn spill(&self) -> &Spill {
        &self.spill
    }

    pub fn checkpoint(&self) -> Vec<StreamCursor> {
        self.cursors.clone()
    }

    /// Fraction of all stream entries consumed so far
    pub fn progress(&self) -> f32 {
        let total: u64 = self.cursors.iter().map(|c| c.n_entries).sum();
        if total == 0 {
            return 1.0;
        }
        let consumed: u64 = self
            .cursors
            .iter()
            .map(|c| c.next_entry.min(c.n_entries))
            .sum();
        consumed as f32 / total as f32
    }

    /// Build the next spill.
    ///
    /// Returns true if any stream reported a SpillStart. Missing or unreadable streams
    /// are skipped for this pass. A stream which ends without a SpillEnd is consumed to
    /// its end so it is never scanned twice.
    pub fn next_spill(&mut self) -> bool {
        let mut has_data = false;
        self.spill.clear();

        for cursor in self.cursors.iter_mut() {
            let mut reader = match RawStreamReader::open(&cursor.path, cursor.next_entry) {
                Ok(r) => r,
                Err(RawStreamError::BadFilePath(path)) => {
                    spdlog::debug!("Stream {} does not exist, skipping...", path.to_string_lossy());
                    continue;
                }
                Err(e) => {
                    spdlog::warn!(
                        "Could not open stream {}: {e}; skipping...",
                        cursor.path.to_string_lossy()
                    );
                    continue;
                }
            };
            cursor.n_entries = reader.n_entries();

            loop {
                let mut hit = match reader.next_record() {
                    Ok(Some(hit)) => hit,
                    Ok(None) => break,
                    Err(RawStreamError::BadRecord(entry, e)) => {
                        spdlog::warn!(
                            "Skipping bad record {entry} in {}: {e}",
                            reader.get_filename().to_string_lossy()
                        );
                        continue;
                    }
                    Err(e) => {
                        spdlog::warn!(
                            "Stopped reading {} after IO error: {e}",
                            reader.get_filename().to_string_lossy()
                        );
                        break;
                    }
                };

                match hit.hit_type {
                    HitType::SpillStart => {
                        has_data = true;
                        spdlog::debug!(
                            "Start of spill found: device {} fifo {} entry {}",
                            hit.device,
                            hit.fifo,
                            reader.current_entry() - 1
                        );
                        self.spill.add_start(&hit);
                    }
                    HitType::PixelHit => {
                        let frame = hit.frame_index(self.frame_size);
                        self.spill.add_hit(frame, hit);
                    }
                    HitType::TriggerTag => {
                        if let Some(offset) = self.trigger_coarse_offset.get(&hit.device) {
                            hit.coarse = hit.coarse.wrapping_sub(*offset);
                        }
                        let frame = hit.frame_index(self.frame_size);
                        self.spill.add_trigger(frame, hit);
                    }
                    HitType::SpillEnd => {
                        spdlog::debug!(
                            "End of spill found: device {} fifo {} entry {}",
                            hit.device,
                            hit.fifo,
                            reader.current_entry() - 1
                        );
                        break;
                    }
                }
            }
            cursor.next_entry = reader.current_entry();
        }

        has_data
    }
}
