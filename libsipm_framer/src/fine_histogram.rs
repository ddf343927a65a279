use hdf5::File;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

use super::constants::{CALIBRATION_CHANNELS, FINE_BINS, TDCS_PER_PIXEL};
use super::error::FineHistogramError;
use super::hit::HitRecord;
use super::spill::Spill;

/// Raw fine-counter distributions, one 768x256 matrix per device.
///
/// Rows are `tdc + 4 * device_channel`, columns the fine counter value. These are the
/// input of the fine calibration fit.
#[derive(Debug, Clone, Default)]
pub struct FineHistograms {
    histograms: BTreeMap<i32, Array2<u32>>,
}

impl FineHistograms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one pixel hit. Values outside the matrix are ignored.
    pub fn fill(&mut self, hit: &HitRecord) {
        let row = hit.tdc + TDCS_PER_PIXEL * hit.device_channel();
        let (Ok(row), Ok(col)) = (usize::try_from(row), usize::try_from(hit.fine)) else {
            return;
        };
        if row >= CALIBRATION_CHANNELS || col >= FINE_BINS {
            return;
        }
        let histogram = self
            .histograms
            .entry(hit.device)
            .or_insert_with(|| Array2::zeros((CALIBRATION_CHANNELS, FINE_BINS)));
        histogram[[row, col]] += 1;
    }

    /// Count every pixel hit of a spill
    pub fn fill_spill(&mut self, spill: &Spill) {
        for frame in spill.frames().values() {
            for (_, device) in frame.devices() {
                for hit in device.hits() {
                    self.fill(hit);
                }
            }
        }
    }

    pub fn get(&self, device: i32) -> Option<&Array2<u32>> {
        self.histograms.get(&device)
    }

    pub fn n_entries(&self, device: i32) -> u64 {
        self.histograms
            .get(&device)
            .map_or(0, |h| h.iter().map(|v| *v as u64).sum())
    }

    /// Write one dataset `fine_<device>` per device
    pub fn write(&self, path: &Path) -> Result<(), FineHistogramError> {
        let file = File::create(path)?;
        for (device, histogram) in self.histograms.iter() {
            file.new_dataset_builder()
                .with_data(histogram)
                .create(format!("fine_{device}").as_str())?;
        }
        spdlog::info!(
            "Fine histograms for {} devices written to {}",
            self.histograms.len(),
            path.to_string_lossy()
        );
        Ok(())
    }
}
