use hdf5::File;
use std::path::Path;

use super::constants::CALIBRATION_CHANNELS;
use super::error::CalibrationError;

const FINE_MIN_NAME: &str = "fine_min";
const FINE_MAX_NAME: &str = "fine_max";
const FINE_OFF_NAME: &str = "fine_off";
const FINE_MIN_ERR_NAME: &str = "fine_min_err";
const FINE_MAX_ERR_NAME: &str = "fine_max_err";

/// Fine-counter calibration state of a single TDC.
///
/// A channel whose minimum or maximum was never measured is `Uncalibrated`; it
/// contributes no sub-clock correction at all.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ChannelCalibration {
    #[default]
    Uncalibrated,
    Calibrated { min: f64, max: f64, offset: f64 },
}

impl ChannelCalibration {
    /// Build a channel state from raw table values. Zero min or max means uncalibrated.
    pub fn from_values(min: f64, max: f64, offset: f64) -> Self {
        if min == 0.0 || max == 0.0 {
            Self::Uncalibrated
        } else {
            Self::Calibrated { min, max, offset }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, Self::Calibrated { .. })
    }
}

/// CalibrationTable holds the fine-counter calibration of one readout unit.
///
/// Entries are indexed by the calibration index of a hit (tdc, pixel, column, chip),
/// see [`HitRecord::calibration_index`](crate::hit::HitRecord::calibration_index). The
/// table is read-only once loaded and is meant to be shared (by reference or `Arc`) by
/// everything that computes hit times.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    channels: Vec<ChannelCalibration>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            channels: vec![ChannelCalibration::Uncalibrated; CALIBRATION_CHANNELS],
        }
    }
}

impl CalibrationTable {
    /// Create a table where every channel is uncalibrated
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the calibration values of a channel
    pub fn set(
        &mut self,
        index: usize,
        min: f64,
        max: f64,
        offset: f64,
    ) -> Result<(), CalibrationError> {
        match self.channels.get_mut(index) {
            Some(channel) => {
                *channel = ChannelCalibration::from_values(min, max, offset);
                Ok(())
            }
            None => Err(CalibrationError::BadIndex(index)),
        }
    }

    /// Calibration state of a channel. Out of range indices are uncalibrated.
    pub fn get(&self, index: usize) -> ChannelCalibration {
        self.channels
            .get(index)
            .copied()
            .unwrap_or(ChannelCalibration::Uncalibrated)
    }

    pub fn n_calibrated(&self) -> usize {
        self.channels.iter().filter(|c| c.is_calibrated()).count()
    }

    /// Load a table from an HDF5 calibration store.
    ///
    /// Entries whose min or max uncertainty is not positive are left uncalibrated,
    /// whatever their nominal value.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        spdlog::info!("Loading fine calibration from {}...", path.to_string_lossy());
        let file = File::open(path)?;
        let fine_min = read_column(&file, FINE_MIN_NAME)?;
        let fine_max = read_column(&file, FINE_MAX_NAME)?;
        let fine_off = read_column(&file, FINE_OFF_NAME)?;
        let fine_min_err = read_column(&file, FINE_MIN_ERR_NAME)?;
        let fine_max_err = read_column(&file, FINE_MAX_ERR_NAME)?;

        let mut table = Self::new();
        for index in 0..CALIBRATION_CHANNELS {
            if fine_min_err[index] <= 0.0 || fine_max_err[index] <= 0.0 {
                continue;
            }
            table.channels[index] =
                ChannelCalibration::from_values(fine_min[index], fine_max[index], fine_off[index]);
        }
        spdlog::info!(
            "Loaded fine calibration: found {} calibrated channels",
            table.n_calibrated()
        );
        Ok(table)
    }

    /// Write the table to an HDF5 calibration store readable by [`CalibrationTable::load`]
    pub fn write(&self, path: &Path) -> Result<(), CalibrationError> {
        let mut fine_min = vec![0.0; CALIBRATION_CHANNELS];
        let mut fine_max = vec![0.0; CALIBRATION_CHANNELS];
        let mut fine_off = vec![0.0; CALIBRATION_CHANNELS];
        let mut fine_err = vec![0.0; CALIBRATION_CHANNELS];
        for (index, channel) in self.channels.iter().enumerate() {
            if let ChannelCalibration::Calibrated { min, max, offset } = channel {
                fine_min[index] = *min;
                fine_max[index] = *max;
                fine_off[index] = *offset;
                fine_err[index] = 1.0;
            }
        }

        let file = File::create(path)?;
        file.new_dataset_builder()
            .with_data(&fine_min)
            .create(FINE_MIN_NAME)?;
        file.new_dataset_builder()
            .with_data(&fine_max)
            .create(FINE_MAX_NAME)?;
        file.new_dataset_builder()
            .with_data(&fine_off)
            .create(FINE_OFF_NAME)?;
        file.new_dataset_builder()
            .with_data(&fine_err)
            .create(FINE_MIN_ERR_NAME)?;
        file.new_dataset_builder()
            .with_data(&fine_err)
            .create(FINE_MAX_ERR_NAME)?;
        Ok(())
    }

    /// Sub-clock phase of a fine counter value, in units of clock cycles.
    ///
    /// The late half of the fine range is wrapped to a negative phase, so the result
    /// lies in [-1, 1]. Returns 0 for `fine == 0` or an uncalibrated channel.
    pub fn phase(&self, index: usize, fine: i32) -> f64 {
        if fine == 0 {
            return 0.0;
        }
        match self.get(index) {
            ChannelCalibration::Uncalibrated => 0.0,
            ChannelCalibration::Calibrated { min, max, .. } => {
                let fine = fine as f64;
                let mut phase = (fine - min) / (max - min);
                if fine >= 0.5 * (max + min) {
                    phase -= 1.0;
                }
                phase
            }
        }
    }

    /// True if the fine value lies within `tolerance` ticks of the phase wrap cut
    pub fn is_near_cut(&self, index: usize, fine: i32, tolerance: f64) -> bool {
        if fine == 0 {
            return false;
        }
        match self.get(index) {
            ChannelCalibration::Uncalibrated => false,
            ChannelCalibration::Calibrated { min, max, .. } => {
                let cut = 0.5 * (max + min) - 0.5;
                (fine as f64 - cut).abs() < tolerance
            }
        }
    }

    /// Fixed time offset of a channel in ns. Zero when uncalibrated.
    pub fn offset(&self, index: usize) -> f64 {
        match self.get(index) {
            ChannelCalibration::Uncalibrated => 0.0,
            ChannelCalibration::Calibrated { offset, .. } => offset,
        }
    }
}

fn read_column(file: &File, name: &str) -> Result<Vec<f64>, CalibrationError> {
    let values = file.dataset(name)?.read_raw::<f64>()?;
    if values.len() != CALIBRATION_CHANNELS {
        return Err(CalibrationError::BadLength(name.to_string(), values.len()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_CUT_TOLERANCE;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sipm_framer_{}_{}.h5", name, std::process::id()))
    }

    fn sample_table() -> CalibrationTable {
        let mut table = CalibrationTable::new();
        table.set(10, 20.0, 120.0, 1.5).unwrap();
        table.set(11, 0.0, 120.0, 2.0).unwrap();
        table
    }

    #[test]
    fn test_uncalibrated_gives_no_correction() {
        let table = sample_table();
        for fine in [0, 1, 20, 70, 119, 255] {
            assert_eq!(table.phase(11, fine), 0.0);
            assert!(!table.is_near_cut(11, fine, DEFAULT_CUT_TOLERANCE));
            assert_eq!(table.phase(500, fine), 0.0);
            assert!(!table.is_near_cut(500, fine, DEFAULT_CUT_TOLERANCE));
        }
        assert_eq!(table.offset(11), 0.0);
        assert_eq!(table.phase(CALIBRATION_CHANNELS + 3, 50), 0.0);
    }

    #[test]
    fn test_zero_fine_is_sentinel() {
        let table = sample_table();
        assert_eq!(table.phase(10, 0), 0.0);
        assert!(!table.is_near_cut(10, 0, 100.0));
    }

    #[test]
    fn test_phase_bounded_and_wraps_at_midpoint() {
        let table = sample_table();
        // midpoint of [20, 120] is 70
        assert_eq!(table.phase(10, 20), 0.0);
        assert!((table.phase(10, 69) - 0.49).abs() < 1e-12);
        assert!((table.phase(10, 70) - (0.5 - 1.0)).abs() < 1e-12);
        assert!((table.phase(10, 120) - 0.0).abs() < 1e-12);
        let mut previous = table.phase(10, 20);
        for fine in 21..=120 {
            let phase = table.phase(10, fine);
            assert!(phase.abs() <= 1.0);
            let step = phase - previous;
            if fine == 70 {
                assert!((step - (0.01 - 1.0)).abs() < 1e-9);
            } else {
                assert!((step - 0.01).abs() < 1e-9);
            }
            previous = phase;
        }
    }

    #[test]
    fn test_near_cut() {
        let table = sample_table();
        // cut sits at 69.5
        assert!(table.is_near_cut(10, 69, DEFAULT_CUT_TOLERANCE));
        assert!(table.is_near_cut(10, 70, DEFAULT_CUT_TOLERANCE));
        assert!(!table.is_near_cut(10, 71, DEFAULT_CUT_TOLERANCE));
        assert!(!table.is_near_cut(10, 68, DEFAULT_CUT_TOLERANCE));
        assert!(table.is_near_cut(10, 71, 2.0));
    }

    #[test]
    fn test_set_out_of_range() {
        let mut table = CalibrationTable::new();
        assert!(matches!(
            table.set(CALIBRATION_CHANNELS, 1.0, 2.0, 0.0),
            Err(CalibrationError::BadIndex(_))
        ));
    }

    #[test]
    fn test_write_and_load() {
        let path = temp_path("calib_roundtrip");
        let table = sample_table();
        table.write(&path).unwrap();
        let loaded = CalibrationTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, table);
        assert_eq!(loaded.n_calibrated(), 1);
        assert_eq!(loaded.offset(10), 1.5);
    }

    #[test]
    fn test_load_ignores_unmeasured_bins() {
        let path = temp_path("calib_unmeasured");
        {
            let file = File::create(&path).unwrap();
            let mut min = vec![0.0; CALIBRATION_CHANNELS];
            let mut max = vec![0.0; CALIBRATION_CHANNELS];
            let off = vec![0.5; CALIBRATION_CHANNELS];
            let mut min_err = vec![0.0; CALIBRATION_CHANNELS];
            let mut max_err = vec![0.0; CALIBRATION_CHANNELS];
            min[1] = 20.0;
            max[1] = 120.0;
            min_err[1] = 0.3;
            max_err[1] = 0.3;
            // nominal values but no measured uncertainty
            min[2] = 20.0;
            max[2] = 120.0;
            min_err[2] = 0.3;
            for (name, data) in [
                (FINE_MIN_NAME, &min),
                (FINE_MAX_NAME, &max),
                (FINE_OFF_NAME, &off),
                (FINE_MIN_ERR_NAME, &min_err),
                (FINE_MAX_ERR_NAME, &max_err),
            ] {
                file.new_dataset_builder().with_data(data).create(name).unwrap();
            }
        }
        let loaded = CalibrationTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(loaded.get(1).is_calibrated());
        assert!(!loaded.get(2).is_calibrated());
        assert_eq!(loaded.offset(2), 0.0);
        assert_eq!(loaded.n_calibrated(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let path = temp_path("calib_does_not_exist");
        assert!(matches!(
            CalibrationTable::load(&path),
            Err(CalibrationError::BadFilePath(_))
        ));
    }
}
