use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE};
use super::error::ConfigError;
use super::selection::{ChipId, FrameSelector, SelectionConfig};

/// Coarse offset subtracted from the trigger tags of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOffset {
    pub device: i32,
    pub offset: i32,
}

/// Structure representing the application configuration. Contains pathing, framing and
/// selection information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub streams: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub fine_histogram_path: Option<PathBuf>,
    pub frame_size: u32,
    pub max_spills: Option<u32>,
    pub trigger_offsets: Vec<TriggerOffset>,
    pub trigger0_device: i32,
    pub timing_chips: Vec<ChipId>,
    pub tracking_chips: Vec<ChipId>,
    pub selection: SelectionConfig,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            output_path: PathBuf::from("None"),
            fine_histogram_path: None,
            frame_size: DEFAULT_FRAME_SIZE,
            max_spills: None,
            trigger_offsets: Vec::new(),
            trigger0_device: 192,
            timing_chips: vec![ChipId::new(207, 4), ChipId::new(207, 5)],
            tracking_chips: vec![ChipId::new(200, 4), ChipId::new(201, 4)],
            selection: SelectionConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Frames must be wide enough to hold a tick and narrow enough for u16 relative times
    pub fn is_frame_size_valid(&self) -> bool {
        (1..=MAX_FRAME_SIZE).contains(&self.frame_size)
    }

    pub fn has_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn need_fine_histograms(&self) -> bool {
        self.fine_histogram_path.is_some()
    }

    /// Check the configuration can be used for processing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_streams() {
            return Err(ConfigError::NoStreams);
        }
        if !self.is_frame_size_valid() {
            return Err(ConfigError::BadFrameSize(self.frame_size));
        }
        Ok(())
    }

    /// Build the frame selector described by this configuration
    pub fn frame_selector(&self) -> FrameSelector {
        FrameSelector::new(
            self.selection.clone(),
            self.trigger0_device,
            self.timing_chips.clone(),
            self.tracking_chips.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let path = std::env::temp_dir().join(format!("sipm_framer_config_{}.yml", std::process::id()));
        let mut config = Config::default();
        config.streams = vec![PathBuf::from("/data/kc705-192/fifo_0.dat")];
        config.trigger_offsets.push(TriggerOffset {
            device: 192,
            offset: 112,
        });
        config.selection.trigger0 = true;
        config.write_config_file(&path).unwrap();
        let loaded = Config::read_config_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.streams, config.streams);
        assert_eq!(loaded.trigger_offsets, config.trigger_offsets);
        assert_eq!(loaded.selection, config.selection);
        assert_eq!(loaded.frame_size, 256);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoStreams)));
        config.streams.push(PathBuf::from("a.dat"));
        config.frame_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::BadFrameSize(0))));
        config.frame_size = MAX_FRAME_SIZE + 1;
        assert!(matches!(config.validate(), Err(ConfigError::BadFrameSize(65537))));
        config.frame_size = MAX_FRAME_SIZE;
        assert!(config.validate().is_ok());
        assert!(matches!(
            Config::read_config_file(Path::new("/nonexistent/config.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
