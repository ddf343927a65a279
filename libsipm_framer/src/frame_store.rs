use hdf5::types::VarLenUnicode;
use hdf5::{File, Group, H5Type};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::FrameStoreError;
use super::light_hit::LightHit;
use super::spill::FifoMask;
use super::spill_record::{HitCategory, HitColumns, SpillBuilder, SpillRecord};

const SPILLS_NAME: &str = "spills";
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

// Structure
// spills - min_spill, max_spill, n_spills, frame_size, version
// |---- spill_#  - id, part_n, dead_n, frame_n, trigger0_size, timing_size, cherenkov_size, tracking_size
// |    |---- part_device, part_mask, dead_device, dead_mask (dset)
// |    |---- frame, trigger0_n, trigger0_coarse (dset)
// |    |---- <category>_n, _device, _index, _coarse, _fine, _tdc (dset) for timing, cherenkov, tracking
// Datasets of length zero are not written.

/// Writes spills to an HDF5 frame store.
///
/// The write protocol is `new_spill`, masks, then `new_frame` + hits per frame, then
/// `fill` to commit the spill. The summary attributes are rewritten after every
/// committed spill; `close` flushes the file.
#[derive(Debug)]
pub struct FrameStoreWriter {
    file_handle: File,
    file_path: PathBuf,
    spills_group: Group,
    builder: SpillBuilder,
    n_spills: u32,
    first_spill: Option<u32>,
    last_spill: u32,
    n_frames: u64,
}

impl FrameStoreWriter {
    /// Create the store at path. `frame_size` is recorded for readers.
    pub fn new(path: &Path, frame_size: u32) -> Result<Self, FrameStoreError> {
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);

        let spills_group = file_handle.create_group(SPILLS_NAME)?;
        spills_group.new_attr::<u32>().create("min_spill")?;
        spills_group.new_attr::<u32>().create("max_spill")?;
        spills_group.new_attr::<u32>().create("n_spills")?;
        spills_group
            .new_attr::<u32>()
            .create("frame_size")?
            .write_scalar(&frame_size)?;
        spills_group
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&VarLenUnicode::from_str(&version).map_err(|_| {
                FrameStoreError::Corrupted(format!("invalid version string {version}"))
            })?)?;

        Ok(Self {
            file_handle,
            file_path: path.to_path_buf(),
            spills_group,
            builder: SpillBuilder::new(),
            n_spills: 0,
            first_spill: None,
            last_spill: 0,
            n_frames: 0,
        })
    }

    pub fn new_spill(&mut self, id: u32) {
        spdlog::debug!("New spill: {id}");
        self.builder.new_spill(id);
    }

    pub fn new_frame(&mut self, frame_id: u32) -> Result<(), FrameStoreError> {
        self.builder.new_frame(frame_id)
    }

    pub fn add_part(&mut self, device: u8, mask: FifoMask) -> Result<(), FrameStoreError> {
        self.builder.add_part(device, mask)
    }

    pub fn add_dead(&mut self, device: u8, mask: FifoMask) -> Result<(), FrameStoreError> {
        self.builder.add_dead(device, mask)
    }

    pub fn add_trigger0(&mut self, coarse: u16) -> Result<(), FrameStoreError> {
        self.builder.add_trigger0(coarse)
    }

    pub fn add_timing(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.builder.add_timing(hit)
    }

    pub fn add_cherenkov(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.builder.add_cherenkov(hit)
    }

    pub fn add_tracking(&mut self, hit: LightHit) -> Result<(), FrameStoreError> {
        self.builder.add_tracking(hit)
    }

    pub fn add_hit(&mut self, category: HitCategory, hit: LightHit) -> Result<(), FrameStoreError> {
        self.builder.add_hit(category, hit)
    }

    /// Commit the current spill to the file
    pub fn fill(&mut self) -> Result<(), FrameStoreError> {
        let record = self.builder.finish()?;
        spdlog::info!(
            "Fill spill {}: {} frames, trigger0 = {}, timing = {}, cherenkov = {}, tracking = {}",
            record.id,
            record.frame_n(),
            record.trigger0_size(),
            record.timing.size(),
            record.cherenkov.size(),
            record.tracking.size()
        );
        self.write_record(&record)
    }

    /// Append an already built spill
    pub fn write_record(&mut self, record: &SpillRecord) -> Result<(), FrameStoreError> {
        record.validate()?;
        let spill_group = self
            .spills_group
            .create_group(&format!("spill_{}", self.n_spills))?;

        write_scalar(&spill_group, "id", record.id)?;
        write_scalar(&spill_group, "part_n", record.part_device.len() as u32)?;
        write_scalar(&spill_group, "dead_n", record.dead_device.len() as u32)?;
        write_scalar(&spill_group, "frame_n", record.frame_n() as u32)?;
        write_scalar(&spill_group, "trigger0_size", record.trigger0_size() as u32)?;

        write_column(&spill_group, "part_device", &record.part_device)?;
        write_column(&spill_group, "part_mask", &record.part_mask)?;
        write_column(&spill_group, "dead_device", &record.dead_device)?;
        write_column(&spill_group, "dead_mask", &record.dead_mask)?;
        write_column(&spill_group, "frame", &record.frame)?;
        write_column(&spill_group, "trigger0_n", &record.trigger0_n)?;
        write_column(&spill_group, "trigger0_coarse", &record.trigger0_coarse)?;

        for category in HitCategory::ALL {
            let name = category.name();
            let columns = record.category(category);
            write_scalar(&spill_group, &format!("{name}_size"), columns.size() as u32)?;
            write_column(&spill_group, &format!("{name}_n"), &columns.n)?;
            write_column(&spill_group, &format!("{name}_device"), &columns.device)?;
            write_column(&spill_group, &format!("{name}_index"), &columns.index)?;
            write_column(&spill_group, &format!("{name}_coarse"), &columns.coarse)?;
            write_column(&spill_group, &format!("{name}_fine"), &columns.fine)?;
            write_column(&spill_group, &format!("{name}_tdc"), &columns.tdc)?;
        }

        if self.first_spill.is_none() {
            self.first_spill = Some(record.id);
        }
        self.last_spill = record.id;
        self.n_spills += 1;
        self.n_frames += record.frame_n() as u64;
        self.write_summary()
    }

    /// Keep the root attributes in step with the committed spills, so a store whose
    /// writer never reaches `close` still reads back every filled spill
    fn write_summary(&self) -> Result<(), FrameStoreError> {
        self.spills_group
            .attr("min_spill")?
            .write_scalar(&self.first_spill.unwrap_or(0))?;
        self.spills_group
            .attr("max_spill")?
            .write_scalar(&self.last_spill)?;
        self.spills_group
            .attr("n_spills")?
            .write_scalar(&self.n_spills)?;
        Ok(())
    }

    pub fn get_n_spills(&self) -> u32 {
        self.n_spills
    }

    /// Write the summary attributes, consume the writer
    pub fn close(self) -> Result<(), FrameStoreError> {
        self.write_summary()?;
        self.file_handle.flush()?;
        spdlog::info!(
            "{} spills and {} frames written to {}",
            self.n_spills,
            self.n_frames,
            self.file_path.to_string_lossy()
        );
        Ok(())
    }
}

/// Reads spills back from an HDF5 frame store, in the order they were written.
///
/// Each call to [`FrameStoreReader::next_spill`] hands out an owned [`SpillRecord`];
/// its frames are then walked with [`SpillRecord::frames`].
#[allow(dead_code)]
#[derive(Debug)]
pub struct FrameStoreReader {
    file_handle: File,
    spills_group: Group,
    n_spills: u32,
    frame_size: u32,
    spill_current: u32,
}

impl FrameStoreReader {
    pub fn open(path: &Path) -> Result<Self, FrameStoreError> {
        if !path.exists() {
            return Err(FrameStoreError::BadFilePath(path.to_path_buf()));
        }
        let file_handle = File::open(path)?;
        let spills_group = file_handle.group(SPILLS_NAME)?;
        let n_spills = spills_group.attr("n_spills")?.read_scalar::<u32>()?;
        let frame_size = spills_group.attr("frame_size")?.read_scalar::<u32>()?;
        Ok(Self {
            file_handle,
            spills_group,
            n_spills,
            frame_size,
            spill_current: 0,
        })
    }

    pub fn n_spills(&self) -> u32 {
        self.n_spills
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// Position (in file order) of the next spill to be read
    pub fn current_spill(&self) -> u32 {
        self.spill_current
    }

    /// Go back to the first spill
    pub fn reset(&mut self) {
        self.spill_current = 0;
    }

    /// Load the next spill, or None once every spill has been read
    pub fn next_spill(&mut self) -> Result<Option<SpillRecord>, FrameStoreError> {
        if self.spill_current >= self.n_spills {
            return Ok(None);
        }
        let record = self.read_spill(self.spill_current)?;
        self.spill_current += 1;
        Ok(Some(record))
    }

    /// Load the spill at a given position in the file
    pub fn read_spill(&self, position: u32) -> Result<SpillRecord, FrameStoreError> {
        let group = self.spills_group.group(&format!("spill_{position}"))?;
        let part_n = read_scalar(&group, "part_n")? as usize;
        let dead_n = read_scalar(&group, "dead_n")? as usize;
        let frame_n = read_scalar(&group, "frame_n")? as usize;
        let trigger0_size = read_scalar(&group, "trigger0_size")? as usize;

        let mut record = SpillRecord {
            id: read_scalar(&group, "id")?,
            part_device: read_column(&group, "part_device", part_n)?,
            part_mask: read_column(&group, "part_mask", part_n)?,
            dead_device: read_column(&group, "dead_device", dead_n)?,
            dead_mask: read_column(&group, "dead_mask", dead_n)?,
            frame: read_column(&group, "frame", frame_n)?,
            trigger0_n: read_column(&group, "trigger0_n", frame_n)?,
            trigger0_coarse: read_column(&group, "trigger0_coarse", trigger0_size)?,
            ..Default::default()
        };
        for category in HitCategory::ALL {
            let name = category.name();
            let size = read_scalar(&group, &format!("{name}_size"))? as usize;
            let columns = HitColumns {
                n: read_column(&group, &format!("{name}_n"), frame_n)?,
                device: read_column(&group, &format!("{name}_device"), size)?,
                index: read_column(&group, &format!("{name}_index"), size)?,
                coarse: read_column(&group, &format!("{name}_coarse"), size)?,
                fine: read_column(&group, &format!("{name}_fine"), size)?,
                tdc: read_column(&group, &format!("{name}_tdc"), size)?,
            };
            match category {
                HitCategory::Timing => record.timing = columns,
                HitCategory::Cherenkov => record.cherenkov = columns,
                HitCategory::Tracking => record.tracking = columns,
            }
        }
        record.validate()?;
        Ok(record)
    }
}

fn write_scalar(group: &Group, name: &str, value: u32) -> Result<(), FrameStoreError> {
    group.new_attr::<u32>().create(name)?.write_scalar(&value)?;
    Ok(())
}

fn read_scalar(group: &Group, name: &str) -> Result<u32, FrameStoreError> {
    Ok(group.attr(name)?.read_scalar::<u32>()?)
}

fn write_column<T: H5Type>(group: &Group, name: &str, data: &[T]) -> Result<(), FrameStoreError> {
    if data.is_empty() {
        return Ok(());
    }
    group.new_dataset_builder().with_data(data).create(name)?;
    Ok(())
}

fn read_column<T: H5Type>(group: &Group, name: &str, len: usize) -> Result<Vec<T>, FrameStoreError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let data = group.dataset(name)?.read_raw::<T>()?;
    if data.len() != len {
        return Err(FrameStoreError::Corrupted(format!(
            "dataset {name} has length {} but {len} entries were expected",
            data.len()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spill_record::sample_record;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sipm_framer_{}_{}.h5", name, std::process::id()))
    }

    #[test]
    fn test_write_and_read_spills() {
        let path = temp_path("store_roundtrip");
        let mut writer = FrameStoreWriter::new(&path, 256).unwrap();

        // spill 0 through the write protocol
        writer.new_spill(0);
        writer.add_part(192, 0b11).unwrap();
        writer.new_frame(4).unwrap();
        writer.add_trigger0(12).unwrap();
        writer.add_cherenkov(LightHit::new(192, 33, 15, 70, 2)).unwrap();
        writer.new_frame(9).unwrap();
        writer.add_timing(LightHit::new(207, 130, 1, 0, 0)).unwrap();
        writer.fill().unwrap();

        // spill 1 with no frames at all
        writer.new_spill(1);
        writer.add_part(193, 0b1).unwrap();
        writer.add_dead(193, 0b1).unwrap();
        writer.fill().unwrap();

        // spill 2 prebuilt
        let sample = sample_record();
        writer.write_record(&sample).unwrap();
        assert_eq!(writer.get_n_spills(), 3);
        writer.close().unwrap();

        let mut reader = FrameStoreReader::open(&path).unwrap();
        assert_eq!(reader.n_spills(), 3);
        assert_eq!(reader.frame_size(), 256);

        let first = reader.next_spill().unwrap().unwrap();
        assert_eq!(first.part_device, vec![192]);
        let frames: Vec<_> = first.frames().unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, 4);
        assert_eq!(frames[0].trigger0, vec![LightHit::trigger(12)]);
        assert_eq!(frames[0].cherenkov, vec![LightHit::new(192, 33, 15, 70, 2)]);
        assert!(frames[0].timing.is_empty());
        assert_eq!(frames[1].timing, vec![LightHit::new(207, 130, 1, 0, 0)]);

        let second = reader.next_spill().unwrap().unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(second.frame_n(), 0);
        assert_eq!(second.dead().collect::<Vec<_>>(), vec![(193, 1)]);
        assert!(second.frames().unwrap().next_frame().is_none());

        let third = reader.next_spill().unwrap().unwrap();
        assert_eq!(third, sample);
        assert!(reader.next_spill().unwrap().is_none());

        reader.reset();
        assert_eq!(reader.next_spill().unwrap().unwrap(), first);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_filled_spills_survive_without_close() {
        let path = temp_path("store_no_close");
        {
            let mut writer = FrameStoreWriter::new(&path, 256).unwrap();
            writer.new_spill(7);
            writer.add_part(192, 0b1).unwrap();
            writer.new_frame(2).unwrap();
            writer.add_trigger0(40).unwrap();
            writer.fill().unwrap();
            // a spill left open is not committed
            writer.new_spill(8);
            writer.new_frame(0).unwrap();
        }
        let mut reader = FrameStoreReader::open(&path).unwrap();
        assert_eq!(reader.n_spills(), 1);
        let spill = reader.next_spill().unwrap().unwrap();
        assert_eq!(spill.id, 7);
        assert_eq!(spill.frame, vec![2]);
        assert_eq!(spill.trigger0_coarse, vec![40]);
        assert!(reader.next_spill().unwrap().is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_writer_rejects_out_of_order_calls() {
        let path = temp_path("store_contract");
        let mut writer = FrameStoreWriter::new(&path, 256).unwrap();
        assert!(matches!(writer.fill(), Err(FrameStoreError::NoOpenSpill)));
        writer.new_spill(0);
        assert!(matches!(
            writer.add_tracking(LightHit::default()),
            Err(FrameStoreError::NoOpenFrame)
        ));
        writer.close().unwrap();
        let reader = FrameStoreReader::open(&path).unwrap();
        assert_eq!(reader.n_spills(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_missing_store() {
        let path = temp_path("store_missing");
        assert!(matches!(
            FrameStoreReader::open(&path),
            Err(FrameStoreError::BadFilePath(_))
        ));
    }
}
