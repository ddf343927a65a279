use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::{FrameStoreError, ProcessorError};
use super::fine_histogram::FineHistograms;
use super::frame_store::FrameStoreWriter;
use super::framer::Framer;
use super::light_hit::LightHit;
use super::selection::FrameSelector;
use super::spill::Spill;
use super::worker_status::WorkerStatus;

/// Narrow a value to the width used in the frame store
fn narrow<T: TryFrom<i64>>(field: &'static str, value: i64) -> Result<T, FrameStoreError> {
    T::try_from(value).map_err(|_| FrameStoreError::ValueOutOfRange { field, value })
}

/// Write one spill built by the Framer to the frame store.
///
/// Frames are visited in increasing index; frames rejected by the selector are not
/// written at all. Frames before the spill start (negative index, from trigger tags
/// shifted by their coarse offset) are dropped with a warning. Coarse times are stored
/// relative to the start of their frame. Returns the number of frames written.
pub fn write_spill(
    writer: &mut FrameStoreWriter,
    spill: &Spill,
    spill_id: u32,
    frame_size: u32,
    selector: &FrameSelector,
) -> Result<usize, ProcessorError> {
    writer.new_spill(spill_id);
    for (device, mask) in spill.participation_mask() {
        writer.add_part(narrow("part_device", *device as i64)?, *mask)?;
    }
    for (device, mask) in spill.dead_mask() {
        writer.add_dead(narrow("dead_device", *device as i64)?, *mask)?;
    }

    let mut n_frames = 0;
    for (iframe, frame) in spill.frames() {
        if *iframe < 0 {
            spdlog::warn!(
                "Spill {spill_id}: dropping frame {iframe} before the spill start ({} triggers, {} hits)",
                frame.n_triggers(),
                frame.n_hits()
            );
            continue;
        }
        if !selector.accept(frame) {
            continue;
        }
        writer.new_frame(narrow("frame", *iframe)?)?;
        let frame_start = *iframe * frame_size as i64;

        if let Some(trigger_device) = frame.device(selector.trigger0_device()) {
            for trigger in trigger_device.triggers() {
                writer.add_trigger0(narrow(
                    "trigger0_coarse",
                    trigger.coarse_time_clock() - frame_start,
                )?)?;
            }
        }

        for (device, device_frame) in frame.devices() {
            for ((chip, _), hits) in device_frame.channels() {
                let category = selector.category(*device, chip);
                for hit in hits {
                    let light = LightHit::new(
                        narrow("device", hit.device as i64)?,
                        narrow("index", hit.device_channel() as i64)?,
                        narrow("coarse", hit.coarse_time_clock() - frame_start)?,
                        narrow("fine", hit.fine as i64)?,
                        narrow("tdc", hit.tdc as i64)?,
                    );
                    writer.add_hit(category, light)?;
                }
            }
        }
        n_frames += 1;
    }
    writer.fill()?;
    Ok(n_frames)
}

/// The main loop of the framer.
///
/// This takes in a config (and progress monitor), frames every spill of the input
/// streams and writes them to the frame store (and optionally the fine histograms).
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    config.validate()?;
    spdlog::info!(
        "Initializing framer over {} streams: frame size = {}",
        config.streams.len(),
        config.frame_size
    );
    let total_size: u64 = config
        .streams
        .iter()
        .filter_map(|p| p.metadata().ok())
        .map(|m| m.len())
        .sum();
    spdlog::info!("Total input size: {}", human_bytes::human_bytes(total_size as f64));

    let mut framer = Framer::new(&config.streams, config.frame_size)?;
    for offset in config.trigger_offsets.iter() {
        spdlog::info!(
            "Trigger coarse offset for device {}: {}",
            offset.device,
            offset.offset
        );
        framer.set_trigger_coarse_offset(offset.device, offset.offset);
    }
    let selector = config.frame_selector();
    let mut writer = FrameStoreWriter::new(&config.output_path, config.frame_size)?;
    let mut histograms = if config.need_fine_histograms() {
        Some(FineHistograms::new())
    } else {
        None
    };

    let mut n_spills: u32 = 0;
    let mut n_frames: u64 = 0;
    tx.send(WorkerStatus::new(0.0, n_spills, n_frames))?;
    while config.max_spills.map_or(true, |max| n_spills < max) && framer.next_spill() {
        let spill = framer.spill();
        if let Some(histograms) = histograms.as_mut() {
            histograms.fill_spill(spill);
        }
        let written = write_spill(&mut writer, spill, n_spills, config.frame_size, &selector)?;
        spdlog::info!(
            "Spill {n_spills}: {} of {} frames written ({} hits, {} triggers)",
            written,
            spill.frames().len(),
            spill.n_hits(),
            spill.n_triggers()
        );
        n_spills += 1;
        n_frames += written as u64;
        tx.send(WorkerStatus::new(framer.progress(), n_spills, n_frames))?;
    }
    writer.close()?;

    if let (Some(histograms), Some(path)) = (histograms, config.fine_histogram_path.as_ref()) {
        histograms.write(path)?;
    }

    tx.send(WorkerStatus::new(1.0, n_spills, n_frames))?;
    spdlog::info!("Completed: {} spills, {} frames", n_spills, n_frames);
    Ok(())
}
