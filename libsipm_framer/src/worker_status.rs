/// Progress message sent by the processing thread
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub n_spills: u32,
    pub n_frames: u64,
}

impl WorkerStatus {
    pub fn new(progress: f32, n_spills: u32, n_frames: u64) -> Self {
        Self {
            progress,
            n_spills,
            n_frames,
        }
    }
}
