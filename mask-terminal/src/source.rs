/// Landmark sources for the terminal front-end
use mask_core::detect::{Detection, Detector};
use mask_core::recorder::{read_session, SessionRecord};
use mask_core::synthetic::SwayingHead;
use mask_core::{Error, Result};
use std::path::Path;

/// Where pose frames come from
pub enum FrameSource {
    /// Procedural head
    Synthetic(SwayingHead),
    /// A recorded session played in a loop
    Replay { records: Vec<SessionRecord>, next: usize },
}

impl FrameSource {
    /// Load a session log for looped playback
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let records = read_session(path)?;
        if records.is_empty() {
            return Err(Error::RecordError(format!("{} contains no frames", path.display())));
        }
        log::info!("Replaying {} frames from {}", records.len(), path.display());
        Ok(FrameSource::Replay { records, next: 0 })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameSource::Synthetic(_) => "synthetic",
            FrameSource::Replay { .. } => "replay",
        }
    }
}

impl Detector for FrameSource {
    type Input = u64;

    fn detect(&mut self, t_ms: u64) -> Detection {
        match self {
            FrameSource::Synthetic(head) => head.detect(t_ms),
            FrameSource::Replay { records, next } => {
                let record = records.get(*next).or_else(|| records.first())?;
                *next = (*next + 1) % records.len();
                Some(record.to_pose_frame())
            }
        }
    }
}
