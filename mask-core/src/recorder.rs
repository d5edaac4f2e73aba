//! Append-only session log.
//!
//! Each recorded frame becomes one YAML document in a single file, so the log
//! stays readable and can be tailed while a session runs.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::camera::{CameraState, Intrinsics};
use crate::pose::{AdaptedFrame, PoseFrame};
use crate::{Error, Result};

/// Pinhole parameters as written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsRecord {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub focal_length_mm: f32,
    pub sensor_width_mm: f32,
}

/// Virtual camera at the time of the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub position: [f32; 3],
    /// World-to-camera rotation, row major
    pub rotation: [[f32; 3]; 3],
    pub intrinsics: IntrinsicsRecord,
}

/// One logged frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp_ms: u64,
    pub frame_index: u64,
    pub resolution: [u32; 2],
    pub raw_landmarks: Vec<[f32; 3]>,
    pub pixel_landmarks: Vec<[f32; 3]>,
    #[serde(default)]
    pub expressions: Vec<f32>,
    /// Detector pose transform, row major
    pub pose: [[f32; 4]; 4],
    pub camera: CameraRecord,
}

fn rows4(m: &Matrix4<f32>) -> [[f32; 4]; 4] {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

impl SessionRecord {
    /// Snapshot the current frame and camera
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        frame_index: u64,
        resolution: [u32; 2],
        raw: &PoseFrame,
        adapted: &AdaptedFrame,
        camera: &CameraState,
        position: [f32; 3],
        view: &Matrix4<f32>,
        intrinsics: &Intrinsics,
    ) -> Self {
        Self {
            timestamp_ms: raw.timestamp_ms,
            frame_index,
            resolution,
            raw_landmarks: raw.landmarks.iter().map(|p| [p.x, p.y, p.z]).collect(),
            pixel_landmarks: adapted.pixels.iter().map(|p| [p.x, p.y, p.z]).collect(),
            expressions: raw.expressions.clone(),
            pose: rows4(&raw.transform),
            camera: CameraRecord {
                position,
                rotation: std::array::from_fn(|r| std::array::from_fn(|c| view[(r, c)])),
                intrinsics: IntrinsicsRecord {
                    fx: intrinsics.fx,
                    fy: intrinsics.fy,
                    cx: intrinsics.cx,
                    cy: intrinsics.cy,
                    focal_length_mm: camera.focal_length_mm,
                    sensor_width_mm: camera.sensor_width_mm,
                },
            },
        }
    }

    /// Rebuild the detector frame this record was taken from
    pub fn to_pose_frame(&self) -> PoseFrame {
        PoseFrame {
            landmarks: self
                .raw_landmarks
                .iter()
                .map(|&[x, y, z]| nalgebra::Point3::new(x, y, z))
                .collect(),
            transform: Matrix4::from_fn(|r, c| self.pose[r][c]),
            expressions: self.expressions.clone(),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Appends [`SessionRecord`]s to a log file
pub struct SessionRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl SessionRecorder {
    /// Open `path` for appending, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::RecordError(format!("cannot open {}: {}", path.display(), e)))?;
        log::info!("Recording session to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            written: 0,
        })
    }

    pub fn append(&mut self, record: &SessionRecord) -> Result<()> {
        let body = serde_yaml::to_string(record).map_err(|e| Error::RecordError(e.to_string()))?;
        self.writer.write_all(b"---\n")?;
        self.writer.write_all(body.as_bytes())?;
        // Each record is complete on disk before the next frame starts
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }
}

/// Read every record of a session log
pub fn read_session<P: AsRef<Path>>(path: P) -> Result<Vec<SessionRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::RecordError(format!("cannot read {}: {}", path.display(), e)))?;

    serde_yaml::Deserializer::from_str(&text)
        .map(|document| {
            SessionRecord::deserialize(document)
                .map_err(|e| Error::RecordError(format!("{}: {}", path.display(), e)))
        })
        .collect()
}
