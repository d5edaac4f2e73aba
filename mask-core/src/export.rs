//! OBJ snapshots of the deformed mask

use nalgebra::Matrix4;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::geometry::Mesh;
use crate::obj::write_obj;
use crate::{Error, Result};

/// File name for the snapshot of frame `frame_index`
pub fn snapshot_name(frame_index: u64) -> String {
    format!("mask_{:06}.obj", frame_index)
}

/// Write `mesh` into `dir` and return the path of the new file.
///
/// The snapshot is written to a temporary file first and renamed once
/// complete, so a failed export never leaves a truncated OBJ behind.
pub fn export_obj<P: AsRef<Path>>(
    mesh: &Mesh,
    transform: Option<&Matrix4<f32>>,
    dir: P,
    frame_index: u64,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .map_err(|e| Error::ExportError(format!("cannot create {}: {}", dir.display(), e)))?;

    let path = dir.join(snapshot_name(frame_index));
    let partial = path.with_extension("obj.part");

    let written = File::create(&partial).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write_obj(&mut writer, mesh, transform)?;
        writer.flush()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(Error::ExportError(format!("cannot write {}: {}", path.display(), e)));
    }

    fs::rename(&partial, &path)
        .map_err(|e| Error::ExportError(format!("cannot finalise {}: {}", path.display(), e)))?;

    log::info!("Exported {}", path.display());
    Ok(path)
}
