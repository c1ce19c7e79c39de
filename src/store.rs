use bincode::{Decode, Encode};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::record::{fields, HaloRecord, SnapshotSet};
use crate::HaloError;

pub const CHECKPOINT_EXTENSION: &str = "dat";

/// File naming for every checkpoint a run produces, rooted at one base directory.
#[derive(Debug, Clone)]
pub struct CheckpointLayout {
    base_dir: PathBuf,
    outname: String,
}

impl CheckpointLayout {
    pub fn new<P: AsRef<Path>>(base_dir: P, outname: &str) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            outname: outname.to_string(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn outname(&self) -> &str {
        &self.outname
    }

    /// Reduced tier written by assembly.
    pub fn reduced(&self) -> PathBuf {
        self.base_dir.join(format!("B1_HaloData_{}.dat", self.outname))
    }

    /// Full tier written by assembly.
    pub fn full(&self) -> PathBuf {
        self.base_dir.join(format!("B2_HaloData_{}.dat", self.outname))
    }

    pub fn enriched_dir(&self) -> PathBuf {
        self.base_dir.join("halo_data")
    }

    pub fn enriched_snapshot(&self, snap: usize) -> PathBuf {
        self.enriched_dir()
            .join(format!("B3_HaloData_{}_{:03}.dat", self.outname, snap))
    }

    pub fn collated(&self) -> PathBuf {
        self.base_dir.join(format!("B3_HaloData_{}.dat", self.outname))
    }

    pub fn export(&self) -> PathBuf {
        self.base_dir.join(format!("B4_HaloData_{}.dat", self.outname))
    }

    pub fn particle_dir(&self) -> PathBuf {
        self.base_dir.join("particle_data")
    }

    pub fn particle_snapshot(&self, snap: usize) -> PathBuf {
        self.particle_dir()
            .join(format!("PartData_{}_{:03}.dat", self.outname, snap))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("job_logs")
    }

    pub fn progress_log(&self, snap: usize) -> PathBuf {
        self.log_dir()
            .join(format!("halodata_progress_{:03}.log", snap))
    }
}

/// Write `value` to `path`, replacing any previous checkpoint there.
///
/// The encoding goes to a sibling temp file first and is renamed into place, so
/// `path` never holds a partial write.
pub fn save<T: Encode>(value: &T, path: &Path) -> Result<(), HaloError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        bincode::encode_into_std_write(value, &mut writer, bincode::config::standard())?;
        writer.flush()?;
    }

    if path.exists() {
        info!(path = %path.display(), "overwriting existing checkpoint");
        fs::remove_file(path)?;
    }
    fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), "checkpoint saved");
    Ok(())
}

pub fn load<T: Decode<()>>(path: &Path) -> Result<T, HaloError> {
    if !path.exists() {
        return Err(HaloError::MissingInput {
            snap: None,
            path: path.to_path_buf(),
        });
    }

    let bytes = fs::read(path)?;
    let (value, read) = bincode::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| HaloError::CorruptCheckpoint {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if read != bytes.len() {
        return Err(HaloError::CorruptCheckpoint {
            path: path.to_path_buf(),
            reason: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    Ok(value)
}

pub fn save_set(set: &SnapshotSet, path: &Path) -> Result<(), HaloError> {
    save(set, path)
}

pub fn load_set(path: &Path) -> Result<SnapshotSet, HaloError> {
    load(path)
}

pub fn save_record(record: &HaloRecord, path: &Path) -> Result<(), HaloError> {
    save(record, path)
}

pub fn load_record(path: &Path) -> Result<HaloRecord, HaloError> {
    load(path)
}

/// Copy of `record` holding only the named columns that exist in it. Metadata is kept.
pub fn project<S: AsRef<str>>(record: &HaloRecord, field_names: &[S]) -> HaloRecord {
    let mut out = record.clone();
    out.retain_columns(|name| field_names.iter().any(|f| f.as_ref() == name));
    out
}

/// The reduced tier: core linking columns only. Padded records pass through.
pub fn reduce(set: &SnapshotSet) -> SnapshotSet {
    SnapshotSet::new(
        set.iter()
            .map(|record| {
                if record.is_available() {
                    project(record, &fields::REDUCED)
                } else {
                    record.clone()
                }
            })
            .collect(),
    )
}

/// Checkpoint files in `dir`, sorted by file name.
pub fn list_checkpoints(dir: &Path) -> Result<Vec<PathBuf>, HaloError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CHECKPOINT_EXTENSION) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
