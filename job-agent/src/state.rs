use crate::types::{Result, SeenSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable home of the seen set: a JSON array of posting ids.
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the set from disk. A missing, unreadable or malformed file
    /// yields an empty set; this never fails.
    pub fn load(&self) -> SeenSet {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting with an empty seen set", self.path.display());
                return SeenSet::new();
            }
            Err(e) => {
                warn!("Could not read state file {}: {}; starting empty", self.path.display(), e);
                return SeenSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(ids) => {
                let seen: SeenSet = ids.into_iter().collect();
                info!("Loaded {} seen postings from {}", seen.len(), self.path.display());
                seen
            }
            Err(e) => {
                warn!("State file {} is corrupt ({}); starting empty", self.path.display(), e);
                SeenSet::new()
            }
        }
    }

    /// Replace the file with the current set.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the target,
    /// so a crash mid-write leaves either the old file or the new one.
    pub fn save(&self, seen: &SeenSet) -> Result<()> {
        let tmp_path = self.tmp_path();
        if let Err(e) = self.write_tmp(&tmp_path, seen) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Saved {} seen postings to {}", seen.len(), self.path.display());
        Ok(())
    }

    fn write_tmp(&self, tmp_path: &Path, seen: &SeenSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &seen.sorted())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "seen_jobs.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
