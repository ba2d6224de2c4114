//! Job-scoped palette file.

use std::path::{Path, PathBuf};

use crate::job::JobId;

/// Owns the palette file of one job and deletes it when dropped.
///
/// The guard is created before the palette subprocess starts, so a partial
/// file left by a failed or cancelled run is removed as well.
#[derive(Debug)]
pub struct PaletteArtifact {
    path: PathBuf,
}

impl PaletteArtifact {
    /// Reserve the palette path for `job_id` inside `work_dir`.
    pub fn reserve(work_dir: &Path, job_id: JobId) -> Self {
        Self {
            path: work_dir.join(format!("skewbot-palette-{job_id}.png")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Drop for PaletteArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed palette"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove palette")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = PaletteArtifact::reserve(dir.path(), JobId::new());
        std::fs::write(artifact.path(), b"palette").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(artifact.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_palette_drop_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = PaletteArtifact::reserve(dir.path(), JobId::new());
        assert!(!artifact.exists());
        drop(artifact);
    }

    #[test]
    fn test_paths_are_job_unique() {
        let dir = Path::new("/tmp");
        let a = PaletteArtifact::reserve(dir, JobId::new());
        let b = PaletteArtifact::reserve(dir, JobId::new());
        assert_ne!(a.path(), b.path());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("skewbot-palette-"));
    }
}
