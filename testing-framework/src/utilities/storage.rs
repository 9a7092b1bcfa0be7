// File: testing-framework/src/utilities/storage.rs
//
// Storage Utilities for Testing
//
// RAII temporary directories for node data. A cluster keeps its root alive
// for as long as the nodes run; dropping it deletes every node's database
// and log.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary root directory holding one subdirectory per node.
///
/// The directory is deleted when this value is dropped, including when a
/// scenario panics. Call [`TempDataDir::keep`] to preserve it for
/// post-mortem inspection.
///
/// # Example
///
/// ```ignore
/// let root = TempDataDir::new()?;
/// let node0 = root.node_dir(0)?;
/// // node0 == <root>/node0, already created
/// ```
pub struct TempDataDir {
    /// Temporary directory handle (manages cleanup)
    temp_dir: Option<TempDir>,
    /// Root path (remains valid until drop)
    path: PathBuf,
}

impl TempDataDir {
    /// Create a fresh root under the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the system cannot create a temporary directory.
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("dagnet_test_nodes_")
            .tempdir()
            .context("Failed to create temporary node data directory")?;

        let path = temp_dir.path().to_path_buf();
        log::debug!("Created temporary node data root at: {:?}", path);

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
        })
    }

    /// Root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data directory of node `index`, created if missing
    pub fn node_dir(&self, index: usize) -> Result<PathBuf> {
        let dir = self.path.join(format!("node{}", index));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {:?}", dir))?;
        Ok(dir)
    }

    /// Stop the directory from being deleted on drop and return its path
    pub fn keep(mut self) -> PathBuf {
        if let Some(temp_dir) = self.temp_dir.take() {
            self.path = temp_dir.keep();
        }
        log::info!("Keeping node data at: {:?}", self.path);
        self.path.clone()
    }
}

impl Drop for TempDataDir {
    fn drop(&mut self) {
        if self.temp_dir.is_some() {
            log::debug!("Cleaning up temporary node data at: {:?}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_node_dirs_are_created() {
        let root = TempDataDir::new().unwrap();
        let dir = root.node_dir(3).unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("node3"));

        fs::write(dir.join("node.log"), b"started").unwrap();
        assert!(dir.join("node.log").exists());
    }

    #[test]
    fn test_cleanup_on_drop() {
        let path = {
            let root = TempDataDir::new().unwrap();
            root.node_dir(0).unwrap();
            root.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_preserves_directory() {
        let root = TempDataDir::new().unwrap();
        let path = root.keep();
        assert!(path.exists());
        fs::remove_dir_all(&path).unwrap();
    }
}
