//! Source discovery for batch runs.
//!
//! The command line accepts files and directories mixed. Anything that is not
//! a directory is taken as given, even a missing file or one the backend may
//! not decode; either surfaces later as a per-item failure. A directory
//! contributes the supported image files directly inside it, sorted by name:
//!
//! ```text
//! shoot/                 expand_sources(["shoot", "extra/cover.png"])
//! ├── 02.JPG             →  shoot/01.png
//! ├── 01.png                shoot/02.JPG
//! ├── notes.txt             extra/cover.png
//! └── raw/
//!     └── 03.jpg
//! ```
//!
//! Subdirectories are not descended into.

use crate::imaging::supported_input_extensions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot read directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Expand `inputs` into the ordered list of source images.
pub fn expand_sources(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_dir() {
            sources.extend(images_in(input)?);
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}

fn images_in(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_supported_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    tracing::debug!(dir = %dir.display(), count = images.len(), "expanded source directory");
    Ok(images)
}

fn is_supported_image(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if name.starts_with('.') {
        return false;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    supported_input_extensions().contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn files_are_kept_as_given() {
        let tmp = TempDir::new().unwrap();
        let b = touch(tmp.path(), "b.jpg");
        let a = touch(tmp.path(), "a.txt");

        let sources = expand_sources(&[b.clone(), a.clone()]).unwrap();
        assert_eq!(sources, vec![b, a]);
    }

    #[test]
    fn directory_expands_to_sorted_supported_images() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "02.JPG");
        touch(tmp.path(), "01.png");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), ".hidden.jpg");
        fs::create_dir(tmp.path().join("raw")).unwrap();
        touch(&tmp.path().join("raw"), "03.jpg");

        let sources = expand_sources(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["01.png", "02.JPG"]);
    }

    #[test]
    fn mixed_inputs_keep_argument_order() {
        let tmp = TempDir::new().unwrap();
        let shoot = tmp.path().join("shoot");
        fs::create_dir(&shoot).unwrap();
        touch(&shoot, "a.jpg");
        let cover = touch(tmp.path(), "cover.png");

        let sources = expand_sources(&[cover.clone(), shoot.clone()]).unwrap();
        assert_eq!(sources, vec![cover, shoot.join("a.jpg")]);
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(expand_sources(&[tmp.path().to_path_buf()]).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_kept_for_the_run_to_report() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.jpg");
        let missing = tmp.path().join("missing.jpg");
        let c = touch(tmp.path(), "c.jpg");

        let sources = expand_sources(&[a.clone(), missing.clone(), c.clone()]).unwrap();
        assert_eq!(sources, vec![a, missing, c]);
    }
}
