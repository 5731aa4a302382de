//! Input discovery and classification
//!
//! The input directory holds one fixed image and any number of moving
//! images. An entry is a *volume* if its name ends in `.nii` or `.nii.gz`,
//! a *slice directory* if it is a directory (assumed to contain 2D DICOM
//! slices of one volume), and is otherwise ignored. The entry named by the
//! fixed-image option may itself be a file or a slice directory.
//!
//! Classification is pure: conversion of slice directories and all other
//! side effects happen later in the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::Result;

/// How an input entry will be fed to the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A NIfTI volume usable as-is.
    Volume,
    /// A directory of slices needing conversion to one volume first.
    SliceDir,
}

/// One classified entry from the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl InputEntry {
    /// The name this entry's outputs are prefixed with.
    pub fn item_name(&self) -> String {
        item_name(&self.path)
    }
}

/// The classified input set for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputScan {
    pub fixed: InputEntry,
    pub moving: Vec<InputEntry>,
}

/// True for names the registration toolchain accepts directly.
pub fn is_volume_name(name: &str) -> bool {
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Item name: the file name up to its first `.`, so `brain.nii.gz` and
/// `brain.nii` both become `brain`.
pub fn item_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// Classify the input directory.
///
/// `fixed_name` names the fixed entry inside `input_dir`; every other entry
/// becomes a moving volume, a moving slice directory, or is ignored. Moving
/// entries come back sorted by path so every worker and every rerun sees the
/// same item order.
pub fn scan_inputs(input_dir: &Path, fixed_name: &str) -> Result<InputScan> {
    let fixed_path = input_dir.join(fixed_name);
    let fixed = if fixed_path.is_file() {
        InputEntry {
            path: fixed_path,
            kind: InputKind::Volume,
        }
    } else if fixed_path.is_dir() {
        InputEntry {
            path: fixed_path,
            kind: InputKind::SliceDir,
        }
    } else {
        bail!(
            "fixed image '{}' not found in {}",
            fixed_name,
            input_dir.display()
        );
    };

    let mut moving = Vec::new();
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("reading input directory {}", input_dir.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("reading input directory {}", input_dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == fixed_name {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            moving.push(InputEntry {
                path,
                kind: InputKind::SliceDir,
            });
        } else if is_volume_name(&name) {
            moving.push(InputEntry {
                path,
                kind: InputKind::Volume,
            });
        }
        // Anything else in the input directory is ignored.
    }
    moving.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(InputScan { fixed, moving })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), b"volume").unwrap();
    }

    #[test]
    fn test_scan_classifies_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "fixed.nii");
        touch(&dir, "c.nii.gz");
        touch(&dir, "b.nii");
        touch(&dir, "notes.txt");
        fs::create_dir(dir.path().join("d_series")).unwrap();

        let scan = scan_inputs(dir.path(), "fixed.nii").unwrap();

        assert_eq!(scan.fixed.kind, InputKind::Volume);
        assert_eq!(scan.fixed.path, dir.path().join("fixed.nii"));

        let names: Vec<String> = scan.moving.iter().map(|e| e.item_name()).collect();
        assert_eq!(names, vec!["b", "c", "d_series"]);
        assert_eq!(scan.moving[0].kind, InputKind::Volume);
        assert_eq!(scan.moving[1].kind, InputKind::Volume);
        assert_eq!(scan.moving[2].kind, InputKind::SliceDir);
    }

    #[test]
    fn test_fixed_may_be_a_slice_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("fixed_series")).unwrap();
        touch(&dir, "moving.nii");

        let scan = scan_inputs(dir.path(), "fixed_series").unwrap();
        assert_eq!(scan.fixed.kind, InputKind::SliceDir);
        assert_eq!(scan.moving.len(), 1);
    }

    #[test]
    fn test_missing_fixed_is_fatal() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "moving.nii");

        let err = scan_inputs(dir.path(), "fixed.nii").unwrap_err();
        assert!(err.to_string().contains("fixed image"));
    }

    #[test]
    fn test_non_volume_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "fixed.nii");
        touch(&dir, "archive.gz");
        touch(&dir, "README");

        let scan = scan_inputs(dir.path(), "fixed.nii").unwrap();
        assert!(scan.moving.is_empty());
    }

    #[test]
    fn test_item_names_strip_from_first_dot() {
        assert_eq!(item_name(Path::new("/in/brain.nii.gz")), "brain");
        assert_eq!(item_name(Path::new("/in/brain.nii")), "brain");
        assert_eq!(item_name(Path::new("/in/series7")), "series7");
    }

    #[test]
    fn test_volume_name_filter() {
        assert!(is_volume_name("a.nii"));
        assert!(is_volume_name("a.nii.gz"));
        assert!(!is_volume_name("a.gz"));
        assert!(!is_volume_name("a.txt"));
        assert!(!is_volume_name("anii"));
    }
}
