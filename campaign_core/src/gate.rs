//! Pre-flight checks on the campaign output tree.
//!
//! The output tree is wiped at the start of every campaign, so crash findings
//! from the previous one must be triaged first. [`check_no_crashes`] is the
//! read-only guard; [`reset_outputs`] is the destructive step that may only
//! run after it passed.

use crate::error::CampaignError;
use crate::target::Catalog;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Fails with [`CampaignError::GateBlocked`] if any target directory under
/// `output_root` has a non-empty `default/crashes` directory.
///
/// Every subdirectory is inspected, not just the ones in the current catalog.
/// A missing `output_root` passes. Nothing is modified.
pub fn check_no_crashes(output_root: &Path) -> Result<(), CampaignError> {
    let entries = match fs::read_dir(output_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet, nothing to check", output_root.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut target_dirs: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            target_dirs.push(path);
        }
    }
    target_dirs.sort();

    for dir in target_dirs {
        let crashes = dir.join("default").join("crashes");
        if has_entries(&crashes)? {
            return Err(CampaignError::GateBlocked { path: crashes });
        }
    }
    Ok(())
}

fn has_entries(dir: &Path) -> Result<bool, CampaignError> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().transpose()?.is_some()),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Removes the whole output tree and recreates one empty directory per target.
pub fn reset_outputs(catalog_root: &Path, catalog: &Catalog) -> Result<(), CampaignError> {
    let output_root = catalog_root.join("out");
    match fs::remove_dir_all(&output_root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(&output_root)?;
    for target in catalog {
        fs::create_dir_all(target.output_dir(catalog_root))?;
    }
    info!(
        "reset {} with {} empty target directories",
        output_root.display(),
        catalog.len()
    );
    Ok(())
}
