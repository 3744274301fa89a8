// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::AcquisitionError;

const WORKSPACE_PREFIX: &str = "podstash-";

/// Scratch directory holding one episode's in-flight artifacts
///
/// Removal is explicit: a workspace that is simply dropped stays on disk, so
/// the artifacts of a failed episode remain available for inspection.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create a uniquely named, owner-only workspace below `root`
    pub fn create(root: &Path) -> Result<Self, AcquisitionError> {
        std::fs::create_dir_all(root).map_err(|e| AcquisitionError::Workspace {
            path: root.to_path_buf(),
            source: e,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|e| AcquisitionError::Workspace {
                path: root.to_path_buf(),
                source: e,
            })?;

        Ok(Self { path: dir.keep() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The episode audio, replaced in place by every processing step
    pub fn audio(&self) -> PathBuf {
        self.path.join("audio")
    }

    /// Output of the processing step currently running
    pub fn audio_next(&self) -> PathBuf {
        self.path.join("audio2")
    }

    /// Cover art as downloaded
    pub fn cover(&self) -> PathBuf {
        self.path.join("cover")
    }

    pub fn cover_png(&self) -> PathBuf {
        self.path.join("cover.png")
    }

    pub fn metadata(&self) -> PathBuf {
        self.path.join("metadata.txt")
    }

    /// Replace `audio` with `audio2`
    pub fn promote_next(&self) -> io::Result<()> {
        std::fs::rename(self.audio_next(), self.audio())
    }

    /// Delete the workspace and everything in it
    pub fn remove(self) -> io::Result<()> {
        std::fs::remove_dir_all(&self.path)
    }
}
