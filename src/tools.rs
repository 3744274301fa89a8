// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::error::ToolError;

/// Abstraction over the external audio and image tools
///
/// Every operation reads its inputs and writes a single output file. An
/// operation that returns `Ok` may still have produced no output; callers
/// check for the output file themselves.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Convert an image of any supported format to PNG
    async fn convert_image(&self, input: &Path, output: &Path) -> Result<(), ToolError>;

    /// Remux audio into Matroska, keeping the audio codec and dropping video
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), ToolError>;

    /// Replace the container metadata with the contents of an FFMETADATA file
    async fn merge_metadata(
        &self,
        input: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Result<(), ToolError>;

    /// Attach a PNG image as an attachment stream
    async fn attach_cover(&self, input: &Path, cover: &Path, output: &Path)
    -> Result<(), ToolError>;
}

/// `ffmpeg` and ImageMagick `convert` run as child processes
#[derive(Debug, Clone)]
pub struct ExternalTools {
    ffmpeg: String,
    convert: String,
}

impl ExternalTools {
    pub fn new(ffmpeg: impl Into<String>, convert: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            convert: convert.into(),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.convert.clone())
    }
}

fn remux_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    args.extend(["-c:a", "copy", "-vn", "-f", "matroska"].map(OsString::from));
    args.push(output.into());
    args
}

fn merge_metadata_args(input: &Path, metadata: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into(), "-i".into(), metadata.into()];
    args.extend(
        ["-codec", "copy", "-vn", "-map_metadata", "1", "-f", "matroska"].map(OsString::from),
    );
    args.push(output.into());
    args
}

fn attach_cover_args(input: &Path, cover: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    args.extend(
        ["-codec", "copy", "-vn", "-map_metadata", "0", "-f", "matroska", "-attach"]
            .map(OsString::from),
    );
    args.push(cover.into());
    args.extend(["-metadata:s:t", "mimetype=image/png"].map(OsString::from));
    args.push(output.into());
    args
}

fn convert_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![input.into(), output.into()]
}

/// Run a program to completion, failing on spawn errors and non-zero exits
async fn run(program: &str, args: &[OsString]) -> Result<(), ToolError> {
    tracing::debug!(program, ?args, "Running external tool");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ToolError::SpawnFailed {
            program: program.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

#[async_trait]
impl MediaTools for ExternalTools {
    async fn convert_image(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        run(&self.convert, &convert_args(input, output)).await
    }

    async fn remux(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        run(&self.ffmpeg, &remux_args(input, output)).await
    }

    async fn merge_metadata(
        &self,
        input: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Result<(), ToolError> {
        run(&self.ffmpeg, &merge_metadata_args(input, metadata, output)).await
    }

    async fn attach_cover(
        &self,
        input: &Path,
        cover: &Path,
        output: &Path,
    ) -> Result<(), ToolError> {
        run(&self.ffmpeg, &attach_cover_args(input, cover, output)).await
    }
}
