// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;

/// Name of the ledger file inside the library directory
pub const LEDGER_FILENAME: &str = "store.txt";

/// Durable record of enclosure URLs that have been handled
///
/// Backed by a plain text file with one URL per line. The file is only ever
/// appended to, and a URL is written at most once.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    entries: HashSet<String>,
    /// The file does not end in a newline (e.g. after a manual edit)
    needs_newline: bool,
}

impl DownloadLedger {
    /// Open the ledger of a library directory
    pub fn open(library_dir: &Path) -> Result<Self, LedgerError> {
        Self::open_file(library_dir.join(LEDGER_FILENAME))
    }

    /// Open a ledger file, creating it empty if it does not exist yet
    pub fn open_file(path: PathBuf) -> Result<Self, LedgerError> {
        if !path.exists() {
            std::fs::File::create(&path).map_err(|e| LedgerError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        }

        let content = std::fs::read_to_string(&path).map_err(|e| LedgerError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;

        let entries = content
            .lines()
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            needs_newline: !content.is_empty() && !content.ends_with('\n'),
            path,
            entries,
        })
    }

    /// Whether the URL has been recorded
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Record a URL; recording an already known URL is a no-op
    pub fn record(&mut self, url: &str) -> Result<(), LedgerError> {
        if self.contains(url) {
            return Ok(());
        }

        let write_failed = |e| LedgerError::WriteFailed {
            path: self.path.clone(),
            source: e,
        };

        let mut line = String::with_capacity(url.len() + 2);
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(url);
        line.push('\n');

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).map_err(write_failed)?;
        file.flush().map_err(write_failed)?;

        self.needs_newline = false;
        self.entries.insert(url.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
