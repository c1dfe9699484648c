// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Adapter over a named raw block partition. The real MTD driver (scan by
// name, read/write/erase a handle) is an external collaborator per
// spec.md §1; what lives here is the narrow interface the orchestrator and
// loader need, plus a reference implementation backed by plain files so the
// crate is runnable and testable without real flash (swap in a real MTD
// backend behind the same `PartitionDriver` surface for a device build).
//
// The partition scan happens once per process and is memoized, per the
// design note in spec.md §9 ("process-wide memoization ... explicit
// PartitionDriver handle created once per process").

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, PatchError};

pub struct PartitionDriver {
    root: PathBuf,
    known: Vec<String>,
}

impl PartitionDriver {
    /// Scans `root` for partition entries once, at construction time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let known = scan(&root);
        PartitionDriver { root, known }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, PatchError> {
        if !self.known.iter().any(|n| n == name) {
            return Err(PatchError::Io(format!(
                "no such partition {name:?} under {}",
                self.root.display()
            )));
        }
        Ok(self.root.join(name))
    }

    pub fn open_read(&self, name: &str) -> Result<FlashReadContext, PatchError> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(io_err)?;
        Ok(FlashReadContext { file })
    }

    pub fn open_write(&self, name: &str) -> Result<FlashWriteContext, PatchError> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(FlashWriteContext { file })
    }
}

fn scan(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}

pub struct FlashReadContext {
    file: File,
}

impl FlashReadContext {
    /// Reads exactly `buf.len()` bytes, sequentially from the current
    /// cursor. A short read is an error, never silently padded.
    pub fn read_exact_at(&mut self, buf: &mut [u8]) -> Result<(), PatchError> {
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PatchError::ShortTransfer(
                "partition read returned fewer bytes than requested".to_string(),
            )),
            Err(e) => Err(io_err(e)),
        }
    }
}

pub struct FlashWriteContext {
    file: File,
}

impl FlashWriteContext {
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), PatchError> {
        self.file.write_all(buf).map_err(io_err)
    }

    /// Pads/finalizes the partition past the written bytes. `-1` means
    /// "erase everything remaining to the end of the partition" — a real
    /// MTD driver issues an erase ioctl here; the file-backed reference
    /// implementation truncates to the current position, which is the
    /// closest plain-file analogue.
    pub fn erase_remaining(&mut self, sentinel: i64) -> Result<(), PatchError> {
        debug_assert_eq!(sentinel, -1, "only the \"erase to end\" sentinel is defined");
        let pos = self.file.stream_position().map_err(io_err)?;
        self.file.set_len(pos).map_err(io_err)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), PatchError> {
        self.file.flush().map_err(io_err)?;
        self.file.sync_all().map_err(io_err)
    }
}
