// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Abstract byte sink the patch decoders push output through. Two
// concretions, expressed as a tagged enum rather than a trait object so the
// orchestrator can recover the underlying bytes/path after decoding without
// downcasting (see design note on sink polymorphism in spec.md §9).

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{io_err, PatchError};

pub trait Sink {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), PatchError>;
}

/// Writes to a staging file, retrying on short writes. Opened with an
/// explicit restrictive mode; the orchestrator `chmod`s it to match the
/// source's stat before the final rename.
pub struct FileSink {
    file: File,
    path: PathBuf,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self, PatchError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(io_err)?;
        Ok(FileSink {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn write_bytes(&mut self, mut buf: &[u8]) -> Result<(), PatchError> {
        while !buf.is_empty() {
            match self.file.write(buf) {
                Ok(0) => {
                    return Err(PatchError::ShortTransfer(
                        "staging file write returned 0 bytes".to_string(),
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_err(e)),
            }
        }
        Ok(())
    }
}

/// Bounded in-memory sink used for partition targets, where the decoded
/// output is held entirely in RAM before being written to flash in one
/// shot (spec.md §4.3 step 6, partition case).
pub struct MemorySink {
    buf: Vec<u8>,
    capacity: usize,
}

impl MemorySink {
    pub fn with_capacity(capacity: usize) -> Self {
        MemorySink {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Sink for MemorySink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PatchError> {
        if self.buf.len() + data.len() > self.capacity {
            return Err(PatchError::ShortTransfer(format!(
                "memory sink overflow: {} + {} > {}",
                self.buf.len(),
                data.len(),
                self.capacity
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}

/// Tagged variant over the two sink concretions (see module doc comment).
pub enum OutputSink {
    File(FileSink),
    Memory(MemorySink),
}

impl Sink for OutputSink {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), PatchError> {
        match self {
            OutputSink::File(f) => f.write_bytes(buf),
            OutputSink::Memory(m) => m.write_bytes(buf),
        }
    }
}
