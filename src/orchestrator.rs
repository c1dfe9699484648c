// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// The patch-application state machine (spec.md §4.3): triages source
// material, manages the cache backup, picks a staging strategy, invokes the
// decoder, and commits atomically. This is the core of the crate — every
// other module exists to support this one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::decoder;
use crate::digest::{parse_digest, Hasher};
use crate::error::{io_err, PatchError};
use crate::freespace::{enough_space, free_space_for, CacheEvictor, NoEvictionPolicy};
use crate::loader::{self, is_partition_locator, FileContents, Stat};
use crate::partition::PartitionDriver;
use crate::patchset::{self, detect_kind, PatchSet};
use crate::report;
use crate::sink::{FileSink, MemorySink, OutputSink};

pub struct Orchestrator {
    partition_driver: PartitionDriver,
    cache_backup_path: PathBuf,
    cache_evictor: Box<dyn CacheEvictor>,
}

impl Orchestrator {
    /// `partition_root` is where `MTD:` locators resolve to (e.g.
    /// `/dev/block/by-name` on a real device).
    pub fn new(partition_root: impl Into<PathBuf>) -> Self {
        Orchestrator {
            partition_driver: PartitionDriver::new(partition_root),
            cache_backup_path: PathBuf::from("/cache/saved.file"),
            cache_evictor: Box::new(NoEvictionPolicy),
        }
    }

    pub fn with_cache_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_backup_path = path.into();
        self
    }

    pub fn with_cache_evictor(mut self, evictor: Box<dyn CacheEvictor>) -> Self {
        self.cache_evictor = evictor;
        self
    }

    fn cache_backup_locator(&self) -> String {
        self.cache_backup_path.to_string_lossy().into_owned()
    }

    /// The full state machine, spec.md §4.3 steps 1–11.
    pub fn apply_patch(
        &self,
        source_locator: &str,
        target_locator: &str,
        target_digest_hex: &str,
        target_size: u64,
        patch_set: &PatchSet,
    ) -> Result<(), PatchError> {
        // Step 1: target aliasing.
        let target_locator = if target_locator == "-" {
            source_locator
        } else {
            target_locator
        };

        // Step 2: target digest parse.
        let target_digest = parse_digest(target_digest_hex)?;

        // Step 3: early exit.
        let early_load = loader::load(target_locator, &self.partition_driver);
        if let Ok(contents) = &early_load {
            if contents.digest == target_digest {
                report::println("target already matches the expected digest, nothing to do");
                return Ok(());
            }
        }

        // Step 4: source acquisition.
        let mut source_contents: Option<FileContents> = None;
        if target_locator == source_locator {
            if let Ok(contents) = early_load {
                source_contents = Some(contents);
            }
        }
        if source_contents.is_none() {
            source_contents = loader::load(source_locator, &self.partition_driver).ok();
        }

        // Step 5: source triage.
        report::println(format!("applying patch to {target_locator}"));
        let (patch_index, source_bytes, source_stat, used_cache_copy) =
            self.triage_source(source_contents.as_ref(), patch_set)?;

        let patch_blob = &patch_set.patches[patch_index];
        let kind = detect_kind(patch_blob)?;

        let target_is_partition = is_partition_locator(target_locator);
        let staging_path = format!("{target_locator}.patch");

        let mut created_cache_backup = false;
        let mut source_deleted = false;
        let mut retry_budget: u8 = 1;
        let mut result: Result<(OutputSink, Hasher), PatchError>;

        loop {
            let mut freed_this_pass = false;

            let sink_result: Result<OutputSink, PatchError> = if target_is_partition {
                self.back_up_source(&source_bytes, &mut created_cache_backup)?;
                Ok(OutputSink::Memory(MemorySink::with_capacity(
                    target_size as usize,
                )))
            } else {
                let target_fs = top_level_dir(target_locator);
                let free = free_space_for(Path::new(&target_fs));
                if !enough_space(free, target_size) {
                    if !used_cache_copy && !is_partition_locator(source_locator) {
                        self.back_up_source(&source_bytes, &mut created_cache_backup)?;
                        // Only unlink once per invocation: a retry triggered by
                        // something other than space exhaustion (e.g. a decoder
                        // failure) can loop back in here with the source already
                        // gone, and re-attempting the unlink would surface a
                        // spurious ENOENT instead of the real failure.
                        if !source_deleted {
                            fs::remove_file(source_locator).map_err(io_err)?;
                            source_deleted = true;
                        }
                        freed_this_pass = true;
                    } else if !used_cache_copy {
                        return Err(PatchError::InsufficientSpace);
                    }
                    // if used_cache_copy is already true there is no source
                    // file left to free; fall through and let staging retry
                    // on whatever room is actually there.
                }
                FileSink::create(Path::new(&staging_path)).map(OutputSink::File)
            };

            let attempt = sink_result.and_then(|mut sink| {
                let mut hasher = Hasher::new();
                decoder::decode(kind, &source_bytes, patch_blob, &mut sink, &mut hasher)
                    .map(|()| (sink, hasher))
            });

            match attempt {
                Ok(ok) => {
                    result = Ok(ok);
                    break;
                }
                Err(e) => {
                    if !target_is_partition {
                        let _ = fs::remove_file(&staging_path);
                    }
                    if freed_this_pass && retry_budget > 0 {
                        retry_budget -= 1;
                        continue;
                    }
                    result = Err(e);
                    break;
                }
            }
        }

        let (sink, hasher) = match result {
            Ok(v) => v,
            Err(e) => {
                report::println(format!("failed to apply patch: {e}"));
                return Err(e);
            }
        };

        // Step 9: verify.
        let computed = hasher.finalize();
        if computed != target_digest {
            if !target_is_partition {
                let _ = fs::remove_file(&staging_path);
            }
            report::println("failed to verify patched output: digest mismatch");
            return Err(PatchError::DigestMismatch);
        }

        // Step 10: commit.
        if target_is_partition {
            let name = patchset::partition_name_for_write(target_locator)?;
            let buf = match sink {
                OutputSink::Memory(m) => m.into_inner(),
                OutputSink::File(_) => unreachable!("partition targets always use a memory sink"),
            };
            self.commit_partition(&name, &buf)?;
        } else {
            let path = match &sink {
                OutputSink::File(f) => f.path().to_path_buf(),
                OutputSink::Memory(_) => unreachable!("filesystem targets always use a file sink"),
            };
            chmod_chown(&path, &source_stat)?;
            fs::rename(&path, target_locator).map_err(io_err)?;
        }

        // Step 11: cleanup. A backup created during this invocation is the
        // obvious case; a backup *consumed* as the recovery source (from a
        // prior, interrupted invocation) is also spent once this run
        // commits successfully, so it's cleaned up too rather than left to
        // occupy cache space indefinitely (spec.md §8 scenario 3).
        if created_cache_backup || used_cache_copy {
            if let Err(e) = fs::remove_file(&self.cache_backup_path) {
                report::println(format!("failed to remove cache backup: {e}"));
            }
        }

        report::println("patch applied successfully");
        Ok(())
    }

    /// Step 5: selects which source bytes and patch index to use. Returns
    /// `(patch_index, bytes, stat, used_cache_copy)`.
    fn triage_source(
        &self,
        source_contents: Option<&FileContents>,
        patch_set: &PatchSet,
    ) -> Result<(usize, Vec<u8>, Stat, bool), PatchError> {
        if let Some(contents) = source_contents {
            if let Some(idx) = crate::digest::find_matching(&contents.digest, &patch_set.source_digests) {
                return Ok((idx, contents.data.clone(), contents.stat, false));
            }
        }

        let cache_contents = loader::load(&self.cache_backup_locator(), &self.partition_driver)
            .map_err(|_| PatchError::CorruptSource)?;

        // Open question (spec.md §9): a match against the cache backup is
        // only accepted at a strictly positive index. Preserved as-specified,
        // not "fixed" to `>=`.
        match crate::digest::find_matching(&cache_contents.digest, &patch_set.source_digests) {
            Some(idx) if idx > 0 => Ok((idx, cache_contents.data, cache_contents.stat, true)),
            _ => Err(PatchError::CorruptSource),
        }
    }

    fn back_up_source(&self, bytes: &[u8], created: &mut bool) -> Result<(), PatchError> {
        let cache_dir = self
            .cache_backup_path
            .parent()
            .unwrap_or_else(|| Path::new("/"));
        self.cache_evictor.ensure_free(cache_dir, bytes.len() as u64)?;
        fs::write(&self.cache_backup_path, bytes).map_err(io_err)?;
        *created = true;
        Ok(())
    }

    fn commit_partition(&self, name: &str, buf: &[u8]) -> Result<(), PatchError> {
        let mut ctx = self.partition_driver.open_write(name)?;
        ctx.write_all(buf)?;
        ctx.erase_remaining(-1)?;
        ctx.close()
    }
}

/// "The portion up to the second `/`" (spec.md §4.3 step 6, filesystem
/// branch).
fn top_level_dir(path: &str) -> String {
    match path.strip_prefix('/') {
        Some(rest) => match rest.find('/') {
            Some(idx) => format!("/{}", &rest[..idx]),
            None => format!("/{rest}"),
        },
        None => ".".to_string(),
    }
}

#[cfg(unix)]
fn chmod_chown(path: &Path, stat: &Stat) -> Result<(), PatchError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(stat.mode)).map_err(io_err)?;

    let c_path = std::ffi::CString::new(path.as_os_str().to_string_lossy().as_bytes())
        .map_err(|e| PatchError::Io(e.to_string()))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), stat.uid, stat.gid) };
    if rc != 0 {
        return Err(io_err(std::io::Error::last_os_error()));
    }
    Ok(())
}
