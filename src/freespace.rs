// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Free-space manager (spec.md §4.5). `statvfs(2)` via `libc`, same family
// of direct-syscall crate the wider example pack reaches for in this niche
// (coreos-installer, pop-os-distinst, and others all depend on `libc` for
// exactly this kind of low-level filesystem/device query).

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::Command;

use crate::error::{io_err, PatchError};

/// `block_size * free_blocks` for the filesystem containing `path`, or `-1`
/// on error.
pub fn free_space_for(path: &Path) -> i64 {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return -1;
    };

    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return -1;
        }
        (stat.f_bsize as i64).saturating_mul(stat.f_bavail as i64)
    }
}

/// "Enough space" per spec.md §4.3 step 6: both `free > 256 KiB` and
/// `free > 1.5 * target_size`.
pub fn enough_space(free: i64, target_size: u64) -> bool {
    if free < 0 {
        return false;
    }
    let free = free as u128;
    free > 256 * 1024 && free > (target_size as u128 * 3) / 2
}

/// Requests at least `bytes` of free space in `cache_dir`, invoking an
/// external cache-eviction policy to reclaim space if needed.
pub trait CacheEvictor {
    fn ensure_free(&self, cache_dir: &Path, bytes: u64) -> Result<(), PatchError>;
}

/// Default policy when no eviction hook is configured: just checks whether
/// the cache filesystem already has enough room, without trying to reclaim
/// any.
pub struct NoEvictionPolicy;

impl CacheEvictor for NoEvictionPolicy {
    fn ensure_free(&self, cache_dir: &Path, bytes: u64) -> Result<(), PatchError> {
        if enough_space(free_space_for(cache_dir), bytes) {
            Ok(())
        } else {
            Err(PatchError::InsufficientSpace)
        }
    }
}

/// Invokes an external command (the device's cache-cleanup script) with the
/// cache directory and the number of bytes requested, and trusts its exit
/// status.
pub struct ExternalScriptEvictor {
    pub command: std::path::PathBuf,
}

impl CacheEvictor for ExternalScriptEvictor {
    fn ensure_free(&self, cache_dir: &Path, bytes: u64) -> Result<(), PatchError> {
        let status = Command::new(&self.command)
            .arg(cache_dir)
            .arg(bytes.to_string())
            .status()
            .map_err(io_err)?;
        if status.success() {
            Ok(())
        } else {
            Err(PatchError::InsufficientSpace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_space_for_reports_nonnegative_for_tmp() {
        assert!(free_space_for(&std::env::temp_dir()) >= 0);
    }

    #[test]
    fn enough_space_requires_both_bounds() {
        assert!(!enough_space(-1, 0));
        assert!(!enough_space(200 * 1024, 0)); // below the 256 KiB floor
        assert!(!enough_space(1_000_000, 1_000_000)); // below 1.5x target
        assert!(enough_space(2_000_000, 1_000_000));
    }

    #[test]
    fn no_eviction_policy_fails_when_cache_fs_too_small() {
        let evictor = NoEvictionPolicy;
        let huge = u64::MAX / 2;
        assert!(evictor.ensure_free(&std::env::temp_dir(), huge).is_err());
    }
}
