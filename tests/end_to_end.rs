// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// End-to-end coverage of `Orchestrator::apply_patch` through the public
// crate API only, complementing the inline unit tests in `src/orchestrator.rs`
// with the partition-target commit path those don't exercise.

#![cfg(feature = "bsdiff-codec")]

use std::path::PathBuf;

use otapatch::digest::{digest_of, to_hex};
use otapatch::{Orchestrator, PatchSet};

fn unique_temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "otapatch-e2e-{tag}-{}-{}",
        std::process::id(),
        tag.len()
    ))
}

fn bsdiff_patch(old: &[u8], new: &[u8]) -> Vec<u8> {
    let mut patch = Vec::new();
    bsdiff::diff(old, new, &mut patch).unwrap();
    patch
}

#[test]
fn partition_target_write_commits_new_contents() {
    let dir = unique_temp_dir("partition-commit");
    let partitions = dir.join("partitions");
    std::fs::create_dir_all(&partitions).unwrap();

    let old = b"partition contents before update";
    let new = b"partition contents after update!";
    std::fs::write(partitions.join("system"), old).unwrap();

    let source = dir.join("source.img");
    std::fs::write(&source, old).unwrap();

    let source_digest = to_hex(&digest_of(old));
    let target_digest = to_hex(&digest_of(new));
    let patch = bsdiff_patch(old, new);
    let patch_set = PatchSet::new(vec![source_digest], vec![patch]);

    let orchestrator =
        Orchestrator::new(partitions.as_path()).with_cache_backup_path(dir.join("saved.file"));

    let result = orchestrator.apply_patch(
        source.to_str().unwrap(),
        "MTD:system",
        &target_digest,
        new.len() as u64,
        &patch_set,
    );
    assert!(result.is_ok(), "{result:?}");

    let committed = std::fs::read(partitions.join("system")).unwrap();
    assert_eq!(committed, new);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn partition_source_picked_via_speculative_candidate_probing() {
    let dir = unique_temp_dir("partition-source");
    let partitions = dir.join("partitions");
    std::fs::create_dir_all(&partitions).unwrap();

    // The raw partition genuinely holds 80 bytes; the caller only knows two
    // candidate (size, digest) pairs to probe against, smaller one first in
    // actual file layout order but listed out of order in the locator.
    let full_old = vec![9u8; 80];
    std::fs::write(partitions.join("boot"), &full_old).unwrap();

    let prefix_old = &full_old[..40];
    let new = b"the fully replaced boot image contents\0";

    let full_digest = to_hex(&digest_of(&full_old));
    let prefix_digest = to_hex(&digest_of(prefix_old));
    let source_locator = format!("MTD:boot:{}:{}:{}:{}", 80, full_digest, 40, prefix_digest);

    let target = dir.join("target.img");
    let target_digest = to_hex(&digest_of(new));
    let patch = bsdiff_patch(prefix_old, new);
    let patch_set = PatchSet::new(vec![prefix_digest], vec![patch]);

    let orchestrator =
        Orchestrator::new(partitions.as_path()).with_cache_backup_path(dir.join("saved.file"));

    let result = orchestrator.apply_patch(
        &source_locator,
        target.to_str().unwrap(),
        &target_digest,
        new.len() as u64,
        &patch_set,
    );
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(std::fs::read(&target).unwrap(), new);

    std::fs::remove_dir_all(&dir).unwrap();
}
