// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Thin argument surface over `Orchestrator::apply_patch`, clap-derive the
// same way the teacher's `cli::entry` builds its `Cli` struct, scaled down
// to the handful of flags this operation actually needs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use otapatch::{report, Orchestrator, PatchSet};

/// Apply a binary patch to a file or raw partition, with crash-safe
/// recovery via a cache backup.
#[derive(Parser, Debug)]
#[command(name = "otapatch", version, about)]
pub struct Cli {
    /// Source locator: a file path, or `MTD:<name>:<size>:<digest>[...]`.
    pub source: String,

    /// Target locator, or `-` to patch the source in place.
    pub target: String,

    /// Expected SHA-1 digest of the target, as 40 hex characters.
    pub target_digest: String,

    /// Expected size in bytes of the target once patched.
    pub target_size: u64,

    /// One or more `<source-digest-hex>:<patch-file>` pairs, matched
    /// against the source's digest to pick which patch applies.
    #[arg(required = true, num_args = 1..)]
    pub patches: Vec<String>,

    /// Root directory that `MTD:` locators resolve partition names under.
    #[arg(long, default_value = "/dev/block/by-name")]
    pub partition_root: PathBuf,

    /// Path used to stash a copy of the source before a risky write.
    #[arg(long, default_value = "/cache/saved.file")]
    pub cache_backup: PathBuf,
}

pub fn run(cli: Cli) -> Result<()> {
    let mut source_digests = Vec::with_capacity(cli.patches.len());
    let mut patches = Vec::with_capacity(cli.patches.len());

    for entry in &cli.patches {
        let (digest, path) = entry
            .split_once(':')
            .with_context(|| format!("malformed patch argument {entry:?}, expected <digest>:<path>"))?;
        let blob = std::fs::read(path).with_context(|| format!("reading patch file {path:?}"))?;
        source_digests.push(digest.to_string());
        patches.push(blob);
    }

    let patch_set = PatchSet::new(source_digests, patches);
    let orchestrator =
        Orchestrator::new(cli.partition_root).with_cache_backup_path(cli.cache_backup);

    orchestrator
        .apply_patch(
            &cli.source,
            &cli.target,
            &cli.target_digest,
            cli.target_size,
            &patch_set,
        )
        .map_err(|e| {
            report::eprintln(format!("failed: {e}"));
            anyhow::anyhow!(e)
        })
}
