// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Locator grammar (spec.md §3, §6) and the patch set the orchestrator
// selects a candidate from.

use crate::digest::{parse_digest, DigestBytes};
use crate::error::PatchError;

/// Parsed `MTD:<name>:<size1>:<digest1>:<size2>:<digest2>:...` locator used
/// for *loading* a partition. The field count after the name must be even
/// and at least 2 (spec.md §3) — malformed locators are a hard parse error,
/// never a print-and-continue (spec.md §9 open question, resolved).
pub struct PartitionSpec {
    pub name: String,
    pub candidates: Vec<(u64, DigestBytes)>,
}

impl PartitionSpec {
    /// `rest` is the locator text with the `MTD:` prefix already stripped.
    pub fn parse(rest: &str) -> Result<Self, PatchError> {
        let fields: Vec<&str> = rest.split(':').collect();
        let name = fields
            .first()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PatchError::MalformedLocator("missing partition name".to_string()))?
            .to_string();

        let tail = &fields[1..];
        if tail.is_empty() || tail.len() % 2 != 0 {
            return Err(PatchError::MalformedLocator(format!(
                "partition locator must have an even, non-zero number of size:digest fields, got {}",
                tail.len()
            )));
        }

        let mut candidates = Vec::with_capacity(tail.len() / 2);
        for pair in tail.chunks(2) {
            let size: u64 = pair[0].parse().map_err(|_| {
                PatchError::MalformedLocator(format!("invalid candidate size {:?}", pair[0]))
            })?;
            let digest = parse_digest(pair[1])?;
            candidates.push((size, digest));
        }

        Ok(PartitionSpec { name, candidates })
    }
}

/// Extracts just the partition name from a *writing* locator,
/// `MTD:<name>[:...]` — only the name is used (spec.md §6).
pub fn partition_name_for_write(locator: &str) -> Result<String, PatchError> {
    let rest = locator
        .strip_prefix("MTD:")
        .ok_or_else(|| PatchError::MalformedLocator(format!("not a partition locator: {locator:?}")))?;
    let name = rest
        .split(':')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PatchError::MalformedLocator("missing partition name".to_string()))?;
    Ok(name.to_string())
}

pub enum PatchKind {
    Bsdiff,
    Imgdiff,
}

/// Determines patch kind from the first 8 bytes of a patch blob.
pub fn detect_kind(blob: &[u8]) -> Result<PatchKind, PatchError> {
    if blob.len() < 8 {
        return Err(PatchError::UnknownPatchFormat(
            "patch blob shorter than 8 bytes".to_string(),
        ));
    }
    match &blob[..8] {
        b"BSDIFF40" => Ok(PatchKind::Bsdiff),
        b"IMGDIFF2" => Ok(PatchKind::Imgdiff),
        other => Err(PatchError::UnknownPatchFormat(format!(
            "unrecognized magic {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Parallel sequences of candidate source digests and their patches. The
/// orchestrator selects the index whose `source_digests[i]` matches the
/// loaded source's digest.
pub struct PatchSet {
    pub source_digests: Vec<String>,
    pub patches: Vec<Vec<u8>>,
}

impl PatchSet {
    pub fn new(source_digests: Vec<String>, patches: Vec<Vec<u8>>) -> Self {
        assert_eq!(
            source_digests.len(),
            patches.len(),
            "PatchSet requires source_digests and patches of equal length"
        );
        PatchSet {
            source_digests,
            patches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_of, to_hex};

    #[test]
    fn parses_two_candidates() {
        let a = to_hex(&digest_of(b"a"));
        let b = to_hex(&digest_of(b"bb"));
        let spec = PartitionSpec::parse(&format!("system:1:{a}:2:{b}")).unwrap();
        assert_eq!(spec.name, "system");
        assert_eq!(spec.candidates.len(), 2);
        assert_eq!(spec.candidates[0].0, 1);
        assert_eq!(spec.candidates[1].0, 2);
    }

    #[test]
    fn rejects_odd_field_count() {
        let a = to_hex(&digest_of(b"a"));
        assert!(PartitionSpec::parse(&format!("system:1:{a}:2")).is_err());
    }

    #[test]
    fn rejects_empty_candidate_list() {
        assert!(PartitionSpec::parse("system").is_err());
    }

    #[test]
    fn write_locator_only_needs_the_name() {
        assert_eq!(
            partition_name_for_write("MTD:system:1:deadbeef").unwrap(),
            "system"
        );
        assert_eq!(partition_name_for_write("MTD:system").unwrap(), "system");
    }

    #[test]
    fn detects_bsdiff_and_imgdiff_magic() {
        assert!(matches!(detect_kind(b"BSDIFF40rest"), Ok(PatchKind::Bsdiff)));
        assert!(matches!(detect_kind(b"IMGDIFF2rest"), Ok(PatchKind::Imgdiff)));
        assert!(detect_kind(b"XYZZY000").is_err());
    }
}
