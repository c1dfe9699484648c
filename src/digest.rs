// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// 20-byte SHA-1 content digest. The partition loader needs to snapshot the
// hasher's mid-stream state and finalize the snapshot without disturbing the
// original, so the hasher is kept value-typed and `Clone`.

use digest::Digest as _;
use sha1::Sha1;

use crate::error::PatchError;

pub const DIGEST_LEN: usize = 20;
pub type DigestBytes = [u8; DIGEST_LEN];

#[derive(Clone, Default)]
pub struct Hasher(Sha1);

impl Hasher {
    pub fn new() -> Self {
        Hasher(Sha1::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> DigestBytes {
        self.0.finalize().into()
    }

    /// Finalizes a clone of the current state, leaving `self` usable for
    /// further `update` calls.
    pub fn peek_finalize(&self) -> DigestBytes {
        self.clone().finalize()
    }
}

pub fn digest_of(data: &[u8]) -> DigestBytes {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn to_hex(digest: &DigestBytes) -> String {
    hex::encode(digest)
}

/// Parses exactly 40 hex characters, case-insensitive. Trailing content is
/// tolerated only if it doesn't start with another hex digit, so callers may
/// pass `"<hex>"` or `"<hex>:<tag>"` but a 41st hex character is rejected.
pub fn parse_digest(s: &str) -> Result<DigestBytes, PatchError> {
    if s.len() < 40 || !s.is_char_boundary(40) {
        return Err(PatchError::MalformedLocator(format!(
            "digest string too short: {s:?}"
        )));
    }
    let (head, tail) = s.split_at(40);
    if let Some(next) = tail.chars().next() {
        if next.is_ascii_hexdigit() {
            return Err(PatchError::MalformedLocator(format!(
                "digest string has a 41st hex digit: {s:?}"
            )));
        }
    }

    let mut out: DigestBytes = [0u8; DIGEST_LEN];
    hex::decode_to_slice(head, &mut out)
        .map_err(|e| PatchError::MalformedLocator(format!("invalid hex digest {head:?}: {e}")))?;
    Ok(out)
}

/// Returns the index of the first entry in `list` whose parsed digest
/// matches `digest`. Entries that fail to parse are skipped rather than
/// treated as fatal, so the list may mix bare hex digests with
/// `"<hex>:<tag>"` entries.
pub fn find_matching(digest: &DigestBytes, list: &[String]) -> Option<usize> {
    list.iter()
        .position(|entry| matches!(parse_digest(entry), Ok(d) if &d == digest))
}
