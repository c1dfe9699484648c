// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Semantic error kinds for patch application (spec.md §7), derived with
// `thiserror` the way `examples/other_examples/534abebd_yonran-dvdromcopy`'s
// `UdfError` derives its own per-variant `#[error("...")]` messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed locator: {0}")]
    MalformedLocator(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("short transfer: {0}")]
    ShortTransfer(String),
    #[error("digest mismatch")]
    DigestMismatch,
    #[error("source is missing and no usable cache backup was found")]
    CorruptSource,
    #[error("unknown patch format: {0}")]
    UnknownPatchFormat(String),
    #[error("insufficient free space")]
    InsufficientSpace,
    #[error("decoder failed: {0}")]
    DecoderFailure(String),
}

pub(crate) fn io_err(e: std::io::Error) -> PatchError {
    PatchError::Io(e.to_string())
}
