// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Loads a named resource (plain file or `MTD:` partition locator) into
// memory along with its stat metadata and full digest (spec.md §4.2).

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::fs::MetadataExt;

use crate::digest::{self, DigestBytes, Hasher};
use crate::error::{io_err, PatchError};
use crate::partition::PartitionDriver;
use crate::patchset::PartitionSpec;

#[derive(Clone, Copy, Debug)]
pub struct Stat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

pub struct FileContents {
    pub data: Vec<u8>,
    pub digest: DigestBytes,
    pub stat: Stat,
}

impl FileContents {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

pub fn is_partition_locator(locator: &str) -> bool {
    locator.starts_with("MTD:")
}

pub fn load(locator: &str, driver: &PartitionDriver) -> Result<FileContents, PatchError> {
    match locator.strip_prefix("MTD:") {
        Some(rest) => load_partition(rest, driver),
        None => load_file(locator),
    }
}

fn load_file(path: &str) -> Result<FileContents, PatchError> {
    let meta = std::fs::metadata(path).map_err(io_err)?;
    let size = meta.len() as usize;
    let mut data = vec![0u8; size];
    let mut file = File::open(path).map_err(io_err)?;
    file.read_exact(&mut data).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            PatchError::ShortTransfer(format!("{path} was shorter than its reported size"))
        }
        _ => io_err(e),
    })?;
    let contents_digest = digest::digest_of(&data);
    let stat = Stat {
        mode: meta.mode() & 0o7777,
        uid: meta.uid(),
        gid: meta.gid(),
    };
    Ok(FileContents {
        data,
        digest: contents_digest,
        stat,
    })
}

/// Speculative prefix loader (spec.md §4.2). `rest` is the locator text
/// after the `MTD:` prefix: `<name>:<size>:<hex>[:<size>:<hex>...]`.
fn load_partition(rest: &str, driver: &PartitionDriver) -> Result<FileContents, PatchError> {
    let spec = PartitionSpec::parse(rest)?;
    let mut ctx = driver.open_read(&spec.name)?;

    let max_size = spec
        .candidates
        .iter()
        .map(|(size, _)| *size)
        .max()
        .expect("PartitionSpec::parse guarantees at least one candidate");
    let mut buffer = vec![0u8; max_size as usize];

    let mut order: Vec<usize> = (0..spec.candidates.len()).collect();
    order.sort_by_key(|&i| spec.candidates[i].0);

    let mut hasher = Hasher::new();
    let mut pos: u64 = 0;

    for i in order {
        let (size, expected) = spec.candidates[i];
        if size > pos {
            let start = pos as usize;
            let end = size as usize;
            ctx.read_exact_at(&mut buffer[start..end])?;
            hasher.update(&buffer[start..end]);
            pos = size;
        }

        let candidate_digest = hasher.peek_finalize();
        if candidate_digest == expected {
            return Ok(FileContents {
                data: buffer[..size as usize].to_vec(),
                digest: candidate_digest,
                stat: Stat {
                    mode: 0o644,
                    uid: 0,
                    gid: 0,
                },
            });
        }
    }

    Err(PatchError::DigestMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_of, to_hex};
    use std::path::PathBuf;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("otapatch-loader-test-{tag}-{}", std::process::id()))
    }

    #[test]
    fn loads_plain_file_and_computes_digest() {
        let dir = unique_temp_dir("plain");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("source");
        std::fs::write(&path, b"abc").unwrap();

        let driver = PartitionDriver::new(&dir);
        let contents = load(path.to_str().unwrap(), &driver).unwrap();
        assert_eq!(contents.data, b"abc");
        assert_eq!(contents.digest, digest_of(b"abc"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn short_file_read_is_an_error() {
        // A file that vanishes between stat and open is the easy way to
        // provoke a read error deterministically without truncating mid-test.
        let dir = unique_temp_dir("short");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("missing");
        let driver = PartitionDriver::new(&dir);
        assert!(load(path.to_str().unwrap(), &driver).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn partition_loader_picks_matching_candidate_at_second_boundary() {
        let dir = unique_temp_dir("partition");
        std::fs::create_dir_all(&dir).unwrap();
        let content = vec![7u8; 100];
        std::fs::write(dir.join("system"), &content).unwrap();

        let d1 = to_hex(&digest_of(&content[..100]));
        let wrong = "0".repeat(40);
        let locator = format!("MTD:system:50:{wrong}:100:{d1}");

        let driver = PartitionDriver::new(&dir);
        let contents = load(&locator, &driver).unwrap();
        assert_eq!(contents.data, content);
        assert_eq!(to_hex(&contents.digest), d1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn partition_loader_probes_ascending_size_regardless_of_list_order() {
        let dir = unique_temp_dir("partition-order");
        std::fs::create_dir_all(&dir).unwrap();
        let content = vec![3u8; 60];
        std::fs::write(dir.join("boot"), &content).unwrap();

        let full = to_hex(&digest_of(&content[..60]));
        let half = to_hex(&digest_of(&content[..30]));
        // Listed out of order: the larger candidate first.
        let locator = format!("MTD:boot:60:{full}:30:{half}");

        let driver = PartitionDriver::new(&dir);
        let contents = load(&locator, &driver).unwrap();
        // ascending-size probing finds the 30-byte candidate first
        assert_eq!(contents.data.len(), 30);
        assert_eq!(to_hex(&contents.digest), half);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn partition_loader_fails_when_no_candidate_matches() {
        let dir = unique_temp_dir("partition-nomatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("boot"), vec![1u8; 10]).unwrap();

        let wrong = "0".repeat(40);
        let locator = format!("MTD:boot:10:{wrong}");
        let driver = PartitionDriver::new(&dir);
        match load(&locator, &driver) {
            Err(PatchError::DigestMismatch) => {}
            other => panic!("expected DigestMismatch, got {other:?}"),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
