// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache
//
// Status output. The teacher drives an indicatif multi-progress bar for its
// long-running downloads and extractions; a single patch application has no
// comparable notion of progress, so this keeps only the stable-prefix
// println/eprintln convention the teacher's `ui_print` wraps, without the
// spinner/progress-bar machinery that convention exists to support.

use std::fmt::Display;

pub fn println(message: impl Display) {
    println!("otapatch: {message}");
}

pub fn eprintln(message: impl Display) {
    eprintln!("otapatch: {message}");
}
