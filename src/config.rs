// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// The contiguous-memory heap present on most embedded kernels.
pub const DEFAULT_HEAP_PATH: &str = "/dev/dma_heap/linux,cma";

/// How a heap decides which [`SyncCapability`](crate::SyncCapability) its buffers use.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Probe the kernel with the first buffer allocated from the heap.
    #[default]
    Probe,
    /// Never issue sync or physical address ioctls.
    Disabled,
}

/// Parameters of a dma-heap.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "kebab-case")]
pub struct DmaHeapConfig {
    /// Heap device node.
    pub path: PathBuf,
    /// Flags for the dma-buf descriptor returned by the heap; `O_CLOEXEC` and the access mode.
    pub fd_flags: u32,
    /// Heap specific allocation flags.
    pub heap_flags: u64,
    pub sync: SyncMode,
}

impl Default for DmaHeapConfig {
    fn default() -> Self {
        DmaHeapConfig {
            path: PathBuf::from(DEFAULT_HEAP_PATH),
            fd_flags: (libc::O_RDWR | libc::O_CLOEXEC) as u32,
            heap_flags: 0,
            sync: SyncMode::Probe,
        }
    }
}

impl DmaHeapConfig {
    /// Default parameters for the heap at `path`.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        DmaHeapConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Reads a JSON configuration file. Absent keys take their default values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ReadConfig(path.to_path_buf(), e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ParseConfig(path.to_path_buf(), e))
    }
}
