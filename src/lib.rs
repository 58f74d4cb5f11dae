// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A safe wrapper around the Linux dma-heap allocator.
//!
//! A [`DmaHeap`] opens a heap node such as `/dev/dma_heap/linux,cma` and hands out
//! [`DmaBuffer`]s, each owning one dma-buf descriptor. Buffers can be mapped into the process,
//! bracketed with sync sessions around CPU access, and exported to devices by descriptor or, on
//! kernels that support it, by physical address.
//!
//! # Examples
//!
//! ```no_run
//! use dma_heap::DmaBuffer;
//! use dma_heap::SyncAccess;
//!
//! let mut buffer = DmaBuffer::allocate(4096)?;
//! buffer.map()?.write_slice(&[0xaa; 64], 0)?;
//! {
//!     let _session = buffer.sync_session(SyncAccess::Read)?;
//!     let mut data = [0u8; 64];
//!     buffer.mapping().unwrap().read_slice(&mut data, 0)?;
//! }
//! buffer.release();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg(any(target_os = "android", target_os = "linux"))]

mod buffer;
mod config;
pub mod descriptor;
pub mod errno;
mod heap;
pub mod ioctl;
pub mod mmap;
mod sync;
pub mod test_utils;

use std::io;
use std::path::PathBuf;

use remain::sorted;
use thiserror::Error as ThisError;

pub use buffer::release;
pub use buffer::DmaBuffer;
pub use buffer::SyncSession;
pub use config::DmaHeapConfig;
pub use config::SyncMode;
pub use config::DEFAULT_HEAP_PATH;
pub use descriptor::AsRawDescriptor;
pub use descriptor::FromRawDescriptor;
pub use descriptor::IntoRawDescriptor;
pub use descriptor::RawDescriptor;
pub use descriptor::SafeDescriptor;
pub use descriptor::INVALID_DESCRIPTOR;
pub use heap::DmaHeap;
pub use mmap::MemoryMapping;
pub use mmap::Protection;
pub use sync::physical_address;
pub use sync::probe_sync_capability;
pub use sync::CapabilityKind;
pub use sync::SyncAccess;
pub use sync::SyncCapability;
pub use sync::SyncCapable;
pub use sync::SyncUnsupported;

#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("failed to allocate {0} bytes from the heap: {1}")]
    Allocate(usize, errno::Error),
    #[error("failed to duplicate the buffer descriptor: {0}")]
    CloneDescriptor(errno::Error),
    #[error("fd flags {0:#x} include bits the heap doesn't accept")]
    InvalidFdFlags(u32),
    #[error("heap flags {0:#x} include bits the heap doesn't accept")]
    InvalidHeapFlags(u64),
    #[error("failed to map the buffer: {0}")]
    Map(mmap::Error),
    #[error("buffer has no descriptor")]
    NotAllocated,
    #[error("failed to open dma-heap {0}: {1}")]
    OpenHeap(PathBuf, io::Error),
    #[error("failed to parse config file {0}: {1}")]
    ParseConfig(PathBuf, serde_json::Error),
    #[error("failed to read config file {0}: {1}")]
    ReadConfig(PathBuf, io::Error),
    #[error("dma-buf sync failed: {0}")]
    Sync(errno::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
