// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use dma_heap_sys::dma_heap_allocation_data;
use dma_heap_sys::DMA_HEAP_IOCTL_ALLOC;
use dma_heap_sys::DMA_HEAP_VALID_FD_FLAGS;
use dma_heap_sys::DMA_HEAP_VALID_HEAP_FLAGS;
use log::debug;
use once_cell::sync::OnceCell;

use crate::buffer::DmaBuffer;
use crate::config::DmaHeapConfig;
use crate::config::SyncMode;
use crate::descriptor::AsRawDescriptor;
use crate::descriptor::FromRawDescriptor;
use crate::descriptor::RawDescriptor;
use crate::descriptor::SafeDescriptor;
use crate::errno;
use crate::handle_eintr_errno;
use crate::ioctl::ioctl_with_mut_ref;
use crate::sync::probe_sync_capability;
use crate::sync::SyncCapability;
use crate::sync::SyncUnsupported;
use crate::Error;
use crate::Result;

/// An open dma-heap device node.
///
/// The sync capability of the heap's buffers is decided once, with the first buffer allocated,
/// and shared by every later buffer.
#[derive(Debug)]
pub struct DmaHeap {
    heap: File,
    config: DmaHeapConfig,
    capability: OnceCell<Arc<dyn SyncCapability>>,
}

impl DmaHeap {
    /// Opens the heap at [`DEFAULT_HEAP_PATH`](crate::DEFAULT_HEAP_PATH).
    pub fn open() -> Result<DmaHeap> {
        DmaHeap::new(DmaHeapConfig::default())
    }

    /// Opens the heap described by `config`. Flags the kernel would reject on every allocation
    /// are refused up front.
    pub fn new(config: DmaHeapConfig) -> Result<DmaHeap> {
        if config.fd_flags & !DMA_HEAP_VALID_FD_FLAGS != 0 {
            return Err(Error::InvalidFdFlags(config.fd_flags));
        }
        if config.heap_flags & !DMA_HEAP_VALID_HEAP_FLAGS != 0 {
            return Err(Error::InvalidHeapFlags(config.heap_flags));
        }
        let heap = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(&config.path)
            .map_err(|e| Error::OpenHeap(config.path.clone(), e))?;
        debug!("opened dma-heap {}", config.path.display());
        Ok(DmaHeap {
            heap,
            config,
            capability: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &DmaHeapConfig {
        &self.config
    }

    /// Allocates a buffer of `size` bytes. The size is passed to the kernel as is; the kernel
    /// rounds it up to whole pages and rejects 0.
    pub fn allocate(&self, size: usize) -> Result<DmaBuffer> {
        let mut data = dma_heap_allocation_data {
            len: size as u64,
            fd: 0,
            fd_flags: self.config.fd_flags,
            heap_flags: self.config.heap_flags,
        };
        // SAFETY:
        // Safe because the kernel writes only within `data`, and we check the return value
        // before trusting `data.fd`.
        let ret = handle_eintr_errno!(unsafe {
            ioctl_with_mut_ref(&self.heap, DMA_HEAP_IOCTL_ALLOC(), &mut data)
        });
        if ret < 0 {
            return Err(Error::Allocate(size, errno::Error::last()));
        }
        // SAFETY:
        // Safe because the kernel just handed us this descriptor and nothing else owns it.
        let descriptor = unsafe { SafeDescriptor::from_raw_descriptor(data.fd as RawDescriptor) };
        debug!(
            "allocated {} bytes from {} as descriptor {}",
            size,
            self.config.path.display(),
            descriptor.as_raw_descriptor()
        );
        let capability = self.capability_for(&descriptor);
        Ok(DmaBuffer::from_descriptor(descriptor, size, capability))
    }

    /// Returns the capability selected for this heap, probing with `descriptor` on first use.
    fn capability_for(&self, descriptor: &SafeDescriptor) -> Arc<dyn SyncCapability> {
        self.capability
            .get_or_init(|| match self.config.sync {
                SyncMode::Probe => probe_sync_capability(descriptor),
                SyncMode::Disabled => Arc::new(SyncUnsupported),
            })
            .clone()
    }
}

impl AsRawDescriptor for DmaHeap {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.heap.as_raw_descriptor()
    }
}
