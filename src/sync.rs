// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! CPU access synchronization and physical address queries for dma-bufs.
//!
//! Whether the kernel supports these is only known at runtime, so each buffer carries a
//! [`SyncCapability`] selected by [`probe_sync_capability`]. The [`SyncUnsupported`] variant turns
//! every operation into a successful no-op and reports a physical address of 0. Callers must not
//! read that as coherency being managed, nor 0 as a usable address.

use std::fmt;
use std::os::raw::c_ulong;
use std::sync::Arc;

use dma_heap_sys::dma_buf_sync;
use dma_heap_sys::DMA_BUF_IOCTL_PHYS;
use dma_heap_sys::DMA_BUF_IOCTL_SYNC;
use dma_heap_sys::DMA_BUF_SYNC_END;
use dma_heap_sys::DMA_BUF_SYNC_READ;
use dma_heap_sys::DMA_BUF_SYNC_RW;
use dma_heap_sys::DMA_BUF_SYNC_START;
use dma_heap_sys::DMA_BUF_SYNC_WRITE;
use log::debug;
use log::error;
use log::info;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use crate::descriptor::AsRawDescriptor;
use crate::errno::errno_result;
use crate::errno::Result;
use crate::handle_eintr_errno;
use crate::ioctl::ioctl_with_mut_ref;
use crate::ioctl::ioctl_with_ref;

/// The direction of CPU access bracketed by a sync session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAccess {
    Read,
    Write,
    ReadWrite,
}

impl SyncAccess {
    fn flags(self) -> u64 {
        match self {
            SyncAccess::Read => DMA_BUF_SYNC_READ,
            SyncAccess::Write => DMA_BUF_SYNC_WRITE,
            SyncAccess::ReadWrite => DMA_BUF_SYNC_RW,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CapabilityKind {
    SyncCapable,
    SyncUnsupported,
}

/// Kernel-dependent dma-buf operations.
pub trait SyncCapability: fmt::Debug + Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// Begins a CPU access session on `buffer`.
    fn start_sync(&self, buffer: &dyn AsRawDescriptor, access: SyncAccess) -> Result<()>;

    /// Ends a CPU access session started with the same `access`.
    fn stop_sync(&self, buffer: &dyn AsRawDescriptor, access: SyncAccess) -> Result<()>;

    /// Returns the device-visible physical address of `buffer`, or 0 if it can't be resolved.
    fn physical_address(&self, buffer: &dyn AsRawDescriptor) -> u64;
}

/// Issues `DMA_BUF_IOCTL_SYNC` and `DMA_BUF_IOCTL_PHYS` against the kernel.
#[derive(Debug, Default)]
pub struct SyncCapable;

impl SyncCapability for SyncCapable {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::SyncCapable
    }

    fn start_sync(&self, buffer: &dyn AsRawDescriptor, access: SyncAccess) -> Result<()> {
        dma_buf_sync_ioctl(buffer, DMA_BUF_SYNC_START | access.flags())
    }

    fn stop_sync(&self, buffer: &dyn AsRawDescriptor, access: SyncAccess) -> Result<()> {
        dma_buf_sync_ioctl(buffer, DMA_BUF_SYNC_END | access.flags())
    }

    fn physical_address(&self, buffer: &dyn AsRawDescriptor) -> u64 {
        physical_address(buffer)
    }
}

/// Stands in when the kernel lacks dma-buf sync: everything succeeds and does nothing.
#[derive(Debug, Default)]
pub struct SyncUnsupported;

impl SyncCapability for SyncUnsupported {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::SyncUnsupported
    }

    fn start_sync(&self, _buffer: &dyn AsRawDescriptor, _access: SyncAccess) -> Result<()> {
        Ok(())
    }

    fn stop_sync(&self, _buffer: &dyn AsRawDescriptor, _access: SyncAccess) -> Result<()> {
        Ok(())
    }

    fn physical_address(&self, _buffer: &dyn AsRawDescriptor) -> u64 {
        0
    }
}

fn dma_buf_sync_ioctl(buffer: &dyn AsRawDescriptor, flags: u64) -> Result<()> {
    let sync = dma_buf_sync { flags };
    // SAFETY:
    // Safe because the kernel only reads `sync`, which outlives the call, and we check the
    // return value.
    let ret = handle_eintr_errno!(unsafe { ioctl_with_ref(buffer, DMA_BUF_IOCTL_SYNC(), &sync) });
    if ret < 0 {
        errno_result()
    } else {
        Ok(())
    }
}

/// Resolves the physical address backing the dma-buf `descriptor`.
///
/// Only vendor kernels implement `DMA_BUF_IOCTL_PHYS`. Returns 0 when the query is unsupported or
/// fails; 0 is never a valid result.
pub fn physical_address(descriptor: &dyn AsRawDescriptor) -> u64 {
    let mut phys: c_ulong = 0;
    // SAFETY:
    // Safe because the kernel writes at most an unsigned long into `phys` and we check the return
    // value.
    let ret = unsafe { ioctl_with_mut_ref(descriptor, DMA_BUF_IOCTL_PHYS(), &mut phys) };
    if ret < 0 {
        debug!(
            "physical address unavailable for descriptor {}: {}",
            descriptor.as_raw_descriptor(),
            crate::errno::Error::last()
        );
        return 0;
    }
    phys as u64
}

/// Selects the capability variant by running one empty read session on `descriptor`, which must
/// refer to a dma-buf.
pub fn probe_sync_capability(descriptor: &dyn AsRawDescriptor) -> Arc<dyn SyncCapability> {
    if run_probe_session(&SyncCapable, descriptor) {
        info!("dma-buf sync supported");
        Arc::new(SyncCapable)
    } else {
        Arc::new(SyncUnsupported)
    }
}

/// Runs one read session with `candidate`. A session that starts but can't be stopped is stopped
/// once more so the buffer isn't left in CPU access, and the candidate is rejected.
fn run_probe_session(candidate: &dyn SyncCapability, descriptor: &dyn AsRawDescriptor) -> bool {
    if let Err(e) = candidate.start_sync(descriptor, SyncAccess::Read) {
        info!("dma-buf sync unsupported ({}), cache maintenance disabled", e);
        return false;
    }
    match candidate.stop_sync(descriptor, SyncAccess::Read) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "failed to end sync on descriptor {}: {}, retrying",
                descriptor.as_raw_descriptor(),
                e
            );
            if let Err(e) = candidate.stop_sync(descriptor, SyncAccess::Read) {
                error!(
                    "descriptor {} left in a read sync session: {}",
                    descriptor.as_raw_descriptor(),
                    e
                );
            }
            info!("dma-buf sync unreliable, cache maintenance disabled");
            false
        }
    }
}
