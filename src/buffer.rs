// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::sync::Arc;

use log::debug;
use log::error;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::RawDescriptor;
use crate::descriptor::SafeDescriptor;
use crate::descriptor::INVALID_DESCRIPTOR;
use crate::heap::DmaHeap;
use crate::mmap::MemoryMapping;
use crate::mmap::Protection;
use crate::sync::CapabilityKind;
use crate::sync::SyncAccess;
use crate::sync::SyncCapability;
use crate::sync::SyncUnsupported;
use crate::Error;
use crate::Result;

/// A dma-buf allocated from a dma-heap.
///
/// The buffer owns its descriptor and at most one mapping of its full size. Dropping it (or
/// calling [`DmaBuffer::release`]) unmaps the buffer first and then closes the descriptor.
///
/// A buffer is not synchronized: mapping, unmapping and releasing need exclusive access, and
/// coordinating access to the mapped contents with devices is up to the caller.
pub struct DmaBuffer {
    mapping: Option<MemoryMapping>,
    descriptor: Option<SafeDescriptor>,
    size: usize,
    capability: Arc<dyn SyncCapability>,
}

impl DmaBuffer {
    /// Creates an inert buffer with no descriptor. It can't be mapped, its sync sessions do
    /// nothing, and dropping it releases nothing.
    pub fn new() -> DmaBuffer {
        DmaBuffer {
            mapping: None,
            descriptor: None,
            size: 0,
            capability: Arc::new(SyncUnsupported),
        }
    }

    /// Allocates `size` bytes from the default heap. The heap node is only held open for the
    /// duration of the call.
    pub fn allocate(size: usize) -> Result<DmaBuffer> {
        DmaHeap::open()?.allocate(size)
    }

    /// Adopts `descriptor` as a buffer of `size` bytes, e.g. a dma-buf imported from another
    /// driver.
    pub fn from_descriptor(
        descriptor: SafeDescriptor,
        size: usize,
        capability: Arc<dyn SyncCapability>,
    ) -> DmaBuffer {
        DmaBuffer {
            mapping: None,
            descriptor: Some(descriptor),
            size,
            capability,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_allocated(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// The current mapping, if any.
    pub fn mapping(&self) -> Option<&MemoryMapping> {
        self.mapping.as_ref()
    }

    pub fn sync_kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    /// Maps the whole buffer, shared and read/write. Returns the existing mapping if the buffer
    /// is already mapped.
    pub fn map(&mut self) -> Result<&MemoryMapping> {
        let mapping = match self.mapping.take() {
            Some(mapping) => mapping,
            None => {
                let descriptor = self.descriptor.as_ref().ok_or(Error::NotAllocated)?;
                let mapping = MemoryMapping::from_descriptor(
                    descriptor,
                    self.size,
                    0,
                    Protection::read_write(),
                )
                .map_err(Error::Map)?;
                debug!(
                    "mapped descriptor {} at {:p}",
                    descriptor.as_raw_descriptor(),
                    mapping.as_ptr()
                );
                mapping
            }
        };
        Ok(&*self.mapping.insert(mapping))
    }

    /// Unmaps the buffer. Does nothing if it isn't mapped.
    pub fn unmap(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            debug!(
                "unmapping descriptor {} from {:p}",
                self.as_raw_descriptor(),
                mapping.as_ptr()
            );
        }
    }

    /// Starts a CPU access session. A no-op when the kernel doesn't support dma-buf sync or the
    /// buffer is inert.
    pub fn start_sync_session(&self, access: SyncAccess) -> Result<()> {
        match &self.descriptor {
            Some(descriptor) => self
                .capability
                .start_sync(descriptor, access)
                .map_err(Error::Sync),
            None => Ok(()),
        }
    }

    /// Ends a CPU access session started with the same `access`.
    pub fn stop_sync_session(&self, access: SyncAccess) -> Result<()> {
        match &self.descriptor {
            Some(descriptor) => self
                .capability
                .stop_sync(descriptor, access)
                .map_err(Error::Sync),
            None => Ok(()),
        }
    }

    /// Starts a CPU access session that ends when the returned guard is dropped.
    pub fn sync_session(&self, access: SyncAccess) -> Result<SyncSession<'_>> {
        self.start_sync_session(access)?;
        Ok(SyncSession {
            buffer: self,
            access,
        })
    }

    /// The device-visible physical address of the buffer, or 0 if the kernel can't provide one.
    pub fn physical_address(&self) -> u64 {
        match &self.descriptor {
            Some(descriptor) => self.capability.physical_address(descriptor),
            None => 0,
        }
    }

    /// Duplicates the dma-buf descriptor, e.g. to hand the buffer to a device driver.
    pub fn try_clone_descriptor(&self) -> Result<SafeDescriptor> {
        self.descriptor
            .as_ref()
            .ok_or(Error::NotAllocated)?
            .try_clone()
            .map_err(Error::CloneDescriptor)
    }

    /// Unmaps the buffer if needed and closes its descriptor. Never fails; problems are logged.
    pub fn release(self) {
        drop(self)
    }
}

impl Default for DmaBuffer {
    fn default() -> Self {
        DmaBuffer::new()
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        self.unmap();
        if let Some(descriptor) = self.descriptor.take() {
            debug!(
                "releasing descriptor {} ({} bytes)",
                descriptor.as_raw_descriptor(),
                self.size
            );
        }
    }
}

impl AsRawDescriptor for DmaBuffer {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.descriptor
            .as_ref()
            .map_or(INVALID_DESCRIPTOR, |d| d.as_raw_descriptor())
    }
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("descriptor", &self.as_raw_descriptor())
            .field("size", &self.size)
            .field("mapping", &self.mapping.as_ref().map(|m| m.as_ptr()))
            .field("sync", &self.capability.kind())
            .finish()
    }
}

/// Releases `buffer` if there is one.
pub fn release(buffer: Option<DmaBuffer>) {
    if let Some(buffer) = buffer {
        buffer.release();
    }
}

/// An open CPU access session on a [`DmaBuffer`]. Ends the session when dropped.
pub struct SyncSession<'a> {
    buffer: &'a DmaBuffer,
    access: SyncAccess,
}

impl SyncSession<'_> {
    pub fn access(&self) -> SyncAccess {
        self.access
    }
}

impl Drop for SyncSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.stop_sync_session(self.access) {
            error!(
                "failed to end {:?} sync on descriptor {}: {}",
                self.access,
                self.buffer.as_raw_descriptor(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::descriptor_is_open;
    use crate::sync::SyncCapable;
    use crate::test_utils::memfd;

    fn memfd_buffer(size: usize) -> DmaBuffer {
        DmaBuffer::from_descriptor(
            memfd("dma_buffer_test", size as u64),
            size,
            Arc::new(SyncUnsupported),
        )
    }

    #[test]
    fn inert_buffer() {
        let mut buffer = DmaBuffer::default();
        assert!(!buffer.is_allocated());
        assert!(!buffer.is_mapped());
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.as_raw_descriptor(), INVALID_DESCRIPTOR);
        assert!(matches!(buffer.map(), Err(Error::NotAllocated)));
        assert!(!buffer.is_mapped());
        buffer.unmap();
        buffer.start_sync_session(SyncAccess::ReadWrite).unwrap();
        buffer.stop_sync_session(SyncAccess::ReadWrite).unwrap();
        assert_eq!(buffer.physical_address(), 0);
        assert!(matches!(
            buffer.try_clone_descriptor(),
            Err(Error::NotAllocated)
        ));
        buffer.release();
    }

    #[test]
    fn map_is_idempotent() {
        let mut buffer = memfd_buffer(4096);
        let first = buffer.map().unwrap().as_ptr();
        let second = buffer.map().unwrap().as_ptr();
        assert_eq!(first, second);
        assert_eq!(buffer.mapping().unwrap().size(), 4096);
    }

    #[test]
    fn unmap_without_map() {
        let mut buffer = memfd_buffer(4096);
        buffer.unmap();
        buffer.unmap();
        assert!(!buffer.is_mapped());
        buffer.map().unwrap();
        assert!(buffer.is_mapped());
        buffer.unmap();
        buffer.unmap();
        assert!(!buffer.is_mapped());
    }

    #[test]
    fn contents_survive_remap() {
        let mut buffer = memfd_buffer(4096);
        let pattern: Vec<u8> = (0..4096).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(buffer.map().unwrap().write_slice(&pattern, 0).unwrap(), 4096);
        buffer.unmap();
        let mut readback = vec![0u8; 4096];
        assert_eq!(
            buffer.map().unwrap().read_slice(&mut readback, 0).unwrap(),
            4096
        );
        assert_eq!(readback, pattern);
    }

    #[test]
    fn failed_map_leaves_buffer_unmapped() {
        let mut buffer = memfd_buffer(0);
        assert!(matches!(buffer.map(), Err(Error::Map(_))));
        assert!(!buffer.is_mapped());
    }

    #[test]
    fn release_closes_descriptor() {
        let mut buffer = memfd_buffer(4096);
        buffer.map().unwrap();
        let clone = buffer.try_clone_descriptor().unwrap();
        assert_ne!(clone.as_raw_descriptor(), buffer.as_raw_descriptor());
        buffer.release();
        // The clone keeps the underlying file alive.
        assert!(descriptor_is_open(clone.as_raw_descriptor()));
    }

    #[test]
    fn release_absent_buffer() {
        release(None);
        release(Some(DmaBuffer::new()));
    }

    #[test]
    fn sync_session_guard() {
        let buffer = memfd_buffer(4096);
        let session = buffer.sync_session(SyncAccess::Write).unwrap();
        assert_eq!(session.access(), SyncAccess::Write);
        drop(session);
    }

    #[test]
    fn capable_sync_on_non_dma_buf_fails() {
        let buffer =
            DmaBuffer::from_descriptor(memfd("capable", 4096), 4096, Arc::new(SyncCapable));
        assert_eq!(buffer.sync_kind(), CapabilityKind::SyncCapable);
        assert!(matches!(
            buffer.start_sync_session(SyncAccess::Read),
            Err(Error::Sync(_))
        ));
        assert!(buffer.sync_session(SyncAccess::Read).is_err());
        assert_eq!(buffer.physical_address(), 0);
    }

    #[test]
    fn debug_format() {
        let buffer = DmaBuffer::new();
        let s = format!("{:?}", buffer);
        assert!(s.contains("size: 0"));
        assert!(s.contains("SyncUnsupported"));
    }
}
