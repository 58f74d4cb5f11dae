// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::min;
use std::mem::size_of;
use std::ptr::copy_nonoverlapping;
use std::ptr::null_mut;
use std::ptr::read_unaligned;
use std::ptr::write_unaligned;

use libc::c_int;
use libc::c_void;
use libc::PROT_READ;
use libc::PROT_WRITE;
use log::error;
use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

use crate::descriptor::AsRawDescriptor;

#[sorted]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("requested memory out of range")]
    InvalidAddress,
    #[error("requested offset is out of range of off_t")]
    InvalidOffset,
    #[error("requested memory range spans past the end of the region: offset={0} count={1} region_size={2}")]
    InvalidRange(usize, usize, usize),
    #[error("mmap related system call failed: {0}")]
    SystemCallFailed(#[source] crate::errno::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Memory access type for a mapping.
#[derive(Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct Protection {
    read: bool,
    write: bool,
}

impl Protection {
    /// Returns Protection allowing read/write access.
    #[inline(always)]
    pub fn read_write() -> Protection {
        Protection {
            read: true,
            write: true,
        }
    }

    /// Returns Protection allowing read access.
    #[inline(always)]
    pub fn read() -> Protection {
        Protection {
            read: true,
            ..Default::default()
        }
    }

    /// Returns true if all access allowed by |other| is also allowed by |self|.
    #[inline(always)]
    pub fn allows(&self, other: &Protection) -> bool {
        self.read >= other.read && self.write >= other.write
    }
}

impl From<Protection> for c_int {
    #[inline(always)]
    fn from(p: Protection) -> Self {
        let mut value = 0;
        if p.read {
            value |= PROT_READ
        }
        if p.write {
            value |= PROT_WRITE;
        }
        value
    }
}

/// Validates that `offset`..`offset+range_size` lies within the bounds of a memory mapping of
/// `mmap_size` bytes.  Also checks for any overflow.
fn validate_includes_range(mmap_size: usize, offset: usize, range_size: usize) -> Result<()> {
    let end_offset = offset
        .checked_add(range_size)
        .ok_or(Error::InvalidAddress)?;
    if end_offset <= mmap_size {
        Ok(())
    } else {
        Err(Error::InvalidRange(offset, range_size, mmap_size))
    }
}

/// Wraps a shared mapping of a descriptor in the current process. Provides RAII semantics
/// including munmap when no longer needed.
///
/// Writes through the mapping are visible to every other mapper of the same descriptor and to
/// devices accessing the underlying buffer.
#[derive(Debug)]
pub struct MemoryMapping {
    addr: *mut u8,
    size: usize,
}

// SAFETY:
// The mapping owns its address range; the memory contents are shared with the kernel and other
// mappers, which callers coordinate through sync sessions.
unsafe impl Send for MemoryMapping {}
// SAFETY:
// See above. No method hands out references into the mapping.
unsafe impl Sync for MemoryMapping {}

impl MemoryMapping {
    /// Maps `size` bytes of `descriptor` starting at `offset` with `MAP_SHARED`.
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        offset: u64,
        prot: Protection,
    ) -> Result<MemoryMapping> {
        let offset: libc::off_t = offset.try_into().map_err(|_| Error::InvalidOffset)?;
        // SAFETY:
        // Safe because we let the kernel pick the address, so no existing memory is touched, and
        // we check the return value.
        let addr = unsafe {
            libc::mmap(
                null_mut(),
                size,
                prot.into(),
                libc::MAP_SHARED,
                descriptor.as_raw_descriptor(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::SystemCallFailed(crate::errno::Error::last()));
        }
        Ok(MemoryMapping {
            addr: addr as *mut u8,
            size,
        })
    }

    /// Returns a pointer to the beginning of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    /// Returns the size of the mapping in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies as much of `buf` as fits into the mapping at `offset`. Returns the number of bytes
    /// copied.
    pub fn write_slice(&self, buf: &[u8], offset: usize) -> Result<usize> {
        match self.size.checked_sub(offset) {
            Some(size_past_offset) => {
                let bytes_copied = min(size_past_offset, buf.len());
                // SAFETY:
                // The bytes_copied equation above ensures we don't copy bytes out of range of
                // either buf or the mapping, and a slice can't alias memory we mapped ourselves.
                unsafe {
                    copy_nonoverlapping(buf.as_ptr(), self.addr.add(offset), bytes_copied);
                }
                Ok(bytes_copied)
            }
            None => Err(Error::InvalidAddress),
        }
    }

    /// Copies as much of the mapping starting at `offset` as fits into `buf`. Returns the number
    /// of bytes copied.
    pub fn read_slice(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        match self.size.checked_sub(offset) {
            Some(size_past_offset) => {
                let bytes_copied = min(size_past_offset, buf.len());
                // SAFETY:
                // See `write_slice`.
                unsafe {
                    copy_nonoverlapping(self.addr.add(offset), buf.as_mut_ptr(), bytes_copied);
                }
                Ok(bytes_copied)
            }
            None => Err(Error::InvalidAddress),
        }
    }

    /// Writes an object to the mapping at the specified offset.
    /// Returns Ok(()) if the object fits, or Err if it extends past the end.
    pub fn write_obj<T: IntoBytes + Immutable>(&self, val: T, offset: usize) -> Result<()> {
        validate_includes_range(self.size, offset, size_of::<T>())?;
        // SAFETY:
        // This is safe because we checked the bounds above.
        unsafe {
            write_unaligned(self.addr.add(offset) as *mut T, val);
        }
        Ok(())
    }

    /// Reads an object from the mapping at the given offset.
    /// Reading from memory a device may be writing isn't strictly safe as it could change
    /// mid-read. However, as long as the type T is plain old data and can handle random
    /// initialization, everything will be OK.
    pub fn read_obj<T: FromBytes>(&self, offset: usize) -> Result<T> {
        validate_includes_range(self.size, offset, size_of::<T>())?;
        // SAFETY:
        // This is safe because by definition FromBytes types can have their bits set arbitrarily
        // and still be valid.
        unsafe { Ok(read_unaligned(self.addr.add(offset) as *const T)) }
    }

    /// Calls msync with MS_SYNC on `size` bytes starting at `offset` from the start of the
    /// mapping.
    pub fn msync(&self, offset: usize, size: usize) -> Result<()> {
        validate_includes_range(self.size, offset, size)?;
        // SAFETY:
        // Safe because the range was validated against a mapping we own.
        let ret = unsafe {
            libc::msync(
                self.addr.add(offset) as *mut c_void,
                size,
                libc::MS_SYNC,
            )
        };
        if ret != -1 {
            Ok(())
        } else {
            Err(Error::SystemCallFailed(crate::errno::Error::last()))
        }
    }
}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // SAFETY:
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        let ret = unsafe { libc::munmap(self.addr as *mut c_void, self.size) };
        if ret < 0 {
            error!(
                "failed to unmap {} bytes at {:p}: {}",
                self.size,
                self.addr,
                crate::errno::Error::last()
            );
        }
    }
}
