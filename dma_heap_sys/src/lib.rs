// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Linux dma-heap and dma-buf API bindings.
//!
//! Covers `<linux/dma-heap.h>`, the `DMA_BUF_IOCTL_SYNC` part of `<linux/dma-buf.h>`, and the
//! `DMA_BUF_IOCTL_PHYS` query carried by i.MX vendor kernels.

#![cfg(any(target_os = "android", target_os = "linux"))]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

pub mod ioctl;

use std::os::raw::c_uint;
use std::os::raw::c_ulong;

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

#[cfg(any(target_os = "android", target_env = "musl"))]
pub type IoctlNr = std::os::raw::c_int;
#[cfg(not(any(target_os = "android", target_env = "musl")))]
pub type IoctlNr = std::os::raw::c_ulong;

pub const DMA_HEAP_IOC_MAGIC: c_uint = 0x48; // 'H'
pub const DMA_BUF_BASE: c_uint = 0x62; // 'b'

/// Valid bits of `dma_heap_allocation_data::fd_flags`.
pub const DMA_HEAP_VALID_FD_FLAGS: u32 = (libc::O_CLOEXEC | libc::O_ACCMODE) as u32;
/// No heap flags are currently defined by the kernel.
pub const DMA_HEAP_VALID_HEAP_FLAGS: u64 = 0;

pub const DMA_BUF_SYNC_READ: u64 = 1 << 0;
pub const DMA_BUF_SYNC_WRITE: u64 = 2 << 0;
pub const DMA_BUF_SYNC_RW: u64 = DMA_BUF_SYNC_READ | DMA_BUF_SYNC_WRITE;
pub const DMA_BUF_SYNC_START: u64 = 0 << 2;
pub const DMA_BUF_SYNC_END: u64 = 1 << 2;
pub const DMA_BUF_SYNC_VALID_FLAGS_MASK: u64 = DMA_BUF_SYNC_RW | DMA_BUF_SYNC_END;

/// Metadata passed to `DMA_HEAP_IOCTL_ALLOC`. The kernel fills in `fd`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromBytes, Immutable, IntoBytes, KnownLayout)]
pub struct dma_heap_allocation_data {
    pub len: u64,
    pub fd: u32,
    pub fd_flags: u32,
    pub heap_flags: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromBytes, Immutable, IntoBytes, KnownLayout)]
pub struct dma_buf_sync {
    pub flags: u64,
}

ioctl_iowr_nr!(
    DMA_HEAP_IOCTL_ALLOC,
    DMA_HEAP_IOC_MAGIC,
    0x0,
    dma_heap_allocation_data
);
ioctl_iow_nr!(DMA_BUF_IOCTL_SYNC, DMA_BUF_BASE, 0, dma_buf_sync);
// The payload is an unsigned long, so the request number differs between 32 and 64-bit kernels.
ioctl_ior_nr!(DMA_BUF_IOCTL_PHYS, DMA_BUF_BASE, 10, c_ulong);

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn struct_layouts() {
        assert_eq!(size_of::<dma_heap_allocation_data>(), 24);
        assert_eq!(size_of::<dma_buf_sync>(), 8);
    }

    #[test]
    fn request_numbers() {
        assert_eq!(0xc0184800u32 as IoctlNr, DMA_HEAP_IOCTL_ALLOC());
        assert_eq!(0x40086200u32 as IoctlNr, DMA_BUF_IOCTL_SYNC());
    }

    #[test]
    fn phys_request_matches_word_size() {
        let size = size_of::<c_ulong>() as u32;
        assert_eq!(
            (0x8000620a | (size << 16)) as IoctlNr,
            DMA_BUF_IOCTL_PHYS()
        );
        #[cfg(target_pointer_width = "64")]
        assert_eq!(0x8008620au32 as IoctlNr, DMA_BUF_IOCTL_PHYS());
        #[cfg(target_pointer_width = "32")]
        assert_eq!(0x8004620au32 as IoctlNr, DMA_BUF_IOCTL_PHYS());
    }

    #[test]
    fn sync_flags() {
        assert_eq!(DMA_BUF_SYNC_RW, 3);
        assert_eq!(DMA_BUF_SYNC_VALID_FLAGS_MASK, 7);
        assert_eq!(DMA_BUF_SYNC_START | DMA_BUF_SYNC_READ, 1);
    }
}
