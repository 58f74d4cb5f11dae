// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Macros for declaring Linux ioctl request numbers.

use std::os::raw::c_uint;

/// Raw macro to declare the expression that calculates an ioctl number
#[macro_export]
macro_rules! ioctl_expr {
    ($dir:expr, $ty:expr, $nr:expr, $size:expr) => {
        ((($dir as $crate::IoctlNr) << $crate::ioctl::_IOC_DIRSHIFT)
            | (($ty as $crate::IoctlNr) << $crate::ioctl::_IOC_TYPESHIFT)
            | (($nr as $crate::IoctlNr) << $crate::ioctl::_IOC_NRSHIFT)
            | (($size as $crate::IoctlNr) << $crate::ioctl::_IOC_SIZESHIFT))
    };
}

/// Raw macro to declare a function that returns an ioctl number.
#[macro_export]
macro_rules! ioctl_ioc_nr {
    ($name:ident, $dir:expr, $ty:expr, $nr:expr, $size:expr) => {
        #[allow(non_snake_case)]
        /// Generates ioctl request number.
        pub const fn $name() -> $crate::IoctlNr {
            $crate::ioctl_expr!($dir, $ty, $nr, $size)
        }
    };
}

/// Declare an ioctl that reads data.
#[macro_export]
macro_rules! ioctl_ior_nr {
    ($name:ident, $ty:expr, $nr:expr, $size:ty) => {
        $crate::ioctl_ioc_nr!(
            $name,
            $crate::ioctl::_IOC_READ,
            $ty,
            $nr,
            ::std::mem::size_of::<$size>() as u32
        );
    };
}

/// Declare an ioctl that writes data.
#[macro_export]
macro_rules! ioctl_iow_nr {
    ($name:ident, $ty:expr, $nr:expr, $size:ty) => {
        $crate::ioctl_ioc_nr!(
            $name,
            $crate::ioctl::_IOC_WRITE,
            $ty,
            $nr,
            ::std::mem::size_of::<$size>() as u32
        );
    };
}

/// Declare an ioctl that reads and writes data.
#[macro_export]
macro_rules! ioctl_iowr_nr {
    ($name:ident, $ty:expr, $nr:expr, $size:ty) => {
        $crate::ioctl_ioc_nr!(
            $name,
            $crate::ioctl::_IOC_READ | $crate::ioctl::_IOC_WRITE,
            $ty,
            $nr,
            ::std::mem::size_of::<$size>() as u32
        );
    };
}

pub const _IOC_NRSHIFT: c_uint = 0;
pub const _IOC_TYPESHIFT: c_uint = 8;
pub const _IOC_SIZESHIFT: c_uint = 16;
pub const _IOC_DIRSHIFT: c_uint = 30;
pub const _IOC_WRITE: c_uint = 1;
pub const _IOC_READ: c_uint = 2;

#[cfg(test)]
mod tests {
    use std::os::raw::c_int;

    use crate::IoctlNr;
    use crate::DMA_BUF_BASE;

    #[repr(C)]
    struct dma_buf_export_sync_file {
        flags: u32,
        fd: c_int,
    }

    ioctl_ior_nr!(DMA_BUF_TEST_READ, DMA_BUF_BASE, 10, u32);
    ioctl_iow_nr!(DMA_BUF_SET_NAME_B, DMA_BUF_BASE, 1, u64);
    ioctl_iowr_nr!(
        DMA_BUF_IOCTL_EXPORT_SYNC_FILE,
        DMA_BUF_BASE,
        2,
        dma_buf_export_sync_file
    );

    #[test]
    fn ioctl_macros() {
        assert_eq!(0x8004620au32 as IoctlNr, DMA_BUF_TEST_READ());
        assert_eq!(0x40086201u32 as IoctlNr, DMA_BUF_SET_NAME_B());
        assert_eq!(0xc0086202u32 as IoctlNr, DMA_BUF_IOCTL_EXPORT_SYNC_FILE());
    }
}
