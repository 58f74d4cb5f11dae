// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::mem;
use std::ops::Drop;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::FromRawFd;
use std::os::unix::io::IntoRawFd;
use std::os::unix::io::RawFd;

use log::error;

use crate::errno::errno_result;
use crate::errno::Error;
use crate::errno::Result;

pub type RawDescriptor = RawFd;

pub const INVALID_DESCRIPTOR: RawDescriptor = -1;

/// Wraps a RawDescriptor and safely closes it when self falls out of scope.
#[derive(Debug, Eq, PartialEq)]
pub struct SafeDescriptor {
    descriptor: RawDescriptor,
}

/// Trait for forfeiting ownership of the current raw descriptor, and returning the raw descriptor
pub trait IntoRawDescriptor {
    fn into_raw_descriptor(self) -> RawDescriptor;
}

/// Trait for returning the underlying raw descriptor, without giving up ownership of the
/// descriptor.
pub trait AsRawDescriptor {
    fn as_raw_descriptor(&self) -> RawDescriptor;
}

pub trait FromRawDescriptor {
    /// # Safety
    /// Safe only if the caller ensures nothing has access to the descriptor after passing it to
    /// `from_raw_descriptor`
    unsafe fn from_raw_descriptor(descriptor: RawDescriptor) -> Self;
}

impl AsRawDescriptor for SafeDescriptor {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.descriptor
    }
}

impl IntoRawDescriptor for SafeDescriptor {
    fn into_raw_descriptor(self) -> RawDescriptor {
        let descriptor = self.descriptor;
        mem::forget(self);
        descriptor
    }
}

impl FromRawDescriptor for SafeDescriptor {
    unsafe fn from_raw_descriptor(descriptor: RawDescriptor) -> Self {
        SafeDescriptor { descriptor }
    }
}

impl SafeDescriptor {
    /// Clones this descriptor, internally creating a new descriptor. The new SafeDescriptor will
    /// share the same underlying count within the kernel.
    pub fn try_clone(&self) -> Result<SafeDescriptor> {
        // SAFETY:
        // Safe because this doesn't modify any memory and we check the return value.
        let descriptor = unsafe { libc::fcntl(self.descriptor, libc::F_DUPFD_CLOEXEC, 0) };
        if descriptor < 0 {
            errno_result()
        } else {
            Ok(SafeDescriptor { descriptor })
        }
    }
}

impl Drop for SafeDescriptor {
    fn drop(&mut self) {
        // SAFETY:
        // Safe because we own the descriptor and nothing else can close it.
        let ret = unsafe { libc::close(self.descriptor) };
        if ret < 0 {
            // EINTR still releases the descriptor on Linux, so there is nothing to retry.
            let e = Error::last();
            if e.errno() != libc::EINTR {
                error!("failed to close descriptor {}: {}", self.descriptor, e);
            }
        }
    }
}

impl AsRawFd for SafeDescriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.as_raw_descriptor()
    }
}

impl From<File> for SafeDescriptor {
    fn from(f: File) -> SafeDescriptor {
        // SAFETY:
        // Safe because we own the File at this point.
        unsafe { SafeDescriptor::from_raw_descriptor(f.into_raw_descriptor()) }
    }
}

impl From<SafeDescriptor> for File {
    fn from(s: SafeDescriptor) -> File {
        // SAFETY:
        // Safe because we own the SafeDescriptor at this point.
        unsafe { File::from_raw_fd(s.into_raw_descriptor()) }
    }
}

// Implementations for File. This enables the File-type to use RawDescriptor, but does not mean
// File should be used as a generic descriptor container. That should go to SafeDescriptor.
impl AsRawDescriptor for File {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.as_raw_fd()
    }
}

impl FromRawDescriptor for File {
    unsafe fn from_raw_descriptor(descriptor: RawDescriptor) -> Self {
        File::from_raw_fd(descriptor)
    }
}

impl IntoRawDescriptor for File {
    fn into_raw_descriptor(self) -> RawDescriptor {
        self.into_raw_fd()
    }
}

/// Returns true if `descriptor` refers to an open file in this process.
pub fn descriptor_is_open(descriptor: RawDescriptor) -> bool {
    // SAFETY:
    // Safe because F_GETFD only reads the descriptor flags.
    unsafe { libc::fcntl(descriptor, libc::F_GETFD) >= 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_null() -> File {
        File::open("/dev/null").unwrap()
    }

    #[test]
    fn drop_closes() {
        let descriptor = SafeDescriptor::from(open_null());
        let raw = descriptor.as_raw_descriptor();
        assert!(descriptor_is_open(raw));
        drop(descriptor);
        assert!(!descriptor_is_open(raw));
    }

    #[test]
    fn into_raw_forfeits_ownership() {
        let descriptor = SafeDescriptor::from(open_null());
        let raw = descriptor.into_raw_descriptor();
        assert!(descriptor_is_open(raw));
        // SAFETY: `raw` was released by the SafeDescriptor above and is owned here.
        drop(unsafe { SafeDescriptor::from_raw_descriptor(raw) });
    }

    #[test]
    fn clone_is_independent() {
        let descriptor = SafeDescriptor::from(open_null());
        let clone = descriptor.try_clone().unwrap();
        assert_ne!(descriptor.as_raw_descriptor(), clone.as_raw_descriptor());
        let raw = clone.as_raw_descriptor();
        drop(descriptor);
        assert!(descriptor_is_open(raw));
    }

    #[test]
    fn invalid_descriptor_is_not_open() {
        assert!(!descriptor_is_open(INVALID_DESCRIPTOR));
    }
}
