// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Helpers shared by unit and integration tests.

use std::ffi::CString;
use std::fs;
use std::path::Path;

use libc::c_long;
use libc::SYS_memfd_create;
use libc::MFD_CLOEXEC;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::FromRawDescriptor;
use crate::descriptor::SafeDescriptor;
use crate::DEFAULT_HEAP_PATH;

/// Creates a memfd of `size` bytes. A memfd behaves like a dma-buf for mapping purposes, but
/// rejects the dma-buf ioctls, so it stands in for a buffer on a kernel without sync support.
///
/// Panics on failure; only meant for tests.
pub fn memfd(name: &str, size: u64) -> SafeDescriptor {
    let name = CString::new(name).unwrap();
    // SAFETY:
    // Safe because we give a valid C string and check the result.
    let fd = unsafe { libc::syscall(SYS_memfd_create as c_long, name.as_ptr(), MFD_CLOEXEC) };
    assert!(fd >= 0, "memfd_create failed: {}", crate::errno::Error::last());
    // SAFETY:
    // Safe because we just created the descriptor and own it.
    let descriptor = unsafe { SafeDescriptor::from_raw_descriptor(fd as i32) };
    // SAFETY:
    // Safe because the descriptor is valid and ftruncate doesn't touch our memory.
    let ret = unsafe { libc::ftruncate(descriptor.as_raw_descriptor(), size as libc::off_t) };
    assert_eq!(ret, 0, "ftruncate failed: {}", crate::errno::Error::last());
    descriptor
}

/// Counts the descriptors open in this process.
pub fn open_descriptor_count() -> usize {
    fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or_default()
}

/// Counts the mappings in this process backed by the memfd created as `memfd(name, ..)`.
pub fn memfd_mapping_count(name: &str) -> usize {
    let path = format!("/memfd:{}", name);
    let deleted = format!("{} (deleted)", path);
    fs::read_to_string("/proc/self/maps")
        .map(|maps| {
            maps.lines()
                .filter(|l| l.ends_with(&path) || l.ends_with(&deleted))
                .count()
        })
        .unwrap_or_default()
}

/// Returns true if the default dma-heap node exists. Tests that need a real heap return early
/// when it doesn't, since most CI kernels don't expose one.
pub fn default_heap_available() -> bool {
    Path::new(DEFAULT_HEAP_PATH).exists()
}
