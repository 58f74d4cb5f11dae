// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Counts process descriptors, so it lives in its own test binary with a single test.

#![cfg(any(target_os = "android", target_os = "linux"))]

use std::sync::Arc;

use dma_heap::test_utils::default_heap_available;
use dma_heap::test_utils::memfd;
use dma_heap::test_utils::open_descriptor_count;
use dma_heap::DmaBuffer;
use dma_heap::DmaHeap;
use dma_heap::DmaHeapConfig;
use dma_heap::SyncUnsupported;

#[test]
fn release_returns_to_baseline() {
    let baseline = open_descriptor_count();

    for _ in 0..4 {
        let mut mapped =
            DmaBuffer::from_descriptor(memfd("leak", 4096), 4096, Arc::new(SyncUnsupported));
        mapped.map().unwrap();
        // Dropped while mapped.
        mapped.release();

        let unmapped =
            DmaBuffer::from_descriptor(memfd("leak", 4096), 4096, Arc::new(SyncUnsupported));
        drop(unmapped);

        DmaBuffer::new().release();
    }
    assert_eq!(open_descriptor_count(), baseline);

    // Failed heap allocations must not leave the heap node open.
    let file = tempfile::NamedTempFile::new().unwrap();
    let with_temp_file = open_descriptor_count();
    for _ in 0..4 {
        let heap = DmaHeap::new(DmaHeapConfig::with_path(file.path())).unwrap();
        assert!(heap.allocate(4096).is_err());
    }
    assert_eq!(open_descriptor_count(), with_temp_file);

    if default_heap_available() {
        if let Ok(heap) = DmaHeap::open() {
            let with_heap = open_descriptor_count();
            for _ in 0..4 {
                let mut buffer = heap.allocate(4096).unwrap();
                buffer.map().unwrap();
                buffer.release();
            }
            assert_eq!(open_descriptor_count(), with_heap);
        }
    }
}
