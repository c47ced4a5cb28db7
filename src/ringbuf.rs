// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Byte-buffer ring and audio-area view.
//!
//! A fixed-capacity single-producer/single-consumer ring of bytes, plus a
//! thin view that describes how to interpret a contiguous byte range as
//! audio frames. Every device backend and the flexible loopback engine
//! (see [`crate::floop`]) is built on top of this.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::format::AudioFormat;

/// A fixed-capacity ring of bytes with an explicit `used` counter, so
/// "empty" and "full" are unambiguous without reserving a slot the way a
/// two-pointer-only ring buffer must.
///
/// Capacity is rounded up to a power of two when the caller doesn't already
/// supply one; this is purely a performance hint (it lets index wraparound
/// use a mask instead of a modulo) and never changes the buffer's observable
/// behavior.
pub struct ByteBuffer {
    data: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    read_idx: AtomicUsize,
    write_idx: AtomicUsize,
    used: AtomicUsize,
}

// SAFETY: by construction exactly one producer calls the `write_*` methods
// and exactly one consumer calls the `read_*` methods; the split is
// enforced by convention rather than by the type system, since both sides
// commonly live inside the same device struct rather than behind separate
// handles.
unsafe impl Send for ByteBuffer {}
unsafe impl Sync for ByteBuffer {}

impl ByteBuffer {
    /// Create a new ring with at least `capacity` bytes of storage.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut data = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            data.push(UnsafeCell::new(0));
        }
        Self {
            data: data.into_boxed_slice(),
            capacity,
            read_idx: AtomicUsize::new(0),
            write_idx: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes currently stored (queued for the reader).
    pub fn queued(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes the writer may still deposit before the ring is full.
    pub fn writable(&self) -> usize {
        self.capacity - self.queued()
    }

    /// Contiguous bytes readable starting at the current read index, bounded
    /// by both `used` and the wrap point. A second `readable()` call after
    /// consuming this window exposes the remainder on the other side of the
    /// wrap, if any.
    pub fn readable(&self) -> usize {
        let read = self.read_idx.load(Ordering::Relaxed);
        self.queued().min(self.capacity - read)
    }

    /// Contiguous bytes writable starting at the current write index,
    /// bounded by both free space and the wrap point.
    pub fn writable_contiguous(&self) -> usize {
        let write = self.write_idx.load(Ordering::Relaxed);
        self.writable().min(self.capacity - write)
    }

    /// Byte slice covering the next contiguous readable window.
    pub fn read_window(&self) -> &[u8] {
        let read = self.read_idx.load(Ordering::Relaxed);
        let len = self.readable();
        // SAFETY: [read, read+len) is owned by the reader until
        // increment_read advances past it; the writer never touches bytes
        // behind its own write_idx.
        unsafe { std::slice::from_raw_parts(self.data[read].get(), len) }
    }

    /// Mutable byte slice covering the next contiguous writable window.
    pub fn write_window(&self) -> &mut [u8] {
        let write = self.write_idx.load(Ordering::Relaxed);
        let len = self.writable_contiguous();
        // SAFETY: the writer is the sole owner of [write, write+len) until
        // increment_write advances past it.
        unsafe { std::slice::from_raw_parts_mut(self.data[write].get(), len) }
    }

    /// Advance the read index by `n` bytes (must be `<= readable()`).
    pub fn increment_read(&self, n: usize) {
        debug_assert!(n <= self.readable());
        let read = self.read_idx.load(Ordering::Relaxed);
        let next = wrap_add(read, n, self.capacity);
        self.read_idx.store(next, Ordering::Relaxed);
        self.used.fetch_sub(n, Ordering::Release);
    }

    /// Advance the write index by `n` bytes (must be `<= writable_contiguous()`).
    pub fn increment_write(&self, n: usize) {
        debug_assert!(n <= self.writable_contiguous());
        let write = self.write_idx.load(Ordering::Relaxed);
        let next = wrap_add(write, n, self.capacity);
        self.write_idx.store(next, Ordering::Relaxed);
        self.used.fetch_add(n, Ordering::Release);
    }

    /// Drop all queued bytes and rewind both indices to zero.
    ///
    /// Used by the flexible loopback's `input_close_dev`, which must
    /// also clear `input_active` in the same call — that part lives on the
    /// owning device, not here.
    pub fn reset(&self) {
        self.read_idx.store(0, Ordering::Relaxed);
        self.write_idx.store(0, Ordering::Relaxed);
        self.used.store(0, Ordering::Release);
    }
}

fn wrap_add(idx: usize, n: usize, capacity: usize) -> usize {
    let sum = idx + n;
    if sum >= capacity {
        sum - capacity
    } else {
        sum
    }
}

/// A view over a contiguous byte window describing how to interpret it as
/// interleaved audio frames.
///
/// Only interleaved layout is modeled: every concrete device here (silent,
/// flexible-loopback) and the SHM stream buffer use interleaved samples;
/// planar layout only matters for hardware backends out of scope here.
/// `channel_offset_bytes` and `channel_stride_bytes` are kept as separate
/// accessors anyway, so a planar backend could be added later without
/// reshaping this type.
pub struct AudioArea<'a> {
    data: &'a mut [u8],
    pub format: AudioFormat,
    pub frames: usize,
}

impl<'a> AudioArea<'a> {
    pub fn new(data: &'a mut [u8], format: AudioFormat, frames: usize) -> Self {
        Self { data, format, frames }
    }

    /// Bytes between the start of one frame and the start of the next.
    pub fn channel_stride_bytes(&self) -> usize {
        self.format.frame_bytes()
    }

    /// Byte offset of `channel`'s first sample within a frame.
    pub fn channel_offset_bytes(&self, channel: u8) -> usize {
        channel as usize * self.format.sample_format.bytes_per_sample()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn empty_then_full_round_trip() {
        let buf = ByteBuffer::new(16);
        assert_eq!(buf.queued(), 0);
        assert_eq!(buf.writable(), 16);

        buf.write_window()[..8].fill(0xab);
        buf.increment_write(8);
        assert_eq!(buf.queued(), 8);
        assert_eq!(buf.writable(), 8);

        assert_eq!(buf.readable(), 8);
        assert!(buf.read_window().iter().all(|&b| b == 0xab));
        buf.increment_read(8);
        assert_eq!(buf.queued(), 0);
    }

    #[test]
    fn wraps_around_capacity() {
        let buf = ByteBuffer::new(8);
        buf.increment_write(buf.writable_contiguous().min(6));
        buf.increment_read(6);
        // write index is now at 6; only 2 bytes remain before wrap
        assert_eq!(buf.writable_contiguous(), 2);
        buf.increment_write(2);
        // write index wrapped to 0; remaining free space is contiguous from 0
        assert_eq!(buf.writable_contiguous(), 6);
    }

    #[test]
    fn full_vs_empty_is_unambiguous() {
        let buf = ByteBuffer::new(4);
        buf.increment_write(4);
        assert_eq!(buf.queued(), 4);
        assert_eq!(buf.writable(), 0);
        buf.increment_read(4);
        assert_eq!(buf.queued(), 0);
        assert_eq!(buf.writable(), 4);
    }

    #[test]
    fn audio_area_reports_interleaved_strides() {
        let format = AudioFormat::new(SampleFormat::S16Le, 48_000, 2);
        let mut bytes = vec![0u8; 64];
        let area = AudioArea::new(&mut bytes, format, 16);
        assert_eq!(area.channel_stride_bytes(), 4);
        assert_eq!(area.channel_offset_bytes(0), 0);
        assert_eq!(area.channel_offset_bytes(1), 2);
    }
}
