// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared-memory stream buffer: the double-buffered layout
//! each client stream uses to hand frames to (or receive frames from) the
//! audio thread.
//!
//! In production this is backed by a literal SHM segment shared with a
//! separate client process; the struct here models the header-plus-two-regions
//! layout and the atomic swap discipline so the rest of the engine
//! (converter, dev-stream binding, scheduler) can be written against it
//! unchanged regardless of whether the bytes ultimately live in `mmap`'d
//! memory or (as in this crate's test doubles) a plain heap allocation.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Two equal-size regions plus the bookkeeping header that tracks which one
/// is currently open for writing.
///
/// The protocol is strictly alternating: at most one region is "write-open"
/// (indexed by `write_buf_idx`) and the other is implicitly "read-open" at
/// any instant. A producer fills the write-open region, then calls
/// [`StreamShm::swap`] to hand it to the consumer and begin filling the
/// other region; this is the single-writer/single-reader lock-free swap
/// called out in the design notes.
pub struct StreamShm {
    regions: [Box<[UnsafeCell<u8>]>; 2],
    used_size: u32,
    frame_bytes: u32,
    /// Index (0 or 1) of the region currently open for writing. Starts at 1
    /// so a freshly constructed buffer has region 0 immediately available
    /// to the consumer, matching how a stream that is pre-filled once and
    /// never swapped is expected to report its outstanding data in region 0.
    write_buf_idx: AtomicU8,
    write_offset: [AtomicU32; 2],
    read_offset: [AtomicU32; 2],
    volume_scaler_bits: AtomicU32,
    mute: AtomicBool,
}

// SAFETY: exactly one producer thread calls the write_* methods and exactly
// one consumer thread calls the read_* / consumer_buffer methods, matching
// the single-writer/single-reader contract documented above.
unsafe impl Send for StreamShm {}
unsafe impl Sync for StreamShm {}

impl StreamShm {
    /// `used_size` is the size of *one* region in bytes; the full allocation
    /// is `2 * used_size`. `frame_bytes` is the stream's negotiated frame
    /// size (sample size × channel count).
    pub fn new(used_size: u32, frame_bytes: u32) -> Self {
        let make_region = || {
            let mut v = Vec::with_capacity(used_size as usize);
            for _ in 0..used_size {
                v.push(UnsafeCell::new(0u8));
            }
            v.into_boxed_slice()
        };
        Self {
            regions: [make_region(), make_region()],
            used_size,
            frame_bytes,
            write_buf_idx: AtomicU8::new(1),
            write_offset: [AtomicU32::new(0), AtomicU32::new(0)],
            read_offset: [AtomicU32::new(0), AtomicU32::new(0)],
            volume_scaler_bits: AtomicU32::new(1.0f32.to_bits()),
            mute: AtomicBool::new(false),
        }
    }

    pub fn used_size(&self) -> u32 {
        self.used_size
    }

    pub fn frame_bytes(&self) -> u32 {
        self.frame_bytes
    }

    /// Index of the region currently open for writing.
    pub fn write_buf_idx(&self) -> usize {
        self.write_buf_idx.load(Ordering::Acquire) as usize
    }

    /// Index of the region currently open for reading (the alternate of
    /// [`StreamShm::write_buf_idx`]).
    pub fn read_buf_idx(&self) -> usize {
        1 - self.write_buf_idx()
    }

    pub fn write_offset(&self, idx: usize) -> u32 {
        self.write_offset[idx].load(Ordering::Acquire)
    }

    pub fn read_offset(&self, idx: usize) -> u32 {
        self.read_offset[idx].load(Ordering::Acquire)
    }

    pub fn set_write_offset(&self, idx: usize, bytes: u32) {
        self.write_offset[idx].store(bytes, Ordering::Release);
    }

    pub fn set_read_offset(&self, idx: usize, bytes: u32) {
        self.read_offset[idx].store(bytes, Ordering::Release);
    }

    /// The region currently open for writing.
    pub fn producer_buffer(&self) -> &mut [u8] {
        let idx = self.write_buf_idx();
        // SAFETY: the sole producer owns the write-open region until the
        // next `swap()`.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.regions[idx][0].get(),
                self.regions[idx].len(),
            )
        }
    }

    /// The region currently open for reading (the alternate of the
    /// producer's region).
    pub fn consumer_buffer(&self) -> &[u8] {
        let idx = self.read_buf_idx();
        // SAFETY: the sole consumer reads the read-open region; the
        // producer never touches it until a subsequent `swap()` makes it
        // write-open again.
        unsafe { std::slice::from_raw_parts(self.regions[idx][0].get(), self.regions[idx].len()) }
    }

    /// Flip which region is write-open, handing the previously write-open
    /// region to the consumer. The newly write-open region's write offset
    /// is reset to zero (a fresh fill); its read offset is left for the
    /// consumer to manage.
    pub fn swap(&self) {
        let prev = self.write_buf_idx.load(Ordering::Relaxed);
        let next = 1 - prev;
        self.write_offset[next as usize].store(0, Ordering::Relaxed);
        self.write_buf_idx.store(next, Ordering::Release);
    }

    pub fn volume_scaler(&self) -> f32 {
        f32::from_bits(self.volume_scaler_bits.load(Ordering::Acquire))
    }

    pub fn set_volume_scaler(&self, scaler: f32) {
        self.volume_scaler_bits.store(scaler.to_bits(), Ordering::Release);
    }

    pub fn mute(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
    }

    /// Callback threshold contract check: `cb_threshold`
    /// must not exceed half the region size.
    pub fn accepts_cb_threshold_frames(&self, cb_threshold_frames: u32) -> bool {
        let cb_threshold_bytes = cb_threshold_frames.saturating_mul(self.frame_bytes);
        cb_threshold_bytes <= self.used_size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cb_threshold_boundary() {
        let shm = StreamShm::new(4096, 4);
        // used_size/2 == 2048 bytes == 512 frames at 4 bytes/frame.
        assert!(shm.accepts_cb_threshold_frames(512));
        assert!(!shm.accepts_cb_threshold_frames(513));
    }

    #[test]
    fn swap_alternates_regions() {
        let shm = StreamShm::new(64, 4);
        assert_eq!(shm.write_buf_idx(), 1);
        assert_eq!(shm.read_buf_idx(), 0);
        shm.swap();
        assert_eq!(shm.write_buf_idx(), 0);
        assert_eq!(shm.read_buf_idx(), 1);
        shm.swap();
        assert_eq!(shm.write_buf_idx(), 1);
    }

    #[test]
    fn volume_and_mute_round_trip() {
        let shm = StreamShm::new(64, 4);
        assert_eq!(shm.volume_scaler(), 1.0);
        shm.set_volume_scaler(0.5);
        assert_eq!(shm.volume_scaler(), 0.5);
        assert!(!shm.mute());
        shm.set_mute(true);
        assert!(shm.mute());
    }
}
