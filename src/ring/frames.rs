//! Lock-free SPSC ring buffer for audio frames
//!
//! Carries whole [`AudioFrame`]s from the producer task to the audio
//! callback. Unlike the byte ring, partial writes are legal and expected:
//! the unit is already a frame, so the producer simply retries with the
//! remainder under back-pressure.
//!
//! Every written slot deep-copies the frame payload into ring-owned
//! storage. Without that copy, a producer reusing its decode buffer
//! between iterations would corrupt frames already enqueued — an audible
//! defect, not a theoretical one. The cost is one allocation per frame on
//! the producer side, acceptable at audio frame rates.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::frame::AudioFrame;

use super::RingStats;

/// Lock-free single-producer single-consumer ring of audio frames.
///
/// Capacity is rounded up to the next power of two at construction; slots
/// are allocated once. All operations are `&self`; the SPSC discipline is a
/// usage contract:
///
/// - `write` must only be called by the producer role
/// - `read` and `pop` must only be called by the consumer role
/// - roles never swap within a session
/// - `reset` requires that neither role is active
pub struct FrameRing {
    slots: Box<[UnsafeCell<Option<AudioFrame>>]>,
    mask: u64,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

// SAFETY: slot ownership follows the positions. The producer role alone
// writes slots in [write_pos, read_pos + capacity) and then releases
// write_pos; the consumer role alone takes slots in [read_pos, write_pos)
// observed through an acquire load of write_pos. No slot is reachable from
// both roles at once while the single-producer/single-consumer contract
// holds. AudioFrame is an owned value (Send).
unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl FrameRing {
    /// Create a ring holding at least `capacity` frames.
    ///
    /// Capacity is rounded up to the next power of two; zero becomes one.
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity.next_power_of_two();

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: capacity - 1,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
        }
    }

    /// Write as many whole frames from `frames` as fit.
    ///
    /// Returns the number of frames written, which may be less than
    /// requested; the caller retries with the remainder. Returns
    /// [`Error::InsufficientSpace`] when the ring is full and nothing was
    /// written.
    ///
    /// Each written slot receives a deep copy of the frame, payload
    /// included, so the caller may reuse its buffers immediately after this
    /// returns. Producer role only.
    pub fn write(&self, frames: &[AudioFrame]) -> Result<usize> {
        if frames.is_empty() {
            return Ok(0);
        }

        let to_write = (frames.len() as u64).min(self.available_write());
        if to_write == 0 {
            return Err(Error::InsufficientSpace);
        }

        let write_pos = self.write_pos.load(Ordering::Relaxed);

        for (i, frame) in frames[..to_write as usize].iter().enumerate() {
            let slot = ((write_pos + i as u64) & self.mask) as usize;
            // SAFETY: the slot lies in the free region, untouched by the
            // consumer until write_pos is released below.
            unsafe {
                *self.slots[slot].get() = Some(frame.clone());
            }
        }

        // Release only after every payload copy has completed.
        self.write_pos.store(write_pos + to_write, Ordering::Release);

        Ok(to_write as usize)
    }

    /// Read up to `n` frames, transferring payload ownership to the caller.
    ///
    /// Requesting zero frames returns an empty vector; an empty ring
    /// returns [`Error::InsufficientData`]. Consumer role only.
    pub fn read(&self, n: usize) -> Result<Vec<AudioFrame>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let available = self.available_read();
        if available == 0 {
            return Err(Error::InsufficientData);
        }

        let to_read = (n as u64).min(available);
        let read_pos = self.read_pos.load(Ordering::Relaxed);

        let mut out = Vec::with_capacity(to_read as usize);
        for i in 0..to_read {
            let slot = ((read_pos + i) & self.mask) as usize;
            // SAFETY: the slot lies in the readable region published by the
            // producer's release on write_pos.
            if let Some(frame) = unsafe { (*self.slots[slot].get()).take() } {
                out.push(frame);
            } else {
                debug_assert!(false, "readable slot was empty");
            }
        }

        self.read_pos.store(read_pos + to_read, Ordering::Release);

        Ok(out)
    }

    /// Take a single frame without allocating.
    ///
    /// Equivalent to `read(1)` but returns the frame by move, so it is safe
    /// on a real-time path. Returns `None` when the ring is empty. Consumer
    /// role only.
    pub fn pop(&self) -> Option<AudioFrame> {
        if self.available_read() == 0 {
            return None;
        }

        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let slot = (read_pos & self.mask) as usize;

        // SAFETY: as for read(); only the first readable slot is touched.
        let frame = unsafe { (*self.slots[slot].get()).take() };
        debug_assert!(frame.is_some(), "readable slot was empty");

        self.read_pos.store(read_pos + 1, Ordering::Release);

        frame
    }

    /// Frames currently free for writing.
    pub fn available_write(&self) -> u64 {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        self.size() - (write_pos - read_pos)
    }

    /// Frames currently readable.
    pub fn available_read(&self) -> u64 {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        write_pos - read_pos
    }

    /// Total capacity in frames (a power of two).
    pub fn size(&self) -> u64 {
        self.mask + 1
    }

    /// Occupancy snapshot for monitoring.
    pub fn stats(&self) -> RingStats {
        RingStats {
            capacity: self.size(),
            occupied: self.available_read(),
        }
    }

    /// Reset both positions to zero.
    ///
    /// Stale frames left in slots are dropped lazily as slots are
    /// overwritten. Only valid while no producer or consumer is active; the
    /// caller guarantees quiescence.
    pub fn reset(&self) {
        self.read_pos.store(0, Ordering::Release);
        self.write_pos.store(0, Ordering::Release);
    }
}
