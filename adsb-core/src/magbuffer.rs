//! Fixed-size pool of magnitude buffers shared between the reader and
//! demodulator threads.
//!
//! The pool is allocated once at construction — no allocation happens on
//! the steady-state read/demod path. A buffer moves through four states in
//! a cycle: free → being filled by the reader → filled, queued for the
//! demodulator → being drained by the demodulator → free again. Ordering is
//! FIFO: buffers are handed to the demodulator in the same order the reader
//! filled them, which keeps `sample_timestamp` monotonic across buffers.

use std::sync::{Condvar, Mutex};

/// One window of converted magnitude samples plus its provenance.
pub struct MagBuffer {
    pub data: Vec<u16>,
    /// Number of *new* samples at the front of `data` (the rest is
    /// overlap/history carried from the previous buffer for messages that
    /// straddle a boundary).
    pub length: usize,
    /// Leading samples carried over from the previous buffer, present so a
    /// message whose preamble starts near the end of one buffer can still
    /// be fully decoded.
    pub trailing_samples: usize,
    /// Sample-clock timestamp of the first *new* sample in this buffer, in
    /// 12 MHz ticks (matching the wire/timestamp convention used elsewhere
    /// in this pipeline).
    pub sample_timestamp: u64,
    /// Wall-clock time this buffer was filled, seconds since UNIX epoch.
    pub sys_timestamp: f64,
    /// Samples dropped before this buffer because the ring was full.
    pub dropped: u32,
    /// Total signal power measured while converting this buffer, if power
    /// measurement was enabled on the converter.
    pub total_power: f64,
}

impl MagBuffer {
    fn new(capacity: usize) -> Self {
        MagBuffer {
            data: vec![0u16; capacity],
            length: 0,
            trailing_samples: 0,
            sample_timestamp: 0,
            sys_timestamp: 0.0,
            dropped: 0,
            total_power: 0.0,
        }
    }
}

struct RingState {
    buffers: Vec<MagBuffer>,
    /// Index of the next buffer the reader may fill.
    first_free: usize,
    /// Index of the next buffer the demodulator may drain.
    first_filled: usize,
    /// Number of buffers currently filled and awaiting the demodulator.
    filled_count: usize,
    exiting: bool,
}

/// Mutex+condvar ring of `MagBuffer`s. Both `acquire_free`/`publish_filled`
/// (reader side) and `acquire_filled`/`release` (demodulator side) block
/// when the ring has no buffer available in the requested state.
pub struct MagRing {
    state: Mutex<RingState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl MagRing {
    /// Allocate `depth` buffers of `samples_per_buffer` u16 slots each.
    pub fn new(depth: usize, samples_per_buffer: usize) -> MagRing {
        let buffers = (0..depth).map(|_| MagBuffer::new(samples_per_buffer)).collect();
        MagRing {
            state: Mutex::new(RingState {
                buffers,
                first_free: 0,
                first_filled: 0,
                filled_count: 0,
                exiting: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: depth,
        }
    }

    /// Signal both waiting sides to wake up and observe `exiting`.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().unwrap();
        state.exiting = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Block until a free buffer is available, then run `fill` on it and
    /// publish it to the demodulator side. Returns `false` if the ring is
    /// shutting down and no fill happened.
    pub fn fill_next<F: FnOnce(&mut MagBuffer)>(&self, fill: F) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.filled_count == self.capacity && !state.exiting {
            state = self.not_full.wait(state).unwrap();
        }
        if state.exiting {
            return false;
        }
        let idx = state.first_free;
        state.first_free = (idx + 1) % self.capacity;
        {
            let buf = &mut state.buffers[idx];
            fill(buf);
        }
        state.filled_count += 1;
        self.not_empty.notify_one();
        true
    }

    /// Block until a filled buffer is available, run `consume` on it, then
    /// return it to the free pool. Returns `false` if the ring is shutting
    /// down and empty.
    pub fn drain_next<F: FnOnce(&mut MagBuffer)>(&self, consume: F) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.filled_count == 0 && !state.exiting {
            state = self.not_empty.wait(state).unwrap();
        }
        if state.filled_count == 0 && state.exiting {
            return false;
        }
        let idx = state.first_filled;
        state.first_filled = (idx + 1) % self.capacity;
        {
            let buf = &mut state.buffers[idx];
            consume(buf);
        }
        state.filled_count -= 1;
        self.not_full.notify_one();
        true
    }
}
