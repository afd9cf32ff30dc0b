//! Stream buffer pool
//!
//! Outbound packets are built in a small rotation of reusable streams so
//! that independent producers (the main protocol path and the smartcard
//! channel) never write into the same buffer. Inbound data is accumulated in
//! one dedicated stream.

use super::stream::StreamBuffer;
use super::{Error, Result};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;
use tracing::debug;

/// Exclusive handle to a pooled stream
///
/// The slot is returned to the pool when the guard is dropped.
pub type StreamGuard = ArcMutexGuard<RawMutex, StreamBuffer>;

/// Fixed-size rotation of outbound streams plus the inbound stream
pub struct StreamPool {
    outbound: Vec<Arc<Mutex<StreamBuffer>>>,
    next: Mutex<usize>,
    inbound: Arc<Mutex<StreamBuffer>>,
}

impl StreamPool {
    /// Allocate `slots` outbound streams and the inbound stream
    pub fn new(slots: usize, initial_capacity: usize) -> Self {
        let outbound = (0..slots.max(1))
            .map(|_| Arc::new(Mutex::new(StreamBuffer::with_capacity(initial_capacity))))
            .collect();

        StreamPool {
            outbound,
            next: Mutex::new(0),
            inbound: Arc::new(Mutex::new(StreamBuffer::with_capacity(initial_capacity))),
        }
    }

    /// Number of outbound slots
    pub fn slots(&self) -> usize {
        self.outbound.len()
    }

    /// Hand out the next outbound stream, empty and at least `min_capacity` large
    ///
    /// Slots are taken round-robin. A slot whose guard is still alive is in
    /// flight and gets skipped; when every slot is in flight the call fails
    /// instead of clobbering a pending packet.
    pub fn acquire_outbound(&self, min_capacity: usize) -> Result<StreamGuard> {
        let mut next = self.next.lock();
        let slots = self.outbound.len();

        for offset in 0..slots {
            let index = (*next + offset) % slots;
            if let Some(mut stream) = self.outbound[index].try_lock_arc() {
                stream.grow(min_capacity);
                stream.reset();
                *next = (index + 1) % slots;
                return Ok(stream);
            }
        }

        Err(Error::PoolExhausted(slots))
    }

    /// Borrow the inbound stream, grown to at least `min_total_length`
    ///
    /// Buffered bytes and cursor offsets are preserved.
    pub fn acquire_inbound(&self, min_total_length: usize) -> Result<StreamGuard> {
        let mut stream = self.inbound.try_lock_arc().ok_or(Error::BufferBusy)?;
        stream.grow(min_total_length);
        Ok(stream)
    }

    /// Borrow the inbound stream emptied and sized for `length` new bytes
    pub(crate) fn fresh_inbound(&self, length: usize) -> Result<StreamGuard> {
        let mut stream = self.acquire_inbound(length)?;
        stream.reset();
        Ok(stream)
    }

    /// Empty every stream, keeping the allocations
    ///
    /// Streams currently borrowed are left alone.
    pub fn reset_all(&self) {
        self.for_each_idle(StreamBuffer::reset);
    }

    /// Free every idle stream's allocation
    pub(crate) fn release(&self) {
        self.for_each_idle(StreamBuffer::release);
    }

    fn for_each_idle(&self, f: fn(&mut StreamBuffer)) {
        for (index, slot) in self.outbound.iter().enumerate() {
            match slot.try_lock() {
                Some(mut stream) => f(&mut stream),
                None => debug!(slot = index, "outbound stream in flight, skipped"),
            }
        }
        match self.inbound.try_lock() {
            Some(mut stream) => f(&mut stream),
            None => debug!("inbound stream borrowed, skipped"),
        }
    }
}
