//! Per-loop read buffer management.
//!
//! Every connection owns one fixed-size buffer for as long as it is
//! registered. Buffers live in a pool so that a closed connection's buffer is
//! handed to the next accepted one instead of being freed and reallocated.

#![allow(dead_code)] // Size/occupancy accessors are used by the loop's tests only

/// Pool of fixed-size read buffers keyed by index.
///
/// Unlike a bounded pool, this one grows on demand: the event loop admits
/// every accepted connection, so running out of buffers is not an option.
/// Freed buffers are reused LIFO for cache locality.
pub struct BufferPool {
    /// Actual buffer storage.
    buffers: Vec<Box<[u8]>>,
    /// Stack of available buffer indices.
    free_list: Vec<usize>,
    /// Size of each buffer.
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool with `count` pre-allocated buffers of `size` bytes.
    pub fn new(count: usize, size: usize) -> Self {
        let mut pool = Self {
            buffers: Vec::with_capacity(count),
            free_list: Vec::with_capacity(count),
            buffer_size: size,
        };
        for _ in 0..count {
            let idx = pool.grow();
            pool.free_list.push(idx);
        }
        pool
    }

    /// Take a buffer from the pool, allocating a new one if none is free.
    pub fn alloc(&mut self) -> usize {
        match self.free_list.pop() {
            Some(idx) => idx,
            None => self.grow(),
        }
    }

    /// Return a buffer to the pool.
    pub fn free(&mut self, idx: usize) {
        debug_assert!(idx < self.buffers.len(), "buffer index out of bounds");
        debug_assert!(!self.free_list.contains(&idx), "buffer freed twice");
        self.free_list.push(idx);
    }

    /// Get an immutable reference to a buffer.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn get(&self, idx: usize) -> &[u8] {
        &self.buffers[idx]
    }

    /// Get a mutable reference to a buffer.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn get_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.buffers[idx]
    }

    /// Get the size of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Total number of buffers ever allocated.
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Number of buffers currently free.
    pub fn available(&self) -> usize {
        self.free_list.len()
    }

    /// Number of buffers currently handed out.
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    fn grow(&mut self) -> usize {
        self.buffers
            .push(vec![0u8; self.buffer_size].into_boxed_slice());
        self.buffers.len() - 1
    }
}
