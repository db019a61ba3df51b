//! Static CPU topology model: sockets → physical cores → hardware threads.
//!
//! Thread ids are dense (`0..d`). Sibling hyperthreads are adjacent ids
//! (`2k`, `2k + 1`) and each socket owns a contiguous range of
//! `d / n` threads, so both mappings are pure arithmetic:
//!
//! ```text
//! socket(t) = t / (d / n)
//! core(t)   = t / 2
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};

/// Hardware threads per physical core.
pub const THREADS_PER_CORE: usize = 2;

/// A node's CPU hierarchy, built from a thread count and a socket count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    total_threads: usize,
    sockets: usize,
}

impl CpuTopology {
    /// Build a topology of `total_threads` threads spread over `sockets`
    /// packages.
    ///
    /// Fails with [`AllocError::InvalidTopology`] unless both counts are
    /// positive and every socket receives a whole number of cores.
    pub fn build(total_threads: usize, sockets: usize) -> AllocResult<Self> {
        if total_threads == 0
            || sockets == 0
            || total_threads % (THREADS_PER_CORE * sockets) != 0
        {
            return Err(AllocError::InvalidTopology {
                threads: total_threads,
                sockets,
            });
        }
        Ok(Self {
            total_threads,
            sockets,
        })
    }

    pub fn total_threads(&self) -> usize {
        self.total_threads
    }

    pub fn sockets(&self) -> usize {
        self.sockets
    }

    /// Number of physical cores on the node.
    pub fn cores(&self) -> usize {
        self.total_threads / THREADS_PER_CORE
    }

    pub fn threads_per_socket(&self) -> usize {
        self.total_threads / self.sockets
    }

    pub fn cores_per_socket(&self) -> usize {
        self.cores() / self.sockets
    }

    pub fn socket_of(&self, thread: usize) -> usize {
        thread / self.threads_per_socket()
    }

    pub fn core_of(&self, thread: usize) -> usize {
        thread / THREADS_PER_CORE
    }

    /// The other hyperthread of `thread`'s core.
    pub fn sibling_of(&self, thread: usize) -> usize {
        thread ^ 1
    }

    /// Both hyperthreads of `core`, lowest id first.
    pub fn siblings(&self, core: usize) -> (usize, usize) {
        let first = core * THREADS_PER_CORE;
        (first, first + 1)
    }

    /// Thread ids belonging to `socket`.
    pub fn socket_threads(&self, socket: usize) -> Range<usize> {
        let per = self.threads_per_socket();
        socket * per..(socket + 1) * per
    }

    /// Core ids belonging to `socket`.
    pub fn socket_cores(&self, socket: usize) -> Range<usize> {
        let per = self.cores_per_socket();
        socket * per..(socket + 1) * per
    }
}
