//! Greedy allocator, the no-solver fast path.
//!
//! Largest workload first, each one packed into the socket with the most
//! free threads, taking whole free cores before half-used ones. Feasible
//! whenever the requests fit on the node; not necessarily optimal.

use tracing::debug;

use crate::error::{AllocError, AllocResult, check_capacity, total_requested};
use crate::matrix::AllocationMatrix;
use crate::topology::CpuTopology;

/// Deterministic topology-aware packer. Stateless; every call builds its
/// own topology and free map.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAllocator;

impl GreedyAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        requests: &[usize],
        total_threads: usize,
        sockets: usize,
    ) -> AllocResult<AllocationMatrix> {
        let topo = CpuTopology::build(total_threads, sockets)?;
        check_capacity(requests, total_threads)?;

        let mut free = FreeMap::new(topo);
        let mut sets: Vec<Vec<usize>> = vec![Vec::new(); requests.len()];

        for j in packing_order(requests) {
            let mut remaining = requests[j];
            while remaining > 0 {
                let Some(socket) = free.fullest_socket() else {
                    return Err(AllocError::CapacityExceeded {
                        requested: total_requested(requests),
                        available: total_threads,
                    });
                };
                let taken = free.take_from_socket(socket, remaining);
                remaining -= taken.len();
                sets[j].extend(taken);
            }
            debug!(
                workload = j,
                request = requests[j],
                threads = ?sets[j],
                "greedy placed workload"
            );
        }

        AllocationMatrix::from_thread_sets(total_threads, sets)
    }
}

/// Workload indices by descending request, ties by ascending index.
pub fn packing_order(requests: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| requests[b].cmp(&requests[a]).then(a.cmp(&b)));
    order
}

struct FreeMap {
    topo: CpuTopology,
    free: Vec<bool>,
}

impl FreeMap {
    fn new(topo: CpuTopology) -> Self {
        Self {
            topo,
            free: vec![true; topo.total_threads()],
        }
    }

    fn free_in_socket(&self, socket: usize) -> usize {
        self.topo
            .socket_threads(socket)
            .filter(|&t| self.free[t])
            .count()
    }

    /// Socket with the most free threads, lowest id on ties. `None` once the
    /// node is full.
    fn fullest_socket(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for socket in 0..self.topo.sockets() {
            let count = self.free_in_socket(socket);
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((socket, count));
            }
        }
        best.map(|(socket, _)| socket)
    }

    /// Take up to `want` threads from `socket`.
    ///
    /// Whole free cores go first (both siblings while at least two threads
    /// are still wanted); half-free cores are only used once no whole core
    /// is left in the socket. Lowest thread id breaks remaining ties.
    fn take_from_socket(&mut self, socket: usize, want: usize) -> Vec<usize> {
        let mut taken = Vec::new();
        while taken.len() < want {
            let need = want - taken.len();
            let whole = self.topo.socket_cores(socket).find(|&core| {
                let (a, b) = self.topo.siblings(core);
                self.free[a] && self.free[b]
            });
            if let Some(core) = whole {
                let (a, b) = self.topo.siblings(core);
                self.claim(a, &mut taken);
                if need >= 2 {
                    self.claim(b, &mut taken);
                }
                continue;
            }
            match self.topo.socket_threads(socket).find(|&t| self.free[t]) {
                Some(t) => self.claim(t, &mut taken),
                None => break,
            }
        }
        taken
    }

    fn claim(&mut self, thread: usize, taken: &mut Vec<usize>) {
        self.free[thread] = false;
        taken.push(thread);
    }
}
