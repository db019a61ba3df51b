//! Allocation matrix: which hardware threads belong to which workload.
//!
//! Internally each workload keeps a sorted list of thread ids. The wire
//! form is one boolean vector per workload, indexed by thread id, which is
//! what callers of [`crate::allocate_exact`] and [`crate::allocate_greedy`]
//! exchange.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};

/// Thread sets per workload, pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>", into = "Vec<Vec<bool>>")]
pub struct AllocationMatrix {
    total_threads: usize,
    assignments: Vec<Vec<usize>>,
}

impl AllocationMatrix {
    /// An allocation where every workload holds no threads.
    pub fn empty(total_threads: usize, workloads: usize) -> Self {
        Self {
            total_threads,
            assignments: vec![Vec::new(); workloads],
        }
    }

    /// Build from explicit thread sets, one per workload.
    pub fn from_thread_sets(total_threads: usize, sets: Vec<Vec<usize>>) -> AllocResult<Self> {
        let mut owner = vec![None; total_threads];
        let mut assignments = Vec::with_capacity(sets.len());
        for (workload, mut set) in sets.into_iter().enumerate() {
            set.sort_unstable();
            set.dedup();
            for &thread in &set {
                let Some(slot) = owner.get_mut(thread) else {
                    return Err(AllocError::InvalidAllocation(format!(
                        "workload {workload} holds thread {thread} outside 0..{total_threads}"
                    )));
                };
                if let Some(other) = slot.replace(workload) {
                    return Err(AllocError::InvalidAllocation(format!(
                        "thread {thread} assigned to workloads {other} and {workload}"
                    )));
                }
            }
            assignments.push(set);
        }
        Ok(Self {
            total_threads,
            assignments,
        })
    }

    /// Build from boolean vectors (`vectors[j][t]` = thread `t` belongs to
    /// workload `j`).
    ///
    /// The thread count is the longest vector; shorter vectors are read as
    /// padded with `false`.
    pub fn from_bool_vectors(vectors: &[Vec<bool>]) -> AllocResult<Self> {
        let total_threads = vectors.iter().map(Vec::len).max().unwrap_or(0);
        let sets = vectors
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter_map(|(t, &on)| on.then_some(t))
                    .collect()
            })
            .collect();
        Self::from_thread_sets(total_threads, sets)
    }

    pub fn to_bool_vectors(&self) -> Vec<Vec<bool>> {
        self.to_grid(self.workloads(), self.total_threads)
    }

    /// Boolean grid resized to `workloads × total_threads`.
    ///
    /// Workloads past the end of this matrix come out empty; workloads and
    /// threads beyond the requested shape are dropped.
    pub fn to_grid(&self, workloads: usize, total_threads: usize) -> Vec<Vec<bool>> {
        (0..workloads)
            .map(|j| {
                let mut row = vec![false; total_threads];
                for &t in self.assignments.get(j).map(Vec::as_slice).unwrap_or(&[]) {
                    if let Some(cell) = row.get_mut(t) {
                        *cell = true;
                    }
                }
                row
            })
            .collect()
    }

    pub fn total_threads(&self) -> usize {
        self.total_threads
    }

    pub fn workloads(&self) -> usize {
        self.assignments.len()
    }

    /// Sorted thread ids of `workload` (empty if out of range).
    pub fn threads(&self, workload: usize) -> &[usize] {
        self.assignments
            .get(workload)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Workload holding `thread`, if any.
    pub fn owner_of(&self, thread: usize) -> Option<usize> {
        self.assignments
            .iter()
            .position(|set| set.binary_search(&thread).is_ok())
    }

    /// Threads not held by any workload.
    pub fn free_threads(&self) -> Vec<usize> {
        let used: BTreeSet<usize> = self.assignments.iter().flatten().copied().collect();
        (0..self.total_threads).filter(|t| !used.contains(t)).collect()
    }

    /// Check this matrix against the requests it is supposed to satisfy.
    pub fn validate(&self, requests: &[usize]) -> AllocResult<()> {
        if requests.len() != self.workloads() {
            return Err(AllocError::InvalidAllocation(format!(
                "{} workloads requested, matrix has {}",
                requests.len(),
                self.workloads()
            )));
        }
        for (j, (&want, set)) in requests.iter().zip(&self.assignments).enumerate() {
            if set.len() != want {
                return Err(AllocError::InvalidAllocation(format!(
                    "workload {j} requested {want} threads, holds {}",
                    set.len()
                )));
            }
        }
        // Disjointness and range are re-checked from scratch.
        Self::from_thread_sets(self.total_threads, self.assignments.clone()).map(|_| ())
    }

    /// Linux cpuset list for `workload`, e.g. `"0-3,8,10-11"`.
    pub fn cpu_list(&self, workload: usize) -> String {
        format_cpu_list(self.threads(workload))
    }
}

impl TryFrom<Vec<Vec<bool>>> for AllocationMatrix {
    type Error = AllocError;

    fn try_from(vectors: Vec<Vec<bool>>) -> AllocResult<Self> {
        Self::from_bool_vectors(&vectors)
    }
}

impl From<AllocationMatrix> for Vec<Vec<bool>> {
    fn from(matrix: AllocationMatrix) -> Self {
        matrix.to_bool_vectors()
    }
}

/// Number of differing thread assignments across the workload indices
/// both matrices share.
pub fn diff(a: &AllocationMatrix, b: &AllocationMatrix) -> usize {
    let shared = a.workloads().min(b.workloads());
    (0..shared)
        .map(|j| {
            let left: BTreeSet<usize> = a.threads(j).iter().copied().collect();
            let right: BTreeSet<usize> = b.threads(j).iter().copied().collect();
            left.symmetric_difference(&right).count()
        })
        .sum()
}

/// Render sorted thread ids as a cpuset list (`"0-3,8"`).
pub fn format_cpu_list(threads: &[usize]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = threads.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(",")
}

/// Parse a cpuset list (`"0-3,8,10-11"`) into sorted, deduplicated ids.
pub fn parse_cpu_list(s: &str) -> AllocResult<Vec<usize>> {
    let invalid = |part: &str| AllocError::InvalidAllocation(format!("bad cpu list entry {part:?}"));
    let mut cpus = BTreeSet::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.trim().parse().map_err(|_| invalid(part))?;
            let end: usize = end.trim().parse().map_err(|_| invalid(part))?;
            if start > end {
                return Err(invalid(part));
            }
            cpus.extend(start..=end);
        } else {
            cpus.insert(part.parse().map_err(|_| invalid(part))?);
        }
    }
    Ok(cpus.into_iter().collect())
}
