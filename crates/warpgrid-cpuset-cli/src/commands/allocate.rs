use std::path::Path;
use std::time::Duration;

use tracing::warn;
use warpgrid_cpuset::{
    AllocError, AllocationMatrix, CostWeights, DefaultSolver, ExactAllocator, GreedyAllocator,
};

pub fn greedy(requests: &[usize], threads: usize, sockets: usize, format: &str) -> anyhow::Result<()> {
    let matrix = GreedyAllocator::new().allocate(requests, threads, sockets)?;
    print_matrix(&matrix, format)
}

pub fn exact(
    requests: &[usize],
    threads: usize,
    sockets: usize,
    previous: Option<&Path>,
    verbose: bool,
    timeout_secs: Option<u64>,
    format: &str,
) -> anyhow::Result<()> {
    let previous = match previous {
        Some(path) => Some(read_previous(path)?),
        None => None,
    };
    let timeout = timeout_secs.map(Duration::from_secs);
    let matrix = solve_with_timeout(requests.to_vec(), threads, sockets, previous, verbose, timeout)?;
    print_matrix(&matrix, format)
}

/// Previous allocation as written by `exact --format json`.
pub fn read_previous(path: &Path) -> anyhow::Result<AllocationMatrix> {
    let content = std::fs::read_to_string(path)?;
    let vectors: Vec<Vec<bool>> = serde_json::from_str(&content)?;
    Ok(AllocationMatrix::from_bool_vectors(&vectors)?)
}

/// Run the exact allocator, abandoning it after `timeout`.
///
/// The solver call runs on a blocking thread; an elapsed timeout is
/// reported as a solver failure and the thread is left to finish on its own.
pub fn solve_with_timeout(
    requests: Vec<usize>,
    threads: usize,
    sockets: usize,
    previous: Option<AllocationMatrix>,
    verbose: bool,
    timeout: Option<Duration>,
) -> anyhow::Result<AllocationMatrix> {
    let solve = move || {
        ExactAllocator::new(DefaultSolver::default())
            .with_weights(CostWeights::default())
            .verbose(verbose)
            .solve(&requests, threads, sockets, previous.as_ref())
    };

    let Some(limit) = timeout else {
        return Ok(solve()?);
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let result = rt.block_on(async move {
        let task = tokio::task::spawn_blocking(solve);
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(solved)) => solved.map_err(anyhow::Error::from),
            Ok(Err(join_err)) => Err(anyhow::Error::from(join_err)),
            Err(_) => {
                warn!(timeout = ?limit, "solver timed out");
                Err(anyhow::Error::from(AllocError::SolverFailure(format!(
                    "solver timed out after {limit:?}"
                ))))
            }
        }
    });
    rt.shutdown_background();
    result
}

pub fn print_matrix(matrix: &AllocationMatrix, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string(matrix)?),
        _ => print!("{}", format_matrix(matrix)),
    }
    Ok(())
}

pub fn format_matrix(matrix: &AllocationMatrix) -> String {
    let mut out = String::new();
    for j in 0..matrix.workloads() {
        let threads = matrix.threads(j);
        let cpus = if threads.is_empty() { "-".to_string() } else { matrix.cpu_list(j) };
        out.push_str(&format!("workload {j}: {cpus} ({} threads)\n", threads.len()));
    }
    let free = matrix.free_threads();
    out.push_str(&format!("free: {} threads\n", free.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_text_report() {
        let m = AllocationMatrix::from_thread_sets(8, vec![vec![0, 1, 2, 3], vec![], vec![6]]).unwrap();
        let text = format_matrix(&m);
        assert_eq!(
            text,
            "workload 0: 0-3 (4 threads)\nworkload 1: - (0 threads)\nworkload 2: 6 (1 threads)\nfree: 3 threads\n"
        );
    }

    #[test]
    fn reads_previous_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prev.json");
        std::fs::write(&path, "[[true,true,false,false],[false,false,true,true]]").unwrap();

        let m = read_previous(&path).unwrap();
        assert_eq!(m.threads(1), &[2, 3]);
    }

    #[test]
    fn overlapping_previous_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prev.json");
        std::fs::write(&path, "[[true],[true]]").unwrap();
        assert!(read_previous(&path).is_err());
    }

    #[test]
    fn capacity_error_passes_through_timeout_wrapper() {
        let err = solve_with_timeout(vec![5], 4, 1, None, false, Some(Duration::from_secs(30))).unwrap_err();
        let alloc = err.downcast_ref::<AllocError>().unwrap();
        assert!(matches!(alloc, AllocError::CapacityExceeded { .. }));
    }

    #[test]
    fn trivial_request_solves_without_runtime() {
        let m = solve_with_timeout(vec![0, 0], 4, 1, None, false, None).unwrap();
        assert_eq!(m.workloads(), 2);
    }
}
