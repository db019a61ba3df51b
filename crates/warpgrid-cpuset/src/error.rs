//! CPU allocation error types.

use thiserror::Error;

/// Errors returned by the allocators and the planner.
///
/// None of these are retried internally: an instance that failed once
/// fails again until the caller changes its inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocError {
    #[error("invalid topology: {threads} threads cannot form {sockets} socket(s) of whole cores")]
    InvalidTopology { threads: usize, sockets: usize },

    #[error("capacity exceeded: {requested} compute units requested, {available} threads available")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("solver failure: {0}")]
    SolverFailure(String),

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("invalid cost weights: {0}")]
    InvalidWeights(String),
}

pub type AllocResult<T> = Result<T, AllocError>;

/// Sum of all requests, saturating at `usize::MAX` on overflow.
pub(crate) fn total_requested(requests: &[usize]) -> usize {
    requests
        .iter()
        .try_fold(0usize, |acc, &r| acc.checked_add(r))
        .unwrap_or(usize::MAX)
}

/// Reject a request vector whose total exceeds the thread count.
pub(crate) fn check_capacity(requests: &[usize], available: usize) -> AllocResult<()> {
    let requested = total_requested(requests);
    if requested > available {
        return Err(AllocError::CapacityExceeded {
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_check_accepts_exact_fit() {
        assert!(check_capacity(&[2, 2], 4).is_ok());
        assert!(check_capacity(&[], 4).is_ok());
    }

    #[test]
    fn capacity_check_saturates_on_overflow() {
        let err = check_capacity(&[usize::MAX, 1], 4).unwrap_err();
        assert_eq!(
            err,
            AllocError::CapacityExceeded {
                requested: usize::MAX,
                available: 4
            }
        );
        assert_eq!(total_requested(&[usize::MAX - 1, 1]), usize::MAX);
    }

    #[test]
    fn capacity_check_reports_totals() {
        let err = check_capacity(&[3, 2], 4).unwrap_err();
        assert_eq!(
            err,
            AllocError::CapacityExceeded {
                requested: 5,
                available: 4
            }
        );
        assert!(err.to_string().contains("5 compute units"));
    }
}
