//! MILP backends for the exact allocator.

mod brute_force;
#[cfg(feature = "microlp")]
mod good_lp_backend;

pub use brute_force::BruteForceSolver;
#[cfg(feature = "microlp")]
pub use good_lp_backend::GoodLpSolver;

/// Backend used by [`crate::allocate_exact`].
#[cfg(feature = "microlp")]
pub type DefaultSolver = GoodLpSolver;

/// Backend used by [`crate::allocate_exact`].
#[cfg(not(feature = "microlp"))]
pub type DefaultSolver = BruteForceSolver;
