/*!
Pairwise interaction and dual time stepping core for weakly compressible and
Oldroyd-B SPH fluids.
*/

mod platform;
mod simulation;

pub use simulation::*;

/// Avoids 'unused' warnings.
pub use platform::start;
