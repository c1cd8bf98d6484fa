pub mod adaptation;
pub mod body;
pub mod concurrency;
pub mod dynamics;
pub mod materials;
pub mod neighborhood;
pub mod particles;
pub mod scene;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod simulation;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{PI, TAU};

    /// Added to time step denominators so that a resting fluid yields a finite step.
    pub const TINY_REAL: FT = 2.710_505_431_213_761e-20;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{PI, TAU};

    /// Added to time step denominators so that a resting fluid yields a finite step.
    pub const TINY_REAL: FT = 2.710_505_4e-20;
}

use floating_type_mod::FT;

use nalgebra::{SMatrix, SVector};

pub type IT = i32;

#[allow(dead_code)]
pub type V<FT, const D: usize> = SVector<FT, D>;
pub type M<FT, const D: usize> = SMatrix<FT, D, D>;

pub type VF<const D: usize> = V<FT, D>;
pub type VI<const D: usize> = V<IT, D>;
pub type MF<const D: usize> = M<FT, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

pub fn vec2f(x: FT, y: FT) -> V<FT, 2> {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

pub use simulation::*;
