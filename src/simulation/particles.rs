use nalgebra::zero;

use crate::{floating_type_mod::FT, MF, VF};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident<const D: usize> { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        #[derive(Clone, Debug)]
        pub struct $struct_name<const D: usize> {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl<const D: usize> $struct_name<D> {
            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }

            /// Number of particles. Panics if the field arrays disagree.
            pub fn len(&self) -> usize {
                let lens = [$(self.$field_name.len()),*];
                assert!(
                    lens.iter().all(|&l| l == lens[0]),
                    "inconsistent field lengths in {}: {:?}",
                    stringify!($struct_name),
                    lens
                );
                lens[0]
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec<const D: usize> {
        pub mass: Vec<FT> | 0.,
        pub position: Vec<VF<D>> | zero(),
        pub velocity: Vec<VF<D>> | zero(),

        pub density: Vec<FT> | 0.,
        pub density_sum: Vec<FT> | 0.,
        pub drho_dt: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,

        // forces of this step's non-pressure physics, reset by the driver
        pub acc_prior: Vec<VF<D>> | zero(),
        pub acc: Vec<VF<D>> | zero(),

        // 1 for particles at a free surface or boundary, 0 in the interior
        pub surface_indicator: Vec<u8> | 0,
    }
}

decl_particle_vec! {
    pub struct ViscoelasticFields<const D: usize> {
        pub tau: Vec<MF<D>> | zero(),
        pub dtau_dt: Vec<MF<D>> | zero(),
    }
}

impl<const D: usize> ParticleVec<D> {
    /// Particle volume m / rho
    pub fn volume(&self, i: usize) -> FT {
        self.mass[i] / self.density[i]
    }
}

#[test]
fn default_particle_vec_is_consistent() {
    let particles = ParticleVec::<2>::default(7);
    assert_eq!(particles.len(), 7);
    assert!(particles.acc_prior.iter().all(|a| *a == VF::<2>::zeros()));

    let stress = ViscoelasticFields::<3>::default(7);
    assert_eq!(stress.len(), 7);
    assert!(stress.tau.iter().all(|t| *t == MF::<3>::zeros()));
}

#[test]
#[should_panic]
fn inconsistent_lengths_are_detected() {
    let mut particles = ParticleVec::<2>::default(3);
    particles.mass.push(1.);
    particles.len();
}
