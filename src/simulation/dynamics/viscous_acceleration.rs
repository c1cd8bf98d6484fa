use crate::{
    body::FluidBody,
    concurrency::par_iter_mut1,
    dynamics::{LocalDynamics, Phase},
    floating_type_mod::FT,
    materials::Fluid,
    neighborhood::Neighborhood,
    simulation_parameters::ViscosityType,
    sph_kernels::DimensionUtils,
    VF,
};

/// Shear force of one neighbor, `2 mu (v_i - v_j) / (r_ij + 0.01 h) * dW_ij V_j`.
#[inline(always)]
pub fn direct_viscous_force<const D: usize>(mu: FT, h: FT, v_ij: VF<D>, r_ij: FT, dw_ij_v_j: FT) -> VF<D> {
    let vel_derivative = v_ij / (r_ij + 0.01 * h);
    vel_derivative * (2. * mu * dw_ij_v_j)
}

/// Monaghan 2005. The force acts along `e_ij`, so it conserves angular momentum.
#[inline(always)]
pub fn angular_conservative_viscous_force<const D: usize>(
    mu: FT,
    h: FT,
    v_ij: VF<D>,
    r_ij: FT,
    e_ij: VF<D>,
    dw_ij_v_j: FT,
) -> VF<D> {
    let v_r_ij = v_ij.dot(&(e_ij * r_ij));
    let eta_ij = 8. * mu * v_r_ij / (r_ij * r_ij + 0.01 * h);
    e_ij * (eta_ij * dw_ij_v_j)
}

/**
 * Adds the viscous acceleration to `acc_prior`. Contributions of earlier dynamics stay untouched.
 */
pub struct ViscousAcceleration {
    viscosity_type: ViscosityType,
    mu: FT,
    smoothing_length: FT,
}

impl ViscousAcceleration {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(body: &FluidBody<DU, D>, viscosity_type: ViscosityType) -> Self {
        ViscousAcceleration {
            viscosity_type,
            mu: body.material.reference_viscosity(),
            smoothing_length: body.adaptation.reference_smoothing_length(),
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for ViscousAcceleration {
    fn name(&self) -> &'static str {
        match self.viscosity_type {
            ViscosityType::Direct => "viscous-acceleration",
            ViscosityType::AngularConservative => "angular-conservative-viscous-acceleration",
        }
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Interaction]
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let mu = self.mu;
        let h = self.smoothing_length;
        let viscosity_type = self.viscosity_type;
        let particles = &mut body.particles;
        let velocity = &particles.velocity;
        let density = &particles.density;

        par_iter_mut1(&mut particles.acc_prior, |i, p_acc_prior| {
            let mut acceleration = VF::<D>::zeros();
            for record in neighs.iter(i) {
                let v_ij = velocity[i] - velocity[record.index()];
                acceleration += match viscosity_type {
                    ViscosityType::Direct => direct_viscous_force(mu, h, v_ij, record.r_ij, record.dw_ij_v_j),
                    ViscosityType::AngularConservative => {
                        angular_conservative_viscous_force(mu, h, v_ij, record.r_ij, record.e_ij, record.dw_ij_v_j)
                    }
                };
            }
            *p_acc_prior += acceleration / density[i];
        });
    }
}

#[test]
fn uniform_velocity_adds_no_viscous_acceleration() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, uniform_velocity, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    for viscosity_type in [ViscosityType::Direct, ViscosityType::AngularConservative] {
        let mut body = lattice_body_2d(6, 0.1, water());
        uniform_velocity(&mut body, vec2f(0.7, -1.3));
        let gravity = vec2f(0., -9.81);
        for acc_prior in body.particles.acc_prior.iter_mut() {
            *acc_prior = gravity;
        }
        let neighs = neighborhood_of(&body);
        let mut viscous = ViscousAcceleration::new(&body, viscosity_type);
        exec_dynamics(&mut viscous, &mut body, &neighs, &StepContext::new(), 0.01).unwrap();

        for acc_prior in &body.particles.acc_prior {
            assert_eq!(*acc_prior, gravity);
        }
    }
}

#[test]
fn shear_flow_is_decelerated() {
    use crate::{
        body::test_utils::{center_index, lattice_body_2d, neighborhood_of, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    let n = 7;
    for viscosity_type in [ViscosityType::Direct, ViscosityType::AngularConservative] {
        let mut body = lattice_body_2d(n, 0.1, water());
        // only the center particle moves
        let i = center_index(n);
        body.particles.velocity[i] = vec2f(1., 0.);
        let neighs = neighborhood_of(&body);
        let mut viscous = ViscousAcceleration::new(&body, viscosity_type);
        exec_dynamics(&mut viscous, &mut body, &neighs, &StepContext::new(), 0.01).unwrap();

        assert!(body.particles.acc_prior[i].x < 0.);
        crate::assert_ft_approx_eq(body.particles.acc_prior[i].y, 0., 1e-12, || {
            "no lateral viscous acceleration".to_string()
        });
    }
}

#[test]
fn viscous_pair_forces_are_antisymmetric() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(17);
    let mu = 1e-2;
    let h = 0.13;
    for _ in 0..100 {
        let v_i = VF::<3>::from_fn(|_, _| rng.gen_range(-2.0..2.0));
        let v_j = VF::<3>::from_fn(|_, _| rng.gen_range(-2.0..2.0));
        let e_ij = VF::<3>::from_fn(|_, _| rng.gen_range(-1.0..1.0)).normalize();
        let r_ij: FT = rng.gen_range(0.01..0.26);
        let dw_ij_v_j: FT = -rng.gen_range(0.0..10.0);

        let f_ij = angular_conservative_viscous_force(mu, h, v_i - v_j, r_ij, e_ij, dw_ij_v_j);
        let f_ji = angular_conservative_viscous_force(mu, h, v_j - v_i, r_ij, -e_ij, dw_ij_v_j);
        assert_eq!(f_ij, -f_ji);
        // force along the line of centers
        assert!(f_ij.cross(&e_ij).norm() <= 1e-12 * (1. + f_ij.norm()));

        let f_ij = direct_viscous_force(mu, h, v_i - v_j, r_ij, dw_ij_v_j);
        let f_ji = direct_viscous_force(mu, h, v_j - v_i, r_ij, dw_ij_v_j);
        assert_eq!(f_ij, -f_ji);
    }
}
