use crate::{
    body::FluidBody,
    concurrency::{par_iter_mut1, par_iter_mut3},
    dynamics::{LocalDynamics, Phase},
    floating_type_mod::FT,
    materials::{Fluid, FluidMaterial},
    neighborhood::Neighborhood,
    simulation_parameters::RiemannSolverType,
    sph_kernels::DimensionUtils,
    VF,
};

/**
 * Pressure and velocity at the interface of a particle pair.
 */
#[derive(Debug, Clone, Copy)]
pub struct RiemannSolver {
    kind: RiemannSolverType,
    rho0c0: FT,
    inv_c0: FT,
}

impl RiemannSolver {
    pub fn new(material: &FluidMaterial, kind: RiemannSolverType) -> Self {
        let rho0 = material.reference_density();
        let c0 = material.reference_sound_speed();
        RiemannSolver {
            kind,
            rho0c0: rho0 * c0,
            inv_c0: 1. / c0,
        }
    }

    /// `e_ij` points from j to i.
    #[inline(always)]
    pub fn interface_pressure<const D: usize>(&self, p_i: FT, p_j: FT, v_i: VF<D>, v_j: VF<D>, e_ij: VF<D>) -> FT {
        let p_star = (p_i + p_j) * 0.5;
        match self.kind {
            RiemannSolverType::NoRiemann => p_star,
            RiemannSolverType::Dissipative => {
                // positive when the particles approach each other
                let u_jump = (v_j - v_i).dot(&e_ij);
                let limiter = FT::min(3. * FT::max(u_jump * self.inv_c0, 0.), 1.);
                p_star + 0.5 * self.rho0c0 * u_jump * limiter
            }
        }
    }

    /// Extra normal velocity in the continuity equation.
    #[inline(always)]
    pub fn dissipative_velocity(&self, p_i: FT, p_j: FT) -> FT {
        match self.kind {
            RiemannSolverType::NoRiemann => 0.,
            RiemannSolverType::Dissipative => (p_i - p_j) / self.rho0c0,
        }
    }
}

/**
 * First half of the pressure-velocity step: density and position advance by half a step,
 * the pressure gradient is evaluated and the velocity advances by a full step.
 */
pub struct Integration1stHalf {
    riemann_solver: RiemannSolver,
}

impl Integration1stHalf {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(body: &FluidBody<DU, D>, kind: RiemannSolverType) -> Self {
        Integration1stHalf {
            riemann_solver: RiemannSolver::new(&body.material, kind),
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for Integration1stHalf {
    fn name(&self) -> &'static str {
        "integration-1st-half"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Initialization, Phase::Interaction, Phase::Update]
    }

    fn initialization(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let material = &body.material;
        let particles = &mut body.particles;
        let drho_dt = &particles.drho_dt;
        let velocity = &particles.velocity;
        par_iter_mut3(
            &mut particles.density,
            &mut particles.pressure,
            &mut particles.position,
            |i, p_density, p_pressure, p_position| {
                *p_density += drho_dt[i] * dt * 0.5;
                *p_pressure = material.pressure(*p_density);
                *p_position += velocity[i] * (dt * 0.5);
            },
        );
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let riemann_solver = self.riemann_solver;
        let particles = &mut body.particles;
        let pressure = &particles.pressure;
        let velocity = &particles.velocity;
        let density = &particles.density;
        par_iter_mut1(&mut particles.acc, |i, p_acc| {
            let mut acceleration = VF::<D>::zeros();
            for record in neighs.iter(i) {
                let j = record.index();
                let p_star =
                    riemann_solver.interface_pressure(pressure[i], pressure[j], velocity[i], velocity[j], record.e_ij);
                acceleration -= record.nabla_w_ij_v_j() * (2. * p_star);
            }
            *p_acc = acceleration / density[i];
        });
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let particles = &mut body.particles;
        let acc_prior = &particles.acc_prior;
        let acc = &particles.acc;
        par_iter_mut1(&mut particles.velocity, |i, p_velocity| {
            *p_velocity += (acc_prior[i] + acc[i]) * dt;
        });
    }
}

/**
 * Second half of the pressure-velocity step: position advances by the remaining half step
 * with the new velocity and the density follows from the continuity equation.
 */
pub struct Integration2ndHalf {
    riemann_solver: RiemannSolver,
}

impl Integration2ndHalf {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(body: &FluidBody<DU, D>, kind: RiemannSolverType) -> Self {
        Integration2ndHalf {
            riemann_solver: RiemannSolver::new(&body.material, kind),
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for Integration2ndHalf {
    fn name(&self) -> &'static str {
        "integration-2nd-half"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Initialization, Phase::Interaction, Phase::Update]
    }

    fn initialization(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let particles = &mut body.particles;
        let velocity = &particles.velocity;
        par_iter_mut1(&mut particles.position, |i, p_position| {
            *p_position += velocity[i] * (dt * 0.5);
        });
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let riemann_solver = self.riemann_solver;
        let particles = &mut body.particles;
        let pressure = &particles.pressure;
        let velocity = &particles.velocity;
        let density = &particles.density;
        par_iter_mut1(&mut particles.drho_dt, |i, p_drho_dt| {
            let mut density_change_rate = 0.;
            for record in neighs.iter(i) {
                let j = record.index();
                let u_ij = (velocity[i] - velocity[j]).dot(&record.e_ij)
                    + riemann_solver.dissipative_velocity(pressure[i], pressure[j]);
                density_change_rate += u_ij * record.dw_ij_v_j;
            }
            *p_drho_dt = density_change_rate * density[i];
        });
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let particles = &mut body.particles;
        let drho_dt = &particles.drho_dt;
        par_iter_mut1(&mut particles.density, |i, p_density| {
            *p_density += drho_dt[i] * dt * 0.5;
        });
    }
}

#[cfg(test)]
pub(crate) fn particle_pair_2d(
    material: FluidMaterial,
    velocity_0: VF<2>,
    velocity_1: VF<2>,
) -> FluidBody<crate::sph_kernels::DimensionUtils2d, 2> {
    use crate::{adaptation::SphAdaptation, particles::ParticleVec, vec2f};

    let spacing = 0.1;
    let mut particles = ParticleVec::<2>::default(2);
    particles.position[1] = vec2f(spacing, 0.);
    particles.velocity = vec![velocity_0, velocity_1];
    let rho0 = material.reference_density();
    particles.mass = vec![rho0 * spacing * spacing; 2];
    FluidBody::new(particles, material, SphAdaptation::new(spacing, 1.3)).unwrap()
}

#[test]
fn resting_fluid_only_feels_prior_acceleration() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    let mut body = lattice_body_2d(5, 0.1, water());
    let gravity = vec2f(0., -9.81);
    for acc_prior in body.particles.acc_prior.iter_mut() {
        *acc_prior = gravity;
    }
    let neighs = neighborhood_of(&body);
    let context = StepContext::new();
    let dt = 1e-3;
    let mut first_half = Integration1stHalf::new(&body, RiemannSolverType::Dissipative);
    let mut second_half = Integration2ndHalf::new(&body, RiemannSolverType::Dissipative);
    exec_dynamics(&mut first_half, &mut body, &neighs, &context, dt).unwrap();
    exec_dynamics(&mut second_half, &mut body, &neighs, &context, dt).unwrap();

    for i in 0..body.num_particles() {
        assert_eq!(body.particles.pressure[i], 0.);
        assert_eq!(body.particles.acc[i], VF::<2>::zeros());
        assert_eq!(body.particles.velocity[i], gravity * dt);
        // the second half moves the particle with the new velocity
        let expected_height = (i / 5) as FT * 0.1 - 9.81 * dt * dt * 0.5;
        crate::assert_ft_approx_eq(body.particles.position[i].y, expected_height, 1e-12, || {
            format!("height of particle {}", i)
        });
    }
}

#[test]
fn compressed_pair_repels() {
    use crate::{
        body::test_utils::{neighborhood_of, water},
        dynamics::{exec_dynamics, StepContext},
    };

    let mut body = particle_pair_2d(water(), VF::<2>::zeros(), VF::<2>::zeros());
    body.particles.density = vec![1010., 1010.];
    let neighs = neighborhood_of(&body);
    let mut first_half = Integration1stHalf::new(&body, RiemannSolverType::NoRiemann);
    exec_dynamics(&mut first_half, &mut body, &neighs, &StepContext::new(), 1e-4).unwrap();

    assert!(body.particles.pressure[0] > 0.);
    // particle 1 sits at +x, so particle 0 is pushed towards -x
    assert!(body.particles.acc[0].x < 0.);
    approx::assert_relative_eq!(body.particles.acc[0].x, -body.particles.acc[1].x, max_relative = 1e-12);
    assert!(body.particles.velocity[0].x < 0.);
}

#[test]
fn dissipative_riemann_solver_damps_approaching_particles() {
    use crate::{body::test_utils::water, vec2f};

    let material = water();
    let e_ij = vec2f(-1., 0.);
    let plain = RiemannSolver::new(&material, RiemannSolverType::NoRiemann);
    let dissipative = RiemannSolver::new(&material, RiemannSolverType::Dissipative);

    // particle i at -x moves towards particle j
    let v_i = vec2f(1., 0.);
    let v_j = vec2f(0., 0.);
    let p_plain = plain.interface_pressure(5., 3., v_i, v_j, e_ij);
    assert_eq!(p_plain, 4.);
    assert!(dissipative.interface_pressure(5., 3., v_i, v_j, e_ij) > p_plain);
    // separating particles are not damped
    assert_eq!(dissipative.interface_pressure(5., 3., v_j, v_i, e_ij), p_plain);

    assert_eq!(plain.dissipative_velocity(5., 3.), 0.);
    approx::assert_relative_eq!(dissipative.dissipative_velocity(5., 3.), 2. / (1000. * 10.));
}

#[test]
fn separating_pair_loses_density() {
    use crate::{
        body::test_utils::{neighborhood_of, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    let mut body = particle_pair_2d(water(), vec2f(-0.5, 0.), vec2f(0.5, 0.));
    let neighs = neighborhood_of(&body);
    let mut second_half = Integration2ndHalf::new(&body, RiemannSolverType::NoRiemann);
    exec_dynamics(&mut second_half, &mut body, &neighs, &StepContext::new(), 1e-3).unwrap();

    assert!(body.particles.drho_dt[0] < 0.);
    assert_eq!(body.particles.drho_dt[0], body.particles.drho_dt[1]);
    assert!(body.particles.density[0] < 1000.);
}
