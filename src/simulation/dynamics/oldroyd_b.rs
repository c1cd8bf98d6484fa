/*!
Oldroyd-B stress transport on top of the pressure-velocity half steps.

The stress advances by half a step at the start of the first half and by another
half step at the end of the second half, so both stress updates bracket the
momentum and continuity updates of the base integrator.
*/

use crate::{
    body::{FluidBody, SphError},
    concurrency::par_iter_mut1,
    dynamics::{
        integration::{Integration1stHalf, Integration2ndHalf},
        LocalDynamics, Phase,
    },
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    particles::{ParticleVec, ViscoelasticFields},
    simulation_parameters::RiemannSolverType,
    sph_kernels::DimensionUtils,
    MF, VF,
};

fn checked_viscoelastic_body<DU: DimensionUtils<D>, const D: usize>(
    body: &FluidBody<DU, D>,
) -> Result<(FT, FT), SphError> {
    let oldroyd_b = body.oldroyd_b().ok_or(SphError::NotViscoelasticMaterial)?;
    let stress = body.viscoelastic().ok_or(SphError::MissingViscoelasticFields)?;
    if stress.len() != body.num_particles() {
        return Err(SphError::InvalidParticles(format!(
            "{} stress tensors for {} particles",
            stress.len(),
            body.num_particles()
        )));
    }
    Ok((oldroyd_b.reference_polymeric_viscosity(), oldroyd_b.reference_relaxation_time()))
}

fn stress_fields_mut<DU: DimensionUtils<D>, const D: usize>(
    body: &mut FluidBody<DU, D>,
) -> (&mut ParticleVec<D>, &mut ViscoelasticFields<D>) {
    let (particles, stress) = body.particles_and_viscoelastic_mut();
    let stress = stress.unwrap_or_else(|| panic!("stress fields of a viscoelastic body have been removed"));
    (particles, stress)
}

/// `tau += dtau_dt * dt / 2`
fn advance_stress_half_step<const D: usize>(stress: &mut ViscoelasticFields<D>, dt: FT) {
    let dtau_dt = &stress.dtau_dt;
    par_iter_mut1(&mut stress.tau, |i, p_tau| {
        *p_tau += dtau_dt[i] * (dt * 0.5);
    });
}

/// Upper-convected Maxwell stress rate for the velocity gradient `l`.
#[inline(always)]
pub fn oldroyd_b_stress_rate<const D: usize>(l: MF<D>, tau: MF<D>, mu_p: FT, lambda: FT) -> MF<D> {
    l.transpose() * tau + tau * l - tau / lambda + (l.transpose() + l) * (mu_p / lambda)
}

/**
 * First half step with the elastic force of the polymeric stress.
 */
pub struct OldroydBIntegration1stHalf {
    base: Integration1stHalf,
}

impl OldroydBIntegration1stHalf {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        riemann_solver: RiemannSolverType,
    ) -> Result<Self, SphError> {
        checked_viscoelastic_body(body)?;
        Ok(OldroydBIntegration1stHalf {
            base: Integration1stHalf::new(body, riemann_solver),
        })
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for OldroydBIntegration1stHalf {
    fn name(&self) -> &'static str {
        "oldroyd-b-integration-1st-half"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Initialization, Phase::Interaction, Phase::Update]
    }

    fn initialization(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let (_, stress) = stress_fields_mut(body);
        advance_stress_half_step(stress, dt);

        self.base.initialization(body, dt);
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, dt: FT) {
        self.base.interaction(body, neighs, dt);

        let (particles, stress) = stress_fields_mut(body);
        let tau = &stress.tau;
        let density = &particles.density;
        par_iter_mut1(&mut particles.acc, |i, p_acc| {
            let mut acceleration = VF::<D>::zeros();
            for record in neighs.iter(i) {
                acceleration += (tau[i] + tau[record.index()]) * record.nabla_w_ij_v_j();
            }
            *p_acc += acceleration / density[i];
        });
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        self.base.update(body, dt);
    }
}

/**
 * Second half step that also evaluates the stress rate from the velocity gradient.
 */
pub struct OldroydBIntegration2ndHalf {
    base: Integration2ndHalf,
    mu_p: FT,
    lambda: FT,
}

impl OldroydBIntegration2ndHalf {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        riemann_solver: RiemannSolverType,
    ) -> Result<Self, SphError> {
        let (mu_p, lambda) = checked_viscoelastic_body(body)?;
        Ok(OldroydBIntegration2ndHalf {
            base: Integration2ndHalf::new(body, riemann_solver),
            mu_p,
            lambda,
        })
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for OldroydBIntegration2ndHalf {
    fn name(&self) -> &'static str {
        "oldroyd-b-integration-2nd-half"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Initialization, Phase::Interaction, Phase::Update]
    }

    fn initialization(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        self.base.initialization(body, dt);
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, dt: FT) {
        self.base.interaction(body, neighs, dt);

        let mu_p = self.mu_p;
        let lambda = self.lambda;
        let (particles, stress) = stress_fields_mut(body);
        let velocity = &particles.velocity;
        let tau = &stress.tau;
        par_iter_mut1(&mut stress.dtau_dt, |i, p_dtau_dt| {
            let mut velocity_gradient = MF::<D>::zeros();
            for record in neighs.iter(i) {
                let v_ij = velocity[i] - velocity[record.index()];
                velocity_gradient -= v_ij * record.nabla_w_ij_v_j().transpose();
            }
            *p_dtau_dt = oldroyd_b_stress_rate(velocity_gradient, tau[i], mu_p, lambda);
        });
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        self.base.update(body, dt);

        let (_, stress) = stress_fields_mut(body);
        advance_stress_half_step(stress, dt);
    }
}

#[cfg(test)]
fn polymer_solution() -> crate::materials::FluidMaterial {
    use crate::materials::{OldroydBFluid, WeaklyCompressibleFluid};
    OldroydBFluid::new(WeaklyCompressibleFluid::new(1000., 10., 1e-3), 0.5, 0.25).into()
}

#[test]
fn stress_from_rest_follows_closed_form() {
    use crate::{
        body::test_utils::neighborhood_of,
        dynamics::{exec_dynamics, integration::particle_pair_2d, StepContext},
        vec2f,
    };

    let mut body = particle_pair_2d(polymer_solution(), vec2f(0., 0.), vec2f(0.3, 0.2));
    let neighs = neighborhood_of(&body);
    let context = StepContext::new();
    let dt = 1e-3;
    let mut first_half = OldroydBIntegration1stHalf::new(&body, RiemannSolverType::NoRiemann).unwrap();
    let mut second_half = OldroydBIntegration2ndHalf::new(&body, RiemannSolverType::NoRiemann).unwrap();

    exec_dynamics(&mut first_half, &mut body, &neighs, &context, dt).unwrap();
    exec_dynamics(&mut second_half, &mut body, &neighs, &context, dt).unwrap();

    // the pair is at rest density and stress free, so velocities are unchanged
    let v_01 = body.particles.velocity[0] - body.particles.velocity[1];
    assert_eq!(v_01, vec2f(-0.3, -0.2));

    let record = neighs.iter(0).next().unwrap();
    let l = -(v_01 * record.nabla_w_ij_v_j().transpose());
    let expected_rate = (l.transpose() + l) * (0.5 / 0.25);

    let stress = body.viscoelastic().unwrap();
    for (actual, expected) in stress.dtau_dt[0].iter().zip(expected_rate.iter()) {
        approx::assert_relative_eq!(*actual, *expected, epsilon = 1e-12, max_relative = 1e-12);
    }
    for (actual, expected) in stress.tau[0].iter().zip(expected_rate.iter()) {
        approx::assert_relative_eq!(*actual, *expected * dt * 0.5, epsilon = 1e-15, max_relative = 1e-12);
    }
    assert!(expected_rate.norm() > 0.);

    // the next first half completes the full step with the same rate
    let (_, stress) = stress_fields_mut(&mut body);
    advance_stress_half_step(stress, dt);
    let stress = body.viscoelastic().unwrap();
    for (actual, expected) in stress.tau[0].iter().zip(expected_rate.iter()) {
        approx::assert_relative_eq!(*actual, *expected * dt, epsilon = 1e-15, max_relative = 1e-12);
    }
}

#[test]
fn stress_relaxes_without_velocity_gradient() {
    use crate::{
        body::test_utils::neighborhood_of,
        dynamics::{exec_dynamics, integration::particle_pair_2d, StepContext},
        vec2f,
    };

    let mut body = particle_pair_2d(polymer_solution(), vec2f(0.1, 0.), vec2f(0.1, 0.));
    let tau0 = MF::<2>::new(2., 1., 1., -3.);
    for tau in body.viscoelastic_mut().unwrap().tau.iter_mut() {
        *tau = tau0;
    }
    let neighs = neighborhood_of(&body);
    let mut second_half = OldroydBIntegration2ndHalf::new(&body, RiemannSolverType::NoRiemann).unwrap();
    exec_dynamics(&mut second_half, &mut body, &neighs, &StepContext::new(), 1e-3).unwrap();

    let stress = body.viscoelastic().unwrap();
    for (actual, expected) in stress.dtau_dt[0].iter().zip((-tau0 / 0.25).iter()) {
        approx::assert_relative_eq!(*actual, *expected, max_relative = 1e-12);
    }
}

#[test]
fn prestressed_pair_feels_symmetric_elastic_force() {
    use crate::{
        body::test_utils::neighborhood_of,
        dynamics::{exec_dynamics, integration::particle_pair_2d, StepContext},
        vec2f,
    };

    let mut body = particle_pair_2d(polymer_solution(), vec2f(0., 0.), vec2f(0.3, 0.2));
    let tau_0 = MF::<2>::new(2., 1., 1., -3.);
    let tau_1 = MF::<2>::new(-1., 0.5, 0.5, 4.);
    {
        let stress = body.viscoelastic_mut().unwrap();
        stress.tau[0] = tau_0;
        stress.tau[1] = tau_1;
    }
    let neighs = neighborhood_of(&body);
    let record = *neighs.iter(0).next().unwrap();
    let context = StepContext::new();
    let dt = 1e-3;
    let mut first_half = OldroydBIntegration1stHalf::new(&body, RiemannSolverType::NoRiemann).unwrap();
    let mut second_half = OldroydBIntegration2ndHalf::new(&body, RiemannSolverType::NoRiemann).unwrap();

    // zero pressure at rest density and a zero initial stress rate leave tau untouched here
    exec_dynamics(&mut first_half, &mut body, &neighs, &context, dt).unwrap();
    assert_eq!(body.viscoelastic().unwrap().tau[0], tau_0);

    let expected_acc = (tau_0 + tau_1) * record.nabla_w_ij_v_j() / 1000.;
    let acc = &body.particles.acc;
    for k in 0..2 {
        approx::assert_relative_eq!(acc[0][k], expected_acc[k], epsilon = 1e-12, max_relative = 1e-12);
        approx::assert_relative_eq!(acc[0][k], -acc[1][k], epsilon = 1e-12, max_relative = 1e-12);
    }
    assert!(expected_acc.norm() > 0.);

    exec_dynamics(&mut second_half, &mut body, &neighs, &context, dt).unwrap();

    let v_01 = body.particles.velocity[0] - body.particles.velocity[1];
    let l = -(v_01 * record.nabla_w_ij_v_j().transpose());
    let (mu_p, lambda) = (0.5, 0.25);
    let expected_rate = l.transpose() * tau_0 + tau_0 * l - tau_0 / lambda + (l.transpose() + l) * (mu_p / lambda);

    let stress = body.viscoelastic().unwrap();
    for (actual, expected) in stress.dtau_dt[0].iter().zip(expected_rate.iter()) {
        approx::assert_relative_eq!(*actual, *expected, epsilon = 1e-12, max_relative = 1e-12);
    }
    // the convected terms have to contribute beyond plain relaxation
    assert!((expected_rate + tau_0 / lambda).norm() > 1e-6);
}

#[test]
fn stress_dynamics_require_viscoelastic_body() {
    use crate::body::test_utils::{lattice_body_2d, water};

    let body = lattice_body_2d(3, 0.1, water());
    assert!(matches!(
        OldroydBIntegration1stHalf::new(&body, RiemannSolverType::Dissipative),
        Err(SphError::NotViscoelasticMaterial)
    ));
    assert!(matches!(
        OldroydBIntegration2ndHalf::new(&body, RiemannSolverType::Dissipative),
        Err(SphError::NotViscoelasticMaterial)
    ));
}
