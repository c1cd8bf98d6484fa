use crate::{
    body::FluidBody,
    concurrency::par_iter_reduce1,
    dynamics::{ReduceDynamics, StepContext},
    floating_type_mod::{FT, TINY_REAL},
    materials::Fluid,
    simulation_parameters::AdvectionCriterion,
    sph_kernels::DimensionUtils,
};

/// Smoothing length of the finest particles of the body.
fn finest_smoothing_length<DU: DimensionUtils<D>, const D: usize>(body: &FluidBody<DU, D>) -> FT {
    let adaptation = &body.adaptation;
    adaptation.reference_smoothing_length() * adaptation.minimum_spacing() / adaptation.reference_spacing()
}

/**
 * CFL bound from the fastest signal, `CFL * h / max(c + |v|)`.
 */
pub struct AcousticTimeStepSize {
    acoustic_cfl: FT,
    smoothing_length: FT,
}

impl AcousticTimeStepSize {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(body: &FluidBody<DU, D>, acoustic_cfl: FT) -> Self {
        AcousticTimeStepSize {
            acoustic_cfl,
            smoothing_length: body.adaptation.reference_smoothing_length(),
        }
    }

    /// Uses the smoothing length of the finest particles.
    pub fn variable_smoothing_length<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        acoustic_cfl: FT,
    ) -> Self {
        AcousticTimeStepSize {
            acoustic_cfl,
            smoothing_length: finest_smoothing_length(body),
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> ReduceDynamics<DU, D> for AcousticTimeStepSize {
    fn name(&self) -> &'static str {
        "acoustic-time-step"
    }

    fn exec(&self, body: &FluidBody<DU, D>, _context: &mut StepContext) -> FT {
        let material = &body.material;
        let particles = &body.particles;
        let signal_speed_max = par_iter_reduce1(
            &particles.velocity,
            || 0.,
            FT::max,
            |i, velocity| material.sound_speed(particles.pressure[i], particles.density[i]) + velocity.norm(),
        );
        self.acoustic_cfl * self.smoothing_length / (signal_speed_max + TINY_REAL)
    }
}

/**
 * CFL bound from the particle speed, `CFL * h / sqrt(max(U_max^2, max |v|^2))`.
 *
 * The resulting maximum speed is written to the step context.
 */
pub struct AdvectionTimeStepSize {
    advection_cfl: FT,
    smoothing_length: FT,
    // lower bound of the reduced squared speed
    reference: FT,
}

impl AdvectionTimeStepSize {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        u_max: FT,
        advection_cfl: FT,
        criterion: AdvectionCriterion,
    ) -> Self {
        let smoothing_length = body.adaptation.reference_smoothing_length();
        let mut reference = u_max * u_max;
        if criterion == AdvectionCriterion::Standard {
            let viscous_speed = body.material.reference_viscosity() / body.reference_density() / smoothing_length;
            reference = FT::max(reference, viscous_speed * viscous_speed);
        }
        AdvectionTimeStepSize {
            advection_cfl,
            smoothing_length,
            reference,
        }
    }

    /// Uses the smoothing length of the finest particles. The viscous bound keeps the reference smoothing length.
    pub fn variable_smoothing_length<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        u_max: FT,
        advection_cfl: FT,
        criterion: AdvectionCriterion,
    ) -> Self {
        AdvectionTimeStepSize {
            smoothing_length: finest_smoothing_length(body),
            ..Self::new(body, u_max, advection_cfl, criterion)
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> ReduceDynamics<DU, D> for AdvectionTimeStepSize {
    fn name(&self) -> &'static str {
        "advection-time-step"
    }

    fn exec(&self, body: &FluidBody<DU, D>, context: &mut StepContext) -> FT {
        let reference = self.reference;
        let speed_squared_max = par_iter_reduce1(&body.particles.velocity, || reference, FT::max, |_, velocity| {
            velocity.norm_squared()
        });
        let speed_max = speed_squared_max.sqrt();
        context.set_speed_max(speed_max);
        self.advection_cfl * self.smoothing_length / (speed_max + TINY_REAL)
    }
}

#[cfg(test)]
fn two_particle_body_3d(mu: FT) -> FluidBody<crate::sph_kernels::DimensionUtils3d, 3> {
    use crate::{adaptation::SphAdaptation, materials::WeaklyCompressibleFluid, particles::ParticleVec, vec3f};

    let mut particles = ParticleVec::<3>::default(2);
    particles.position[1] = vec3f(0.5, 0., 0.);
    particles.mass = vec![1., 1.];
    particles.velocity[0] = vec3f(2., 0., 0.);
    // h = spacing * ratio = 1
    let adaptation = SphAdaptation::new(1., 1.);
    FluidBody::new(particles, WeaklyCompressibleFluid::new(1., 10., mu).into(), adaptation).unwrap()
}

#[test]
fn advection_time_step_of_two_particles() {
    for criterion in [AdvectionCriterion::Standard, AdvectionCriterion::ImplicitViscosity] {
        let body = two_particle_body_3d(1e-6);
        let mut context = StepContext::new();
        let dt = AdvectionTimeStepSize::new(&body, 0., 0.25, criterion).exec(&body, &mut context);
        assert_eq!(dt, 0.25 * 1.0 / (2. + TINY_REAL));
        assert_eq!(context.speed_max(), Ok(2.));
    }
}

#[test]
fn advection_seed_bounds_the_time_step() {
    let mut body = two_particle_body_3d(1e-2);
    body.particles.velocity[0] = crate::vec3f(0., 0., 0.);
    let mut context = StepContext::new();

    let implicit_viscosity = AdvectionTimeStepSize::new(&body, 0.5, 0.25, AdvectionCriterion::ImplicitViscosity);
    let dt = implicit_viscosity.exec(&body, &mut context);
    assert_eq!(dt, 0.25 / (0.5 + TINY_REAL));

    // the viscous speed mu / rho0 / h dominates a zero seed
    let dt = AdvectionTimeStepSize::new(&body, 0., 0.25, AdvectionCriterion::Standard).exec(&body, &mut context);
    crate::assert_ft_approx_eq(dt, 0.25 / 1e-2, 1e-9, || "viscous advection step".to_string());
    crate::assert_ft_approx_eq(context.speed_max().unwrap(), 1e-2, 1e-15, || "viscous speed".to_string());
}

#[test]
fn faster_particles_shorten_the_acoustic_time_step() {
    let mut body = two_particle_body_3d(1e-3);
    let acoustic = AcousticTimeStepSize::new(&body, 0.6);
    let mut context = StepContext::new();

    let dt_slow = acoustic.exec(&body, &mut context);
    assert_eq!(dt_slow, 0.6 * 1.0 / (10. + 2. + TINY_REAL));

    body.particles.velocity[0] *= 2.;
    let dt_fast = acoustic.exec(&body, &mut context);
    assert!(dt_fast < dt_slow);
    // acoustic controller does not touch the step context
    assert!(context.speed_max().is_err());
}

#[test]
fn variable_smoothing_length_uses_finest_resolution() {
    use crate::adaptation::{LocalRefinement, SphAdaptation};

    let mut body = two_particle_body_3d(1e-3);
    let dt_reference = AcousticTimeStepSize::new(&body, 0.6).exec(&body, &mut StepContext::new());
    let dt_advection_reference = AdvectionTimeStepSize::new(&body, 0., 0.25, AdvectionCriterion::Standard)
        .exec(&body, &mut StepContext::new());

    body.adaptation = SphAdaptation::new(1., 1.).with_local_refinement(LocalRefinement::new(vec![1., 2.]));
    let dt_refined = AcousticTimeStepSize::variable_smoothing_length(&body, 0.6).exec(&body, &mut StepContext::new());
    crate::assert_ft_approx_eq(dt_refined, 0.5 * dt_reference, 1e-12, || "refined acoustic step".to_string());

    let dt_advection_refined =
        AdvectionTimeStepSize::variable_smoothing_length(&body, 0., 0.25, AdvectionCriterion::Standard)
            .exec(&body, &mut StepContext::new());
    crate::assert_ft_approx_eq(dt_advection_refined, 0.5 * dt_advection_reference, 1e-12, || {
        "refined advection step".to_string()
    });
}
