use crate::{
    body::{FluidBody, SphError},
    concurrency::par_iter_mut1,
    dynamics::{LocalDynamics, Phase, StepContext},
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    sph_kernels::DimensionUtils,
    VF,
};

/**
 * Shifts interior particles with a background pressure to keep the particle
 * distribution regular. Velocities are not changed.
 *
 * The background pressure follows the maximum speed of the current step, so
 * the advection time step has to run before the setup of this dynamics.
 */
pub struct TransportVelocityCorrection<const D: usize> {
    coefficient: FT,
    rho0: FT,
    p_background: FT,
    acc_trans: Vec<VF<D>>,
}

impl<const D: usize> TransportVelocityCorrection<D> {
    pub fn new<DU: DimensionUtils<D>>(body: &FluidBody<DU, D>, coefficient: FT) -> Self {
        TransportVelocityCorrection {
            coefficient,
            rho0: body.reference_density(),
            p_background: 0.,
            acc_trans: vec![VF::<D>::zeros(); body.num_particles()],
        }
    }

    pub fn background_pressure(&self) -> FT {
        self.p_background
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for TransportVelocityCorrection<D> {
    fn name(&self) -> &'static str {
        "transport-velocity-correction"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Setup, Phase::Interaction, Phase::Update]
    }

    fn setup_dynamics(&mut self, _body: &FluidBody<DU, D>, context: &StepContext, _dt: FT) -> Result<(), SphError> {
        let speed_max = context.speed_max()?;
        self.p_background = self.coefficient * self.rho0 * speed_max * speed_max;
        Ok(())
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let p_background = self.p_background;
        self.acc_trans.resize(body.num_particles(), VF::<D>::zeros());
        par_iter_mut1(&mut self.acc_trans, |i, p_acc_trans| {
            let mut acceleration_trans = VF::<D>::zeros();
            for record in neighs.iter(i) {
                acceleration_trans -= record.nabla_w_ij_v_j() * (2. * p_background);
            }
            *p_acc_trans = acceleration_trans;
        });
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, dt: FT) {
        let acc_trans = &self.acc_trans;
        let particles = &mut body.particles;
        let density = &particles.density;
        let surface_indicator = &particles.surface_indicator;
        par_iter_mut1(&mut particles.position, |i, p_position| {
            if surface_indicator[i] == 0 {
                *p_position += acc_trans[i] * (0.5 * dt * dt / density[i]);
            }
        });
    }
}

#[test]
fn surface_particles_are_not_shifted() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
        dynamics::exec_dynamics,
        vec2f,
    };

    let n = 6;
    let mut body = lattice_body_2d(n, 0.1, water());
    // break the lattice symmetry so that interior particles feel a net shift
    body.particles.position[n + 1] += vec2f(0.03, 0.02);
    let neighs = neighborhood_of(&body);
    let initial_positions = body.particles.position.clone();

    let mut context = StepContext::new();
    context.set_speed_max(1.);
    let mut correction = TransportVelocityCorrection::new(&body, 0.2);
    exec_dynamics(&mut correction, &mut body, &neighs, &context, 0.01).unwrap();
    crate::assert_ft_approx_eq(correction.background_pressure(), 0.2 * 1000., 1e-9, || {
        "background pressure".to_string()
    });

    let mut moved_interior = 0;
    for i in 0..body.num_particles() {
        if body.particles.surface_indicator[i] == 1 {
            assert_eq!(body.particles.position[i], initial_positions[i]);
        } else if body.particles.position[i] != initial_positions[i] {
            moved_interior += 1;
        }
    }
    assert!(moved_interior > 0);
}

#[test]
fn interior_shift_follows_background_pressure_gradient() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
        dynamics::exec_dynamics,
        vec2f,
    };

    let n = 6;
    let mut body = lattice_body_2d(n, 0.1, water());
    body.particles.position[n + 1] += vec2f(0.03, 0.02);
    let neighs = neighborhood_of(&body);
    let i = 2 * n + 2;
    assert_eq!(body.particles.surface_indicator[i], 0);
    let initial_position = body.particles.position[i];

    let mut context = StepContext::new();
    context.set_speed_max(1.);
    let dt = 0.01;
    let mut correction = TransportVelocityCorrection::new(&body, 0.2);
    exec_dynamics(&mut correction, &mut body, &neighs, &context, dt).unwrap();

    let p_background = 0.2 * 1000.;
    let kernel_gradient_sum = neighs.iter(i).fold(VF::<2>::zeros(), |sum, record| sum + record.nabla_w_ij_v_j());
    let expected_shift = -kernel_gradient_sum * (2. * p_background) * (0.5 * dt * dt / 1000.);
    assert!(expected_shift.norm() > 0.);

    let shift = body.particles.position[i] - initial_position;
    for k in 0..2 {
        approx::assert_relative_eq!(shift[k], expected_shift[k], epsilon = 1e-15, max_relative = 1e-9);
    }
}

#[test]
fn setup_fails_without_speed_max() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
        dynamics::exec_dynamics,
    };

    let mut body = lattice_body_2d(3, 0.1, water());
    let neighs = neighborhood_of(&body);
    let initial_positions = body.particles.position.clone();
    let mut correction = TransportVelocityCorrection::new(&body, 0.2);
    let result = exec_dynamics(&mut correction, &mut body, &neighs, &StepContext::new(), 0.01);
    assert_eq!(result, Err(SphError::MissingSpeedMax));
    assert_eq!(body.particles.position, initial_positions);
}
