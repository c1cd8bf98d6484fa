use crate::{
    body::FluidBody,
    concurrency::par_iter_mut1,
    dynamics::{LocalDynamics, Phase},
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    sph_kernels::DimensionUtils,
    V3,
};

/**
 * Vorticity diagnostic `sum_j (v_i - v_j) x e_ij * dW_ij V_j`. Registers the `vorticity`
 * output field on construction.
 */
pub struct Vorticity;

impl Vorticity {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(body: &mut FluidBody<DU, D>) -> Self {
        body.register_vorticity();
        Vorticity
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for Vorticity {
    fn name(&self) -> &'static str {
        "vorticity"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Interaction]
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let (particles, vorticity) = body.particles_and_vorticity_mut();
        let vorticity = vorticity.unwrap_or_else(|| panic!("vorticity field is not registered"));
        let velocity = &particles.velocity;

        par_iter_mut1(vorticity, |i, p_vorticity| {
            let mut w = V3::zeros();
            for record in neighs.iter(i) {
                w += DU::angular(velocity[i] - velocity[record.index()], record.e_ij) * record.dw_ij_v_j;
            }
            *p_vorticity = w;
        });
    }
}

#[test]
fn uniform_velocity_has_no_vorticity() {
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, uniform_velocity, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    let mut body = lattice_body_2d(6, 0.1, water());
    uniform_velocity(&mut body, vec2f(1.5, -0.5));
    let neighs = neighborhood_of(&body);
    let mut vorticity = Vorticity::new(&mut body);
    assert!(body.variables_to_write().contains(&"vorticity"));

    exec_dynamics(&mut vorticity, &mut body, &neighs, &StepContext::new(), 0.01).unwrap();
    for w in body.vorticity().unwrap() {
        assert_eq!(*w, V3::zeros());
    }
}

#[test]
fn rigid_rotation_has_uniform_vorticity() {
    use crate::{
        body::test_utils::{center_index, lattice_body_2d, neighborhood_of, water},
        dynamics::{exec_dynamics, StepContext},
        vec2f,
    };

    let n = 9;
    let mut body = lattice_body_2d(n, 0.1, water());
    let center = body.particles.position[center_index(n)];
    let omega = 2.;
    for i in 0..body.num_particles() {
        let r = body.particles.position[i] - center;
        body.particles.velocity[i] = vec2f(-omega * r.y, omega * r.x);
    }
    let neighs = neighborhood_of(&body);
    let mut vorticity = Vorticity::new(&mut body);
    exec_dynamics(&mut vorticity, &mut body, &neighs, &StepContext::new(), 0.01).unwrap();

    // the curl of a rigid rotation is twice its angular velocity
    let w = body.vorticity().unwrap()[center_index(n)];
    assert_eq!(w.x, 0.);
    assert_eq!(w.y, 0.);
    crate::assert_ft_approx_eq(w.z, 2. * omega, 0.05 * 2. * omega, || "vorticity of rigid rotation".to_string());
}
