use crate::{
    body::{FluidBody, SphError},
    concurrency::{par_iter_mut1, par_iter_mut2},
    dynamics::{LocalDynamics, Phase},
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    simulation_parameters::DensityReinitialization,
    sph_kernels::DimensionUtils,
};

enum SummationKind {
    /// One smoothing length for the whole body.
    Inner { w0: FT, inv_sigma0: FT },
    /// Per-particle smoothing length. The normalization is recomputed every step.
    VariableSmoothingLength { inv_sigma0: Vec<FT> },
}

/**
 * Density from kernel summation: `rho_sum = (W0 + sum_j W_ij) * rho0 / sigma0`.
 */
pub struct DensitySummation {
    kind: SummationKind,
    reinitialization: DensityReinitialization,
    rho0: FT,
}

/// Combines the kernel summation with the density of the previous step.
pub fn reinitialized_density(policy: DensityReinitialization, rho_sum: FT, rho0: FT, rho_n: FT) -> FT {
    match policy {
        DensityReinitialization::Summation => rho_sum,
        DensityReinitialization::FreeSurface => rho_sum + FT::max(rho_n - rho_sum, 0.) * rho0 / rho_n,
    }
}

impl DensitySummation {
    pub fn inner<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        reinitialization: DensityReinitialization,
    ) -> Self {
        DensitySummation {
            kind: SummationKind::Inner {
                w0: body.adaptation.w0(1.),
                inv_sigma0: 1. / body.adaptation.sigma0(),
            },
            reinitialization,
            rho0: body.reference_density(),
        }
    }

    /// Fails if the body has no per-particle smoothing length.
    pub fn variable_smoothing_length<DU: DimensionUtils<D>, const D: usize>(
        body: &FluidBody<DU, D>,
        reinitialization: DensityReinitialization,
    ) -> Result<Self, SphError> {
        body.local_refinement().ok_or(SphError::MissingLocalRefinement)?;
        Ok(DensitySummation {
            kind: SummationKind::VariableSmoothingLength {
                inv_sigma0: vec![0.; body.num_particles()],
            },
            reinitialization,
            rho0: body.reference_density(),
        })
    }
}

impl<DU: DimensionUtils<D>, const D: usize> LocalDynamics<DU, D> for DensitySummation {
    fn name(&self) -> &'static str {
        "density-summation"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Interaction, Phase::Update]
    }

    fn interaction(&mut self, body: &mut FluidBody<DU, D>, neighs: &Neighborhood<D>, _dt: FT) {
        let rho0 = self.rho0;
        let adaptation = &body.adaptation;
        let particles = &mut body.particles;
        let mass = &particles.mass;

        match &mut self.kind {
            SummationKind::Inner { w0, inv_sigma0 } => {
                let (w0, inv_sigma0) = (*w0, *inv_sigma0);
                par_iter_mut1(&mut particles.density_sum, |i, p_density_sum| {
                    let sigma = w0 + neighs.iter(i).map(|record| record.w_ij).sum::<FT>();
                    *p_density_sum = sigma * rho0 * inv_sigma0;
                });
            }
            SummationKind::VariableSmoothingLength { inv_sigma0 } => {
                let local_refinement = adaptation
                    .local_refinement()
                    .unwrap_or_else(|| panic!("variable smoothing length density summation without local refinement"));
                let h_ratio = &local_refinement.h_ratio;
                inv_sigma0.resize(mass.len(), 0.);

                par_iter_mut2(
                    &mut particles.density_sum,
                    inv_sigma0,
                    |i, p_density_sum, p_inv_sigma0| {
                        *p_inv_sigma0 = 1. / adaptation.compute_reference_number_density(h_ratio[i]);

                        // neighbors of a different size contribute by their mass ratio
                        let mut sigma = adaptation.w0(h_ratio[i]);
                        for record in neighs.iter(i) {
                            sigma += record.w_ij * mass[record.index()] / mass[i];
                        }
                        *p_density_sum = sigma * rho0 * *p_inv_sigma0;
                    },
                );
            }
        }
    }

    fn update(&mut self, body: &mut FluidBody<DU, D>, _dt: FT) {
        let rho0 = self.rho0;
        let policy = self.reinitialization;
        let particles = &mut body.particles;
        let density_sum = &particles.density_sum;
        par_iter_mut1(&mut particles.density, |i, p_density| {
            *p_density = reinitialized_density(policy, density_sum[i], rho0, *p_density);
        });
    }
}

#[cfg(test)]
fn run_summation(
    summation: &mut DensitySummation,
    body: &mut FluidBody<crate::sph_kernels::DimensionUtils2d, 2>,
    neighs: &Neighborhood<2>,
) {
    crate::dynamics::exec_dynamics(summation, body, neighs, &crate::dynamics::StepContext::new(), 0.).unwrap();
}

#[test]
fn summation_recovers_reference_density_on_lattice() {
    use crate::body::test_utils::{center_index, lattice_body_2d, neighborhood_of, water};

    let mut body = lattice_body_2d(9, 0.1, water());
    let neighs = neighborhood_of(&body);
    let mut summation = DensitySummation::inner(&body, DensityReinitialization::Summation);
    run_summation(&mut summation, &mut body, &neighs);

    let i = center_index(9);
    crate::assert_ft_approx_eq(body.particles.density_sum[i], 1000., 1e-9 * 1000., || {
        "interior density sum".to_string()
    });
    assert_eq!(body.particles.density[i], body.particles.density_sum[i]);
    // the corner only sees one quadrant of the lattice
    assert!(body.particles.density_sum[0] < 0.7 * 1000.);
}

#[test]
fn isolated_particle_keeps_positive_density() {
    use crate::{
        adaptation::SphAdaptation, body::test_utils::water, particles::ParticleVec, sph_kernels::DimensionUtils2d,
    };

    let mut particles = ParticleVec::<2>::default(1);
    particles.mass[0] = 10.;
    let mut body =
        FluidBody::<DimensionUtils2d, 2>::new(particles, water(), SphAdaptation::new(0.1, 1.3)).unwrap();
    let neighs = Neighborhood::new(1);

    for policy in [DensityReinitialization::Summation, DensityReinitialization::FreeSurface] {
        let mut summation = DensitySummation::inner(&body, policy);
        run_summation(&mut summation, &mut body, &neighs);
        let expected = body.adaptation.w0(1.) * 1000. / body.adaptation.sigma0();
        crate::assert_ft_approx_eq(body.particles.density_sum[0], expected, 1e-9, || {
            "self contribution only".to_string()
        });
        assert!(body.particles.density[0] > 0.);
    }
}

#[test]
fn free_surface_reinitialization_keeps_deficient_density() {
    use crate::body::test_utils::{lattice_body_2d, neighborhood_of, water};

    let mut body = lattice_body_2d(5, 0.1, water());
    let neighs = neighborhood_of(&body);
    let mut summation = DensitySummation::inner(&body, DensityReinitialization::FreeSurface);
    run_summation(&mut summation, &mut body, &neighs);

    // the corner sum is deficient and the previous density was rho0
    assert!(body.particles.density_sum[0] < 1000.);
    crate::assert_ft_approx_eq(body.particles.density[0], 1000., 1e-9, || "corner density".to_string());

    assert_eq!(reinitialized_density(DensityReinitialization::FreeSurface, 1200., 1000., 1000.), 1200.);
    assert_eq!(reinitialized_density(DensityReinitialization::Summation, 800., 1000., 1000.), 800.);
}

#[test]
fn variable_smoothing_length_requires_local_refinement() {
    use crate::body::test_utils::{lattice_body_2d, water};

    let body = lattice_body_2d(3, 0.1, water());
    let result = DensitySummation::variable_smoothing_length(&body, DensityReinitialization::Summation);
    assert!(matches!(result, Err(SphError::MissingLocalRefinement)));
}

#[test]
fn variable_smoothing_length_matches_inner_at_uniform_resolution() {
    use crate::{
        adaptation::{LocalRefinement, SphAdaptation},
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
    };

    let n = 7;
    let mut body = lattice_body_2d(n, 0.1, water());
    let neighs = neighborhood_of(&body);
    let mut inner = DensitySummation::inner(&body, DensityReinitialization::Summation);
    run_summation(&mut inner, &mut body, &neighs);
    let reference = body.particles.density_sum.clone();

    body.adaptation = SphAdaptation::new(0.1, 1.3).with_local_refinement(LocalRefinement::new(vec![1.; n * n]));
    let mut variable =
        DensitySummation::variable_smoothing_length(&body, DensityReinitialization::Summation).unwrap();
    run_summation(&mut variable, &mut body, &neighs);

    for i in 0..n * n {
        crate::assert_ft_approx_eq(body.particles.density_sum[i], reference[i], 1e-9, || {
            format!("density sum of particle {}", i)
        });
    }
}

#[test]
fn variable_smoothing_length_weights_neighbors_by_mass_ratio() {
    use crate::{
        adaptation::{LocalRefinement, SphAdaptation},
        body::test_utils::{center_index, lattice_body_2d, neighborhood_of, water},
    };

    let n = 7;
    let mut body = lattice_body_2d(n, 0.1, water());
    body.adaptation = SphAdaptation::new(0.1, 1.3).with_local_refinement(LocalRefinement::new(vec![1.; n * n]));
    let neighs = neighborhood_of(&body);
    let mut variable =
        DensitySummation::variable_smoothing_length(&body, DensityReinitialization::Summation).unwrap();
    run_summation(&mut variable, &mut body, &neighs);

    let i = center_index(n);
    let before = body.particles.density_sum[i];
    let record = *neighs.iter(i).next().unwrap();
    body.particles.mass[record.index()] *= 3.;
    run_summation(&mut variable, &mut body, &neighs);

    let expected_increase = 2. * record.w_ij * 1000. / body.adaptation.compute_reference_number_density(1.);
    assert!(expected_increase > 0.);
    crate::assert_ft_approx_eq(body.particles.density_sum[i] - before, expected_increase, 1e-9, || {
        "density increase from a heavier neighbor".to_string()
    });
}
