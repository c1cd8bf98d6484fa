use crate::{
    floating_type_mod::FT,
    sph_kernels::{lattice_number_density, DimensionUtils},
};

/**
 * Per-particle resolution of a body whose particles carry different sizes.
 *
 * `h_ratio[i] = h_reference / h_i`, so refined particles have a ratio above one.
 */
#[derive(Debug, Clone)]
pub struct LocalRefinement {
    pub h_ratio: Vec<FT>,
}

impl LocalRefinement {
    pub fn new(h_ratio: Vec<FT>) -> Self {
        assert!(h_ratio.iter().all(|&r| r > 0.), "smoothing length ratios have to be positive");
        LocalRefinement { h_ratio }
    }

    pub fn finest_h_ratio(&self) -> FT {
        self.h_ratio.iter().cloned().fold(1., FT::max)
    }
}

/**
 * Kernel and resolution quantities of one body.
 */
pub struct SphAdaptation<DU: DimensionUtils<D>, const D: usize> {
    reference_smoothing_length: FT,
    reference_spacing: FT,
    minimum_spacing: FT,
    sigma0: FT,
    local_refinement: Option<LocalRefinement>,
    _dimension_utils: std::marker::PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> SphAdaptation<DU, D> {
    /// `smoothing_length_ratio` is h / spacing.
    pub fn new(reference_spacing: FT, smoothing_length_ratio: FT) -> Self {
        assert!(reference_spacing > 0.);
        assert!(smoothing_length_ratio > 0.);
        let reference_smoothing_length = reference_spacing * smoothing_length_ratio;
        SphAdaptation {
            reference_smoothing_length,
            reference_spacing,
            minimum_spacing: reference_spacing,
            sigma0: lattice_number_density::<DU, D>(reference_spacing, reference_smoothing_length),
            local_refinement: None,
            _dimension_utils: std::marker::PhantomData,
        }
    }

    /// Adds per-particle smoothing lengths. The minimum spacing follows the finest particle.
    pub fn with_local_refinement(mut self, local_refinement: LocalRefinement) -> Self {
        self.minimum_spacing = self.reference_spacing / local_refinement.finest_h_ratio();
        self.local_refinement = Some(local_refinement);
        self
    }

    pub fn reference_smoothing_length(&self) -> FT {
        self.reference_smoothing_length
    }

    pub fn reference_spacing(&self) -> FT {
        self.reference_spacing
    }

    pub fn minimum_spacing(&self) -> FT {
        self.minimum_spacing
    }

    /// Reference number density at the reference resolution.
    pub fn sigma0(&self) -> FT {
        self.sigma0
    }

    pub fn local_refinement(&self) -> Option<&LocalRefinement> {
        self.local_refinement.as_ref()
    }

    pub fn smoothing_length(&self, h_ratio: FT) -> FT {
        self.reference_smoothing_length / h_ratio
    }

    pub fn w0(&self, h_ratio: FT) -> FT {
        DU::w0(self.smoothing_length(h_ratio))
    }

    /// Kernel sum of a regular lattice refined by `h_ratio`.
    pub fn compute_reference_number_density(&self, h_ratio: FT) -> FT {
        lattice_number_density::<DU, D>(self.reference_spacing / h_ratio, self.smoothing_length(h_ratio))
    }

    /// Smoothing length of every particle.
    pub fn particle_smoothing_lengths(&self, num_particles: usize) -> Vec<FT> {
        match &self.local_refinement {
            Some(local_refinement) => {
                assert_eq!(local_refinement.h_ratio.len(), num_particles);
                local_refinement
                    .h_ratio
                    .iter()
                    .map(|&h_ratio| self.smoothing_length(h_ratio))
                    .collect()
            }
            None => vec![self.reference_smoothing_length; num_particles],
        }
    }
}

#[test]
fn test_refined_quantities_scale_with_dimension() {
    use crate::sph_kernels::DimensionUtils2d;

    let adaptation = SphAdaptation::<DimensionUtils2d, 2>::new(0.1, 1.3);
    crate::assert_ft_approx_eq(adaptation.reference_smoothing_length(), 0.13, 1e-12, || {
        "reference smoothing length".to_string()
    });
    crate::assert_ft_approx_eq(
        adaptation.compute_reference_number_density(1.),
        adaptation.sigma0(),
        1e-9,
        || "sigma0 at ratio 1".to_string(),
    );

    let sigma_refined = adaptation.compute_reference_number_density(2.);
    crate::assert_ft_approx_eq(sigma_refined, 4. * adaptation.sigma0(), 1e-6 * sigma_refined, || {
        "sigma0 at ratio 2".to_string()
    });
    crate::assert_ft_approx_eq(adaptation.w0(2.), 4. * adaptation.w0(1.), 1e-9, || "w0 at ratio 2".to_string());
}

#[test]
fn test_local_refinement_sets_minimum_spacing() {
    use crate::sph_kernels::DimensionUtils2d;

    let adaptation = SphAdaptation::<DimensionUtils2d, 2>::new(0.1, 1.3);
    assert!(adaptation.local_refinement().is_none());
    assert_eq!(adaptation.minimum_spacing(), adaptation.reference_spacing());

    let adaptation = adaptation.with_local_refinement(LocalRefinement::new(vec![1., 2., 1.5]));
    assert!(adaptation.local_refinement().is_some());
    crate::assert_ft_approx_eq(adaptation.minimum_spacing(), 0.05, 1e-12, || "minimum spacing".to_string());

    let h = adaptation.particle_smoothing_lengths(3);
    crate::assert_ft_approx_eq(h[1], 0.065, 1e-12, || "refined smoothing length".to_string());
}
