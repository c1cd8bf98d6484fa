use std::fmt;

use log::info;

use crate::{
    adaptation::{LocalRefinement, SphAdaptation},
    floating_type_mod::FT,
    materials::{Fluid, FluidMaterial, OldroydBFluid},
    particles::{ParticleVec, ViscoelasticFields},
    sph_kernels::DimensionUtils,
    V3,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SphError {
    /// Variable smoothing length dynamics on a body without per-particle resolution.
    MissingLocalRefinement,
    /// Stress dynamics on a body whose particles carry no stress fields.
    MissingViscoelasticFields,
    /// Stress dynamics on a body whose material has no relaxation time.
    NotViscoelasticMaterial,
    /// Background pressure requested before the advection criterion ran in this step.
    MissingSpeedMax,
    InvalidParameter(String),
    InvalidParticles(String),
}

impl fmt::Display for SphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SphError::MissingLocalRefinement => {
                write!(f, "body does not support local refinement (no per-particle smoothing length)")
            }
            SphError::MissingViscoelasticFields => write!(f, "particles have no registered stress fields"),
            SphError::NotViscoelasticMaterial => write!(f, "fluid material is not an Oldroyd-B fluid"),
            SphError::MissingSpeedMax => {
                write!(f, "maximum speed of this step is unknown; run the advection time step first")
            }
            SphError::InvalidParameter(s) => write!(f, "invalid parameter: {}", s),
            SphError::InvalidParticles(s) => write!(f, "invalid particles: {}", s),
        }
    }
}

impl std::error::Error for SphError {}

/**
 * A cloud of fluid particles together with its material and resolution.
 */
pub struct FluidBody<DU: DimensionUtils<D>, const D: usize> {
    pub particles: ParticleVec<D>,
    pub material: FluidMaterial,
    pub adaptation: SphAdaptation<DU, D>,

    viscoelastic: Option<ViscoelasticFields<D>>,
    vorticity: Option<Vec<V3>>,
    variables_to_write: Vec<&'static str>,
}

impl<DU: DimensionUtils<D>, const D: usize> FluidBody<DU, D> {
    /**
     * Densities start at the reference density and pressures follow from the equation of state.
     * Stress fields are allocated for viscoelastic materials.
     */
    pub fn new(
        mut particles: ParticleVec<D>,
        material: FluidMaterial,
        adaptation: SphAdaptation<DU, D>,
    ) -> Result<Self, SphError> {
        let num_particles = particles.len();
        let rho0 = material.reference_density();
        if !(rho0 > 0.) {
            return Err(SphError::InvalidParameter(format!("reference density {} <= 0", rho0)));
        }
        if let Some(i) = particles.mass.iter().position(|&m| !(m > 0.)) {
            return Err(SphError::InvalidParticles(format!(
                "particle {} has non-positive mass {}",
                i, particles.mass[i]
            )));
        }
        if let Some(local_refinement) = adaptation.local_refinement() {
            if local_refinement.h_ratio.len() != num_particles {
                return Err(SphError::InvalidParticles(format!(
                    "{} smoothing length ratios for {} particles",
                    local_refinement.h_ratio.len(),
                    num_particles
                )));
            }
        }

        for i in 0..num_particles {
            if particles.density[i] <= 0. {
                particles.density[i] = rho0;
            }
            particles.density_sum[i] = particles.density[i];
            particles.pressure[i] = material.pressure(particles.density[i]);
        }

        let viscoelastic = material
            .as_oldroyd_b()
            .map(|_| ViscoelasticFields::<D>::default(num_particles));

        info!(
            "fluid body with {} particles (viscoelastic: {}, local refinement: {})",
            num_particles,
            viscoelastic.is_some(),
            adaptation.local_refinement().is_some()
        );

        Ok(FluidBody {
            particles,
            material,
            adaptation,
            viscoelastic,
            vorticity: None,
            variables_to_write: vec!["position", "velocity", "density", "pressure"],
        })
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn reference_density(&self) -> FT {
        self.material.reference_density()
    }

    pub fn local_refinement(&self) -> Option<&LocalRefinement> {
        self.adaptation.local_refinement()
    }

    pub fn oldroyd_b(&self) -> Option<&OldroydBFluid> {
        self.material.as_oldroyd_b()
    }

    pub fn viscoelastic(&self) -> Option<&ViscoelasticFields<D>> {
        self.viscoelastic.as_ref()
    }

    pub fn viscoelastic_mut(&mut self) -> Option<&mut ViscoelasticFields<D>> {
        self.viscoelastic.as_mut()
    }

    /// Split borrow of the particle arrays and the stress fields.
    pub fn particles_and_viscoelastic_mut(&mut self) -> (&mut ParticleVec<D>, Option<&mut ViscoelasticFields<D>>) {
        (&mut self.particles, self.viscoelastic.as_mut())
    }

    /// Allocates the vorticity diagnostic and lists it for output.
    pub fn register_vorticity(&mut self) {
        if self.vorticity.is_none() {
            self.vorticity = Some(vec![V3::zeros(); self.num_particles()]);
            self.register_variable_to_write("vorticity");
        }
    }

    pub fn vorticity(&self) -> Option<&[V3]> {
        self.vorticity.as_deref()
    }

    pub fn particles_and_vorticity_mut(&mut self) -> (&mut ParticleVec<D>, Option<&mut Vec<V3>>) {
        (&mut self.particles, self.vorticity.as_mut())
    }

    pub fn register_variable_to_write(&mut self, name: &'static str) {
        if !self.variables_to_write.contains(&name) {
            self.variables_to_write.push(name);
        }
    }

    pub fn variables_to_write(&self) -> &[&'static str] {
        &self.variables_to_write
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::{
        materials::WeaklyCompressibleFluid, neighborhood::Neighborhood, sph_kernels::DimensionUtils2d, vec2f, V2,
    };

    /// Square lattice of `n x n` particles with the given spacing. Outermost ring is flagged as surface.
    pub fn lattice_body_2d(n: usize, spacing: FT, material: FluidMaterial) -> FluidBody<DimensionUtils2d, 2> {
        let rho0 = material.reference_density();
        let mut particles = ParticleVec::<2>::default(n * n);
        for y in 0..n {
            for x in 0..n {
                let i = y * n + x;
                particles.position[i] = vec2f(x as FT * spacing, y as FT * spacing);
                particles.mass[i] = rho0 * spacing * spacing;
                particles.density[i] = rho0;
                let on_border = x == 0 || y == 0 || x == n - 1 || y == n - 1;
                particles.surface_indicator[i] = if on_border { 1 } else { 0 };
            }
        }
        let adaptation = SphAdaptation::new(spacing, 1.3);
        FluidBody::new(particles, material, adaptation).unwrap()
    }

    pub fn water() -> FluidMaterial {
        WeaklyCompressibleFluid::new(1000., 10., 1e-3).into()
    }

    pub fn neighborhood_of(body: &FluidBody<DimensionUtils2d, 2>) -> Neighborhood<2> {
        let mut neighs = Neighborhood::new(body.num_particles());
        let h = body.adaptation.particle_smoothing_lengths(body.num_particles());
        neighs.build_all_pairs::<DimensionUtils2d>(&body.particles, &h);
        neighs
    }

    pub fn center_index(n: usize) -> usize {
        (n / 2) * n + n / 2
    }

    pub fn uniform_velocity(body: &mut FluidBody<DimensionUtils2d, 2>, v: V2) {
        for vel in body.particles.velocity.iter_mut() {
            *vel = v;
        }
    }
}

#[test]
fn body_allocates_stress_only_for_viscoelastic_material() {
    use crate::materials::WeaklyCompressibleFluid;

    let solvent = WeaklyCompressibleFluid::new(1., 10., 0.01);
    let body = test_utils::lattice_body_2d(4, 0.1, solvent.into());
    assert!(body.viscoelastic().is_none());
    assert_eq!(body.particles.pressure[0], 0.);

    let body = test_utils::lattice_body_2d(4, 0.1, OldroydBFluid::new(solvent, 1., 1.).into());
    assert_eq!(body.viscoelastic().map(|v| v.len()), Some(16));
}

#[test]
fn body_rejects_non_positive_mass() {
    use crate::{materials::WeaklyCompressibleFluid, sph_kernels::DimensionUtils2d};

    let mut particles = ParticleVec::<2>::default(2);
    particles.mass[0] = 1.;
    let result = FluidBody::<DimensionUtils2d, 2>::new(
        particles,
        WeaklyCompressibleFluid::new(1., 10., 0.).into(),
        SphAdaptation::new(0.1, 1.3),
    );
    assert!(matches!(result, Err(SphError::InvalidParticles(_))));
}

#[test]
fn vorticity_registration_is_idempotent() {
    let mut body = test_utils::lattice_body_2d(3, 0.1, test_utils::water());
    assert!(body.vorticity().is_none());
    body.register_vorticity();
    body.register_vorticity();
    assert_eq!(body.vorticity().map(|w| w.len()), Some(9));
    assert_eq!(body.variables_to_write().iter().filter(|&&n| n == "vorticity").count(), 1);
}
