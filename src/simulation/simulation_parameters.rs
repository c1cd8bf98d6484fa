use crate::{
    body::SphError,
    floating_type_mod::FT,
    materials::{FluidMaterial, OldroydBFluid, WeaklyCompressibleFluid},
    VF,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    pub rest_density: FT,
    pub sound_speed: FT,
    pub viscosity: FT,
    pub fluid_model: FluidModel,

    pub particle_spacing: FT,
    // h / particle_spacing
    pub smoothing_length_ratio: FT,
    pub smoothing_length_model: SmoothingLengthModel,

    pub density_reinitialization: DensityReinitialization,
    pub viscosity_type: ViscosityType,
    pub riemann_solver: RiemannSolverType,

    // None disables the transport velocity correction
    pub transport_velocity_coefficient: Option<FT>,

    pub acoustic_cfl: FT,
    pub advection_cfl: FT,
    pub advection_criterion: AdvectionCriterion,
    // seed of the advection time step reduction
    pub u_max: FT,

    pub gravity: FT,
    pub compute_vorticity: bool,
    pub end_time: FT,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            rest_density: 1.,
            sound_speed: 10.,
            viscosity: 1e-2,
            fluid_model: FluidModel::Newtonian,
            particle_spacing: 0.02,
            smoothing_length_ratio: 1.3,
            smoothing_length_model: SmoothingLengthModel::Fixed,
            density_reinitialization: DensityReinitialization::Summation,
            viscosity_type: ViscosityType::Direct,
            riemann_solver: RiemannSolverType::Dissipative,
            transport_velocity_coefficient: Some(0.2),
            acoustic_cfl: 0.6,
            advection_cfl: 0.25,
            advection_criterion: AdvectionCriterion::Standard,
            u_max: 1.,
            gravity: 0.,
            compute_vorticity: true,
            end_time: 1.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FluidModel {
    Newtonian,
    OldroydB { polymeric_viscosity: FT, relaxation_time: FT },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingLengthModel {
    Fixed,
    // per-particle smoothing length from the scene's refinement ratios
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DensityReinitialization {
    // rho = rho_sum, for flows without free surface
    Summation,
    // keeps the previous density where the kernel summation is deficient
    FreeSurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViscosityType {
    Direct,
    // Monaghan 2005, more accurate for vortex dominated flows
    AngularConservative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiemannSolverType {
    NoRiemann,
    Dissipative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvectionCriterion {
    // seed additionally bounded by the viscous speed (mu / rho0 / h)
    Standard,
    ImplicitViscosity,
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), SphError> {
        let positive = [
            ("rest_density", self.rest_density),
            ("sound_speed", self.sound_speed),
            ("particle_spacing", self.particle_spacing),
            ("smoothing_length_ratio", self.smoothing_length_ratio),
            ("acoustic_cfl", self.acoustic_cfl),
            ("advection_cfl", self.advection_cfl),
        ];
        for (name, value) in positive {
            if !(value > 0.) {
                return Err(SphError::InvalidParameter(format!("{} has to be positive, got {}", name, value)));
            }
        }
        if self.viscosity < 0. || self.u_max < 0. {
            return Err(SphError::InvalidParameter(
                "viscosity and u_max must not be negative".to_string(),
            ));
        }
        if let FluidModel::OldroydB {
            polymeric_viscosity,
            relaxation_time,
        } = self.fluid_model
        {
            if !(relaxation_time > 0.) {
                return Err(SphError::InvalidParameter(format!(
                    "relaxation_time has to be positive, got {}",
                    relaxation_time
                )));
            }
            if polymeric_viscosity < 0. {
                return Err(SphError::InvalidParameter(format!(
                    "polymeric_viscosity must not be negative, got {}",
                    polymeric_viscosity
                )));
            }
        }
        Ok(())
    }

    pub fn material(&self) -> FluidMaterial {
        let solvent = WeaklyCompressibleFluid::new(self.rest_density, self.sound_speed, self.viscosity);
        match self.fluid_model {
            FluidModel::Newtonian => solvent.into(),
            FluidModel::OldroydB {
                polymeric_viscosity,
                relaxation_time,
            } => OldroydBFluid::new(solvent, polymeric_viscosity, relaxation_time).into(),
        }
    }

    pub fn gravity_vector<const D: usize>(&self) -> VF<D> {
        let mut data: [FT; D] = [0.; D];
        data[1] = self.gravity;
        VF::<D>::from_column_slice(&data)
    }
}

#[test]
fn default_parameters_are_valid() {
    assert_eq!(SimulationParams::default().validate(), Ok(()));
}

#[test]
fn validation_rejects_zero_relaxation_time() {
    let params = SimulationParams {
        fluid_model: FluidModel::OldroydB {
            polymeric_viscosity: 1.,
            relaxation_time: 0.,
        },
        ..SimulationParams::default()
    };
    assert!(matches!(params.validate(), Err(SphError::InvalidParameter(_))));

    let params = SimulationParams {
        rest_density: 0.,
        ..SimulationParams::default()
    };
    assert!(params.validate().is_err());
}

#[test]
fn parameters_parse_from_yaml() {
    use crate::materials::Fluid;

    let yaml = r#"
rest_density: 1.0
sound_speed: 10.0
viscosity: 0.01
fluid_model:
  OldroydB:
    polymeric_viscosity: 0.5
    relaxation_time: 0.2
particle_spacing: 0.02
smoothing_length_ratio: 1.3
smoothing_length_model: Fixed
density_reinitialization: FreeSurface
viscosity_type: AngularConservative
riemann_solver: Dissipative
transport_velocity_coefficient: 0.2
acoustic_cfl: 0.6
advection_cfl: 0.25
advection_criterion: Standard
u_max: 1.0
gravity: -1.0
compute_vorticity: true
end_time: 0.5
"#;
    let params: SimulationParams = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(params.validate(), Ok(()));
    assert_eq!(params.viscosity_type, ViscosityType::AngularConservative);
    assert!(params.material().as_oldroyd_b().is_some());
    assert_eq!(params.gravity_vector::<2>()[1], -1.);
}
