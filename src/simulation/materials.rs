use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::floating_type_mod::FT;

/**
 * Numeric quantities a fluid exposes to the particle dynamics.
 */
#[enum_dispatch]
pub trait Fluid {
    fn reference_density(&self) -> FT;
    fn reference_sound_speed(&self) -> FT;
    fn reference_viscosity(&self) -> FT;

    /// Equation of state
    fn pressure(&self, density: FT) -> FT;
    fn sound_speed(&self, pressure: FT, density: FT) -> FT;

    /// Viscoelastic parameters, if the fluid has any.
    fn as_oldroyd_b(&self) -> Option<&OldroydBFluid> {
        None
    }
}

/**
 * Weakly compressible fluid with the linear equation of state p = c0^2 (rho - rho0).
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaklyCompressibleFluid {
    pub rho0: FT,
    pub c0: FT,
    pub mu: FT,
}

impl WeaklyCompressibleFluid {
    pub fn new(rho0: FT, c0: FT, mu: FT) -> Self {
        WeaklyCompressibleFluid { rho0, c0, mu }
    }
}

impl Fluid for WeaklyCompressibleFluid {
    fn reference_density(&self) -> FT {
        self.rho0
    }

    fn reference_sound_speed(&self) -> FT {
        self.c0
    }

    fn reference_viscosity(&self) -> FT {
        self.mu
    }

    fn pressure(&self, density: FT) -> FT {
        self.c0 * self.c0 * (density - self.rho0)
    }

    fn sound_speed(&self, _pressure: FT, _density: FT) -> FT {
        self.c0
    }
}

/**
 * Oldroyd-B fluid: a weakly compressible solvent carrying a polymeric stress
 * that relaxes with time constant `lambda`.
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OldroydBFluid {
    pub solvent: WeaklyCompressibleFluid,
    pub mu_p: FT,
    pub lambda: FT,
}

impl OldroydBFluid {
    pub fn new(solvent: WeaklyCompressibleFluid, mu_p: FT, lambda: FT) -> Self {
        OldroydBFluid { solvent, mu_p, lambda }
    }

    pub fn reference_polymeric_viscosity(&self) -> FT {
        self.mu_p
    }

    pub fn reference_relaxation_time(&self) -> FT {
        self.lambda
    }
}

impl Fluid for OldroydBFluid {
    fn reference_density(&self) -> FT {
        self.solvent.reference_density()
    }

    fn reference_sound_speed(&self) -> FT {
        self.solvent.reference_sound_speed()
    }

    fn reference_viscosity(&self) -> FT {
        self.solvent.reference_viscosity()
    }

    fn pressure(&self, density: FT) -> FT {
        self.solvent.pressure(density)
    }

    fn sound_speed(&self, pressure: FT, density: FT) -> FT {
        self.solvent.sound_speed(pressure, density)
    }

    fn as_oldroyd_b(&self) -> Option<&OldroydBFluid> {
        Some(self)
    }
}

#[enum_dispatch(Fluid)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FluidMaterial {
    WeaklyCompressibleFluid(WeaklyCompressibleFluid),
    OldroydBFluid(OldroydBFluid),
}

#[test]
fn linear_equation_of_state() {
    let fluid = WeaklyCompressibleFluid::new(1000., 10., 0.001);
    assert_eq!(fluid.pressure(1000.), 0.);
    assert_eq!(fluid.pressure(1001.), 100.);
    crate::assert_ft_approx_eq(fluid.pressure(998.), -200., 1e-9, || "pressure below rest density".to_string());
}

#[test]
fn only_oldroyd_b_exposes_viscoelastic_parameters() {
    let solvent = WeaklyCompressibleFluid::new(1., 10., 0.01);
    let newtonian: FluidMaterial = solvent.into();
    assert!(newtonian.as_oldroyd_b().is_none());

    let viscoelastic: FluidMaterial = OldroydBFluid::new(solvent, 0.5, 2.).into();
    let oldroyd_b = viscoelastic.as_oldroyd_b().unwrap();
    assert_eq!(oldroyd_b.reference_polymeric_viscosity(), 0.5);
    assert_eq!(oldroyd_b.reference_relaxation_time(), 2.);
    assert_eq!(viscoelastic.reference_viscosity(), 0.01);
}
