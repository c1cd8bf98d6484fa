/*!
Per-particle dynamics of a fluid body.

Every dynamics object runs through the same phase contract: a global `Setup`
that may read body-wide quantities, then per-particle `Initialization`,
`Interaction` and `Update`. Within one phase a particle only writes its own slots
and only reads values as they stood when the phase started, so each phase is a
single parallel loop and the phase boundaries act as barriers.
*/

pub mod density_summation;
pub mod integration;
pub mod oldroyd_b;
pub mod time_step;
pub mod transport_velocity;
pub mod viscous_acceleration;
pub mod vorticity;

use log::trace;

use crate::{
    body::{FluidBody, SphError},
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    sph_kernels::DimensionUtils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Setup,
    Initialization,
    Interaction,
    Update,
}

impl Phase {
    pub fn as_str_lowercase(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Initialization => "initialization",
            Phase::Interaction => "interaction",
            Phase::Update => "update",
        }
    }
}

/**
 * Values produced by one dynamics object during a step and consumed by another one.
 *
 * The driver owns the context and clears it at the start of every advection step.
 */
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    speed_max: Option<FT>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.speed_max = None;
    }

    pub fn set_speed_max(&mut self, speed_max: FT) {
        self.speed_max = Some(speed_max);
    }

    /// Maximum particle speed of this step, written by the advection time step controller.
    pub fn speed_max(&self) -> Result<FT, SphError> {
        self.speed_max.ok_or(SphError::MissingSpeedMax)
    }
}

/**
 * A particle dynamics with up to four phases. Phases that are not listed in
 * `phases()` are never invoked and default to no-ops.
 */
pub trait LocalDynamics<DU: DimensionUtils<D>, const D: usize> {
    fn name(&self) -> &'static str;

    /// Implemented phases in execution order.
    fn phases(&self) -> &'static [Phase];

    fn setup_dynamics(&mut self, _body: &FluidBody<DU, D>, _context: &StepContext, _dt: FT) -> Result<(), SphError> {
        Ok(())
    }

    fn initialization(&mut self, _body: &mut FluidBody<DU, D>, _dt: FT) {}

    fn interaction(&mut self, _body: &mut FluidBody<DU, D>, _neighs: &Neighborhood<D>, _dt: FT) {}

    fn update(&mut self, _body: &mut FluidBody<DU, D>, _dt: FT) {}
}

/**
 * A dynamics that folds one value per particle into a single body-wide result.
 */
pub trait ReduceDynamics<DU: DimensionUtils<D>, const D: usize> {
    fn name(&self) -> &'static str;

    fn exec(&self, body: &FluidBody<DU, D>, context: &mut StepContext) -> FT;
}

/// Runs the phases a dynamics implements, each one to completion before the next.
pub fn exec_dynamics<DU: DimensionUtils<D>, L: LocalDynamics<DU, D> + ?Sized, const D: usize>(
    dynamics: &mut L,
    body: &mut FluidBody<DU, D>,
    neighs: &Neighborhood<D>,
    context: &StepContext,
    dt: FT,
) -> Result<(), SphError> {
    for &phase in dynamics.phases() {
        trace!("{}: {}", dynamics.name(), phase.as_str_lowercase());
        match phase {
            Phase::Setup => dynamics.setup_dynamics(body, context, dt)?,
            Phase::Initialization => dynamics.initialization(body, dt),
            Phase::Interaction => dynamics.interaction(body, neighs, dt),
            Phase::Update => dynamics.update(body, dt),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::test_utils::{lattice_body_2d, neighborhood_of, water},
        sph_kernels::DimensionUtils2d,
    };

    struct Recorder {
        calls: Vec<Phase>,
    }

    impl LocalDynamics<DimensionUtils2d, 2> for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn phases(&self) -> &'static [Phase] {
            &[Phase::Setup, Phase::Interaction]
        }

        fn setup_dynamics(&mut self, _: &FluidBody<DimensionUtils2d, 2>, _: &StepContext, _: FT) -> Result<(), SphError> {
            self.calls.push(Phase::Setup);
            Ok(())
        }

        fn initialization(&mut self, _: &mut FluidBody<DimensionUtils2d, 2>, _: FT) {
            self.calls.push(Phase::Initialization);
        }

        fn interaction(&mut self, _: &mut FluidBody<DimensionUtils2d, 2>, _: &Neighborhood<2>, _: FT) {
            self.calls.push(Phase::Interaction);
        }
    }

    #[test]
    fn only_listed_phases_run_in_order() {
        let mut body = lattice_body_2d(3, 0.1, water());
        let neighs = neighborhood_of(&body);
        let mut recorder = Recorder { calls: Vec::new() };
        exec_dynamics(&mut recorder, &mut body, &neighs, &StepContext::new(), 0.1).unwrap();
        assert_eq!(recorder.calls, vec![Phase::Setup, Phase::Interaction]);
    }

    #[test]
    fn speed_max_has_to_be_written_before_it_is_read() {
        let mut context = StepContext::new();
        assert_eq!(context.speed_max(), Err(SphError::MissingSpeedMax));
        context.set_speed_max(2.);
        assert_eq!(context.speed_max(), Ok(2.));
        context.clear();
        assert!(context.speed_max().is_err());
    }
}
