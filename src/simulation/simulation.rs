use std::{
    collections::HashMap,
    fmt::{self, Display, Write},
    time::{Duration, Instant},
};

use log::{debug, info};
use num_traits::Float;

use crate::{
    body::{FluidBody, SphError},
    dynamics::{
        density_summation::DensitySummation,
        exec_dynamics,
        integration::{Integration1stHalf, Integration2ndHalf},
        oldroyd_b::{OldroydBIntegration1stHalf, OldroydBIntegration2ndHalf},
        time_step::{AcousticTimeStepSize, AdvectionTimeStepSize},
        transport_velocity::TransportVelocityCorrection,
        viscous_acceleration::ViscousAcceleration,
        vorticity::Vorticity,
        ReduceDynamics, StepContext,
    },
    floating_type_mod::FT,
    neighborhood::Neighborhood,
    scene::{build_fluid_body, SceneConfig},
    simulation_parameters::{SimulationParams, SmoothingLengthModel},
    sph_kernels::{DimensionUtils, DimensionUtils2d},
    VF,
};

#[derive(Clone)]
struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}

impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }

    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
}

impl Counter<FT> {
    fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }
    fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::max_value(), FT::min)
    }
    fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::min_value(), FT::max)
    }
}

impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    fn avg(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>() / self.values.len().max(1) as u32
    }

    fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}

impl ValueCounters {
    fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}

impl PerformanceCounters {
    fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    fn end(&mut self, id: &str) {
        if let Some(counter) = self.counters.get_mut(id) {
            counter.end();
        }
    }
}

/// Pressure-velocity half steps of the body's material.
enum PressureRelaxation {
    Newtonian(Integration1stHalf, Integration2ndHalf),
    OldroydB(OldroydBIntegration1stHalf, OldroydBIntegration2ndHalf),
}

impl PressureRelaxation {
    fn exec<DU: DimensionUtils<D>, const D: usize>(
        &mut self,
        body: &mut FluidBody<DU, D>,
        neighs: &Neighborhood<D>,
        context: &StepContext,
        dt: FT,
    ) -> Result<(), SphError> {
        match self {
            PressureRelaxation::Newtonian(first_half, second_half) => {
                exec_dynamics(first_half, body, neighs, context, dt)?;
                exec_dynamics(second_half, body, neighs, context, dt)
            }
            PressureRelaxation::OldroydB(first_half, second_half) => {
                exec_dynamics(first_half, body, neighs, context, dt)?;
                exec_dynamics(second_half, body, neighs, context, dt)
            }
        }
    }
}

/**
 * Dual time stepping of a single fluid body.
 *
 * Every advection step rebuilds the neighborhood and evaluates the non-pressure physics once.
 * Acoustic pressure relaxation sub-steps then run until they cover the advection step.
 */
pub struct FluidSimulation<DU: DimensionUtils<D>, const D: usize> {
    pub body: FluidBody<DU, D>,
    neighs: Neighborhood<D>,
    context: StepContext,
    gravity: VF<D>,

    advection_time_step: AdvectionTimeStepSize,
    acoustic_time_step: AcousticTimeStepSize,
    density_summation: DensitySummation,
    viscous_acceleration: ViscousAcceleration,
    transport_velocity: Option<TransportVelocityCorrection<D>>,
    pressure_relaxation: PressureRelaxation,
    vorticity: Option<Vorticity>,

    time: FT,
    step_number: usize,
    num_acoustic_steps: usize,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl<DU: DimensionUtils<D>, const D: usize> FluidSimulation<DU, D> {
    pub fn new(
        mut body: FluidBody<DU, D>,
        simulation_params: SimulationParams,
        counters_enabled: bool,
    ) -> Result<Self, SphError> {
        simulation_params.validate()?;

        let p = simulation_params;
        let (density_summation, advection_time_step, acoustic_time_step) = match p.smoothing_length_model {
            SmoothingLengthModel::Fixed => (
                DensitySummation::inner(&body, p.density_reinitialization),
                AdvectionTimeStepSize::new(&body, p.u_max, p.advection_cfl, p.advection_criterion),
                AcousticTimeStepSize::new(&body, p.acoustic_cfl),
            ),
            SmoothingLengthModel::Variable => (
                DensitySummation::variable_smoothing_length(&body, p.density_reinitialization)?,
                AdvectionTimeStepSize::variable_smoothing_length(
                    &body,
                    p.u_max,
                    p.advection_cfl,
                    p.advection_criterion,
                ),
                AcousticTimeStepSize::variable_smoothing_length(&body, p.acoustic_cfl),
            ),
        };

        let pressure_relaxation = if body.oldroyd_b().is_some() {
            PressureRelaxation::OldroydB(
                OldroydBIntegration1stHalf::new(&body, p.riemann_solver)?,
                OldroydBIntegration2ndHalf::new(&body, p.riemann_solver)?,
            )
        } else {
            PressureRelaxation::Newtonian(
                Integration1stHalf::new(&body, p.riemann_solver),
                Integration2ndHalf::new(&body, p.riemann_solver),
            )
        };

        let vorticity = if p.compute_vorticity {
            Some(Vorticity::new(&mut body))
        } else {
            None
        };

        info!(
            "simulation of {} particles with {:?} viscosity, {:?} density reinitialization, transport velocity: {:?}",
            body.num_particles(),
            p.viscosity_type,
            p.density_reinitialization,
            p.transport_velocity_coefficient
        );

        Ok(FluidSimulation {
            neighs: Neighborhood::new(body.num_particles()),
            context: StepContext::new(),
            gravity: p.gravity_vector::<D>(),
            advection_time_step,
            acoustic_time_step,
            density_summation,
            viscous_acceleration: ViscousAcceleration::new(&body, p.viscosity_type),
            transport_velocity: p
                .transport_velocity_coefficient
                .map(|coefficient| TransportVelocityCorrection::new(&body, coefficient)),
            pressure_relaxation,
            vorticity,
            body,
            time: 0.,
            step_number: 0,
            num_acoustic_steps: 0,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        })
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.body.num_particles()
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn num_acoustic_steps(&self) -> usize {
        self.num_acoustic_steps
    }

    pub fn neighborhood(&self) -> &Neighborhood<D> {
        &self.neighs
    }

    fn rebuild_neighborhood(&mut self) {
        let h = self.body.adaptation.particle_smoothing_lengths(self.body.num_particles());
        self.neighs.build_all_pairs::<DU>(&self.body.particles, &h);
    }

    fn check_particle_state(&self) -> Result<(), SphError> {
        let particles = &self.body.particles;
        for i in 0..particles.len() {
            if !particles.density[i].is_finite() || particles.density[i] <= 0. {
                return Err(SphError::InvalidParticles(format!(
                    "particle {} has density {} after step {}",
                    i, particles.density[i], self.step_number
                )));
            }
            if !particles.position[i].iter().all(|x| x.is_finite()) {
                return Err(SphError::InvalidParticles(format!(
                    "particle {} has non-finite position after step {}",
                    i, self.step_number
                )));
            }
        }
        Ok(())
    }

    /**
     * Advances the simulation by one advection step and returns its size.
     */
    pub fn single_step(&mut self) -> Result<FT, SphError> {
        debug!("begin step {} at time {}", self.step_number, self.time);

        self.vcounters
            .add_value("particle-count", self.body.num_particles() as FT);
        self.pcounters.begin("simulation-step");

        self.context.clear();

        self.pcounters.begin("neighborhood");
        self.rebuild_neighborhood();
        self.pcounters.end("neighborhood");

        let gravity = self.gravity;
        for acc_prior in self.body.particles.acc_prior.iter_mut() {
            *acc_prior = gravity;
        }

        let dt_advection = self.advection_time_step.exec(&self.body, &mut self.context);
        debug!(
            "{}: {} (speed max {:?})",
            ReduceDynamics::<DU, D>::name(&self.advection_time_step),
            dt_advection,
            self.context.speed_max().ok()
        );

        self.pcounters.begin("density-summation");
        exec_dynamics(
            &mut self.density_summation,
            &mut self.body,
            &self.neighs,
            &self.context,
            dt_advection,
        )?;
        self.pcounters.end("density-summation");

        self.pcounters.begin("non-pressure-forces");
        exec_dynamics(
            &mut self.viscous_acceleration,
            &mut self.body,
            &self.neighs,
            &self.context,
            dt_advection,
        )?;
        if let Some(transport_velocity) = &mut self.transport_velocity {
            exec_dynamics(transport_velocity, &mut self.body, &self.neighs, &self.context, dt_advection)?;
        }
        self.pcounters.end("non-pressure-forces");

        self.pcounters.begin("pressure-relaxation");
        let mut relaxation_time = 0.;
        let mut num_sub_steps = 0;
        while relaxation_time < dt_advection {
            let dt_acoustic = self.acoustic_time_step.exec(&self.body, &mut self.context);
            let dt = FT::min(dt_acoustic, dt_advection - relaxation_time);
            self.pressure_relaxation
                .exec(&mut self.body, &self.neighs, &self.context, dt)?;
            relaxation_time += dt;
            num_sub_steps += 1;
        }
        self.pcounters.end("pressure-relaxation");

        if let Some(vorticity) = &mut self.vorticity {
            self.pcounters.begin("vorticity");
            exec_dynamics(vorticity, &mut self.body, &self.neighs, &self.context, dt_advection)?;
            self.pcounters.end("vorticity");
        }

        self.time += dt_advection;
        self.step_number += 1;
        self.num_acoustic_steps += num_sub_steps;

        self.vcounters.add_value("advection-dt", dt_advection);
        self.vcounters.add_value("acoustic-sub-steps", num_sub_steps as FT);
        self.vcounters.add_value(
            "avg-neighbor-count",
            (0..self.neighs.len()).map(|i| self.neighs.neighbor_count(i)).sum::<usize>() as FT
                / self.neighs.len().max(1) as FT,
        );

        self.pcounters.end("simulation-step");

        debug!(
            "end step {}: {} acoustic sub-steps, time {}",
            self.step_number, num_sub_steps, self.time
        );

        self.check_particle_state()?;
        Ok(dt_advection)
    }

    /// Runs advection steps until `end_time` is reached.
    pub fn run_until(&mut self, end_time: FT) -> Result<(), SphError> {
        while self.time < end_time {
            self.single_step()?;
        }
        Ok(())
    }
}

pub fn init_fluid_sim(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    counters_enabled: bool,
) -> Result<FluidSimulation<DimensionUtils2d, 2>, SphError> {
    let body = build_fluid_body(&simulation_params, scene_config)?;
    FluidSimulation::new(body, simulation_params, counters_enabled)
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

/**
 * Summary of the performance and value counters. Empty when counters are disabled.
 */
pub fn write_statistics<DU: DimensionUtils<D>, const D: usize>(
    fluid_simulation: &FluidSimulation<DU, D>,
) -> Result<String, fmt::Error> {
    let mut s = String::new();

    let simulation_time = fluid_simulation
        .pcounters
        .counters
        .get("simulation-step")
        .map(|counter| counter.sum())
        .unwrap_or_default();

    writeln!(
        s,
        "steps: {} acoustic-steps: {} time: {}",
        fluid_simulation.step_number, fluid_simulation.num_acoustic_steps, fluid_simulation.time
    )?;
    writeln!(s, "simulation-time: {}ms", simulation_time.as_secs_f64() * 1000.)?;
    writeln!(s)?;

    let mut v = fluid_simulation.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.)?;
    }
    writeln!(s)?;

    let mut v = fluid_simulation.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        writeln!(
            s,
            "{}: min:{} max:{} avg:{}",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        )?;
    }

    Ok(s)
}

#[cfg(test)]
fn small_scene(velocity: [FT; 2]) -> SceneConfig {
    use crate::scene::SceneFluidBlock;

    SceneConfig {
        blocks: vec![SceneFluidBlock {
            pos: vec![0., 0.],
            size: vec![0.16, 0.16],
            velocity: velocity.to_vec(),
            h_ratio: 1.,
        }],
        taylor_green_amplitude: None,
        jitter: None,
    }
}

#[test]
fn newtonian_simulation_advances_in_time() {
    let params = SimulationParams::default();
    let mut simulation = init_fluid_sim(params, &small_scene([0.5, 0.]), true).unwrap();
    assert_eq!(simulation.num_fluid_particles(), 64);

    let mut elapsed = 0.;
    for _ in 0..3 {
        elapsed += simulation.single_step().unwrap();
    }
    assert_eq!(simulation.step_number(), 3);
    assert_ft_approx_eq(simulation.time(), elapsed, 1e-12, || "simulated time".to_string());
    // the acoustic criterion is stricter than the advection criterion
    assert!(simulation.num_acoustic_steps() > 3);
    assert!(simulation.body.vorticity().is_some());

    let statistics = write_statistics(&simulation).unwrap();
    assert!(statistics.contains("simulation-step"));
    assert!(statistics.contains("acoustic-sub-steps"));
}

#[test]
fn advection_step_follows_fastest_particle() {
    let params = SimulationParams {
        u_max: 0.,
        transport_velocity_coefficient: None,
        compute_vorticity: false,
        ..SimulationParams::default()
    };
    let mut simulation = init_fluid_sim(params, &small_scene([2., 0.]), false).unwrap();
    let dt = simulation.single_step().unwrap();
    let h = simulation.body.adaptation.reference_smoothing_length();
    assert_ft_approx_eq(dt, params.advection_cfl * h / 2., 1e-9, || "advection step".to_string());
    assert!(simulation.body.vorticity().is_none());
    assert_eq!(write_statistics(&simulation).unwrap().lines().count(), 4);
}

#[test]
fn viscoelastic_simulation_builds_up_stress() {
    use crate::simulation_parameters::FluidModel;

    let params = SimulationParams {
        fluid_model: FluidModel::OldroydB {
            polymeric_viscosity: 0.1,
            relaxation_time: 0.1,
        },
        ..SimulationParams::default()
    };
    let scene = SceneConfig {
        taylor_green_amplitude: Some(1.),
        ..small_scene([0., 0.])
    };
    let mut simulation = init_fluid_sim(params, &scene, false).unwrap();
    simulation.single_step().unwrap();

    let stress = simulation.body.viscoelastic().unwrap();
    assert!(stress.tau.iter().any(|tau| tau.norm() > 0.));
    assert!(stress.tau.iter().all(|tau| tau.iter().all(|x| x.is_finite())));
}

#[test]
fn variable_smoothing_length_simulation_runs() {
    use crate::scene::SceneFluidBlock;

    let params = SimulationParams {
        smoothing_length_model: SmoothingLengthModel::Variable,
        ..SimulationParams::default()
    };
    let mut scene = small_scene([0.2, 0.]);
    scene.blocks.push(SceneFluidBlock {
        pos: vec![0.2, 0.],
        size: vec![0.08, 0.08],
        velocity: vec![0.2, 0.],
        h_ratio: 2.,
    });
    let mut simulation = init_fluid_sim(params, &scene, false).unwrap();
    assert_eq!(simulation.num_fluid_particles(), 64 + 64);
    simulation.run_until(0.02).unwrap();
    assert!(simulation.time() >= 0.02);
}
