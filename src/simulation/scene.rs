use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    adaptation::{LocalRefinement, SphAdaptation},
    body::{FluidBody, SphError},
    floating_type_mod::{FT, TAU},
    materials::Fluid,
    particles::ParticleVec,
    simulation_parameters::{SimulationParams, SmoothingLengthModel},
    sph_kernels::DimensionUtils2d,
    vec2f, V2,
};

fn default_h_ratio() -> FT {
    1.
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub pos: Vec<FT>,
    pub size: Vec<FT>,
    pub velocity: Vec<FT>,
    // reference smoothing length / local smoothing length
    #[serde(default = "default_h_ratio")]
    pub h_ratio: FT,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SceneJitter {
    // maximal displacement per axis as a fraction of the local spacing
    pub amplitude: FT,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub blocks: Vec<SceneFluidBlock>,
    // Taylor-Green vortex over the bounding box of all blocks, replaces block velocities
    #[serde(default)]
    pub taylor_green_amplitude: Option<FT>,
    #[serde(default)]
    pub jitter: Option<SceneJitter>,
}

fn vec2_from_config(v: &[FT], name: &str) -> Result<V2, SphError> {
    match v {
        [x, y] => Ok(vec2f(*x, *y)),
        _ => Err(SphError::InvalidParameter(format!(
            "{} needs 2 components, got {}",
            name,
            v.len()
        ))),
    }
}

/// Lattice particles of one block. The outermost ring of the block is flagged as surface.
fn add_fluid_block(
    block: &SceneFluidBlock,
    spacing: FT,
    rest_density: FT,
    particles: &mut ParticleVec<2>,
    h_ratio: &mut Vec<FT>,
) -> Result<(), SphError> {
    let min = vec2_from_config(&block.pos, "block pos")?;
    let size = vec2_from_config(&block.size, "block size")?;
    let velocity = vec2_from_config(&block.velocity, "block velocity")?;
    if !(block.h_ratio > 0.) {
        return Err(SphError::InvalidParameter(format!("block h_ratio {} <= 0", block.h_ratio)));
    }

    let spacing = spacing / block.h_ratio;
    let particle_mass = spacing * spacing * rest_density;

    let num_particles_x = (size.x / spacing).floor() as usize;
    let num_particles_y = (size.y / spacing).floor() as usize;
    if num_particles_x == 0 || num_particles_y == 0 {
        return Err(SphError::InvalidParameter(format!(
            "block of size {}x{} is smaller than its particle spacing {}",
            size.x, size.y, spacing
        )));
    }

    for x in 0..num_particles_x {
        for y in 0..num_particles_y {
            let on_border = x == 0 || y == 0 || x == num_particles_x - 1 || y == num_particles_y - 1;
            particles.position.push(vec2f(x as FT * spacing + min.x, y as FT * spacing + min.y));
            particles.velocity.push(velocity);
            particles.mass.push(particle_mass);
            particles.surface_indicator.push(if on_border { 1 } else { 0 });
            h_ratio.push(block.h_ratio);
        }
    }
    Ok(())
}

fn apply_taylor_green_velocity(particles: &mut ParticleVec<2>, amplitude: FT) {
    let (min, max) = particles.position.iter().fold(
        (vec2f(FT::INFINITY, FT::INFINITY), vec2f(FT::NEG_INFINITY, FT::NEG_INFINITY)),
        |(min, max), p| (min.inf(p), max.sup(p)),
    );
    let extent = max - min;
    for (position, velocity) in particles.position.iter().zip(particles.velocity.iter_mut()) {
        let x = TAU * (position.x - min.x) / extent.x;
        let y = TAU * (position.y - min.y) / extent.y;
        *velocity = vec2f(-amplitude * x.cos() * y.sin(), amplitude * x.sin() * y.cos());
    }
}

/**
 * Creates the fluid body of a scene. Block spacing is the reference particle spacing
 * divided by the block's smoothing length ratio.
 */
pub fn build_fluid_body(
    simulation_params: &SimulationParams,
    scene_config: &SceneConfig,
) -> Result<FluidBody<DimensionUtils2d, 2>, SphError> {
    simulation_params.validate()?;
    let material = simulation_params.material();
    let rest_density = material.reference_density();

    let mut particles = ParticleVec::<2>::default(0);
    let mut h_ratio = Vec::new();
    for block in &scene_config.blocks {
        add_fluid_block(
            block,
            simulation_params.particle_spacing,
            rest_density,
            &mut particles,
            &mut h_ratio,
        )?;
    }
    // the block loop pushes all other fields
    particles.density = vec![rest_density; particles.mass.len()];
    particles.density_sum = vec![rest_density; particles.mass.len()];
    particles.drho_dt = vec![0.; particles.mass.len()];
    particles.pressure = vec![0.; particles.mass.len()];
    particles.acc_prior = vec![V2::zeros(); particles.mass.len()];
    particles.acc = vec![V2::zeros(); particles.mass.len()];

    if particles.is_empty() {
        return Err(SphError::InvalidParticles("scene contains no particles".to_string()));
    }

    if let Some(amplitude) = scene_config.taylor_green_amplitude {
        apply_taylor_green_velocity(&mut particles, amplitude);
    }

    if let Some(jitter) = scene_config.jitter {
        let mut rng = StdRng::seed_from_u64(jitter.seed);
        for (position, ratio) in particles.position.iter_mut().zip(h_ratio.iter()) {
            let max_offset = jitter.amplitude * simulation_params.particle_spacing / ratio;
            if max_offset > 0. {
                *position += vec2f(
                    rng.gen_range(-max_offset..max_offset),
                    rng.gen_range(-max_offset..max_offset),
                );
            }
        }
    }

    let mut adaptation =
        SphAdaptation::new(simulation_params.particle_spacing, simulation_params.smoothing_length_ratio);
    match simulation_params.smoothing_length_model {
        SmoothingLengthModel::Variable => {
            adaptation = adaptation.with_local_refinement(LocalRefinement::new(h_ratio));
        }
        SmoothingLengthModel::Fixed => {
            if let Some(ratio) = h_ratio.iter().find(|&&ratio| ratio != 1.) {
                return Err(SphError::InvalidParameter(format!(
                    "block h_ratio {} needs the variable smoothing length model",
                    ratio
                )));
            }
        }
    }

    info!(
        "scene with {} blocks and {} particles",
        scene_config.blocks.len(),
        particles.len()
    );

    FluidBody::new(particles, material, adaptation)
}

#[cfg(test)]
fn single_block_scene(h_ratio: FT) -> SceneConfig {
    SceneConfig {
        blocks: vec![SceneFluidBlock {
            pos: vec![0., 0.],
            size: vec![0.2, 0.1],
            velocity: vec![1., 0.],
            h_ratio,
        }],
        taylor_green_amplitude: None,
        jitter: None,
    }
}

#[test]
fn block_is_filled_with_lattice_particles() {
    let params = SimulationParams {
        particle_spacing: 0.02,
        ..SimulationParams::default()
    };
    let body = build_fluid_body(&params, &single_block_scene(1.)).unwrap();

    assert_eq!(body.num_particles(), 10 * 5);
    assert!(body.local_refinement().is_none());
    for i in 0..body.num_particles() {
        approx::assert_relative_eq!(body.particles.mass[i], 0.02 * 0.02 * params.rest_density);
        assert_eq!(body.particles.velocity[i], vec2f(1., 0.));
    }
    // 10x5 block has 8x3 interior particles
    let interior = body.particles.surface_indicator.iter().filter(|&&s| s == 0).count();
    assert_eq!(interior, 8 * 3);
}

#[test]
fn refined_blocks_need_variable_smoothing_length() {
    let params = SimulationParams {
        particle_spacing: 0.02,
        ..SimulationParams::default()
    };
    assert!(matches!(
        build_fluid_body(&params, &single_block_scene(2.)),
        Err(SphError::InvalidParameter(_))
    ));

    let params = SimulationParams {
        smoothing_length_model: SmoothingLengthModel::Variable,
        ..params
    };
    let body = build_fluid_body(&params, &single_block_scene(2.)).unwrap();
    assert_eq!(body.num_particles(), 20 * 10);
    approx::assert_relative_eq!(body.adaptation.minimum_spacing(), 0.01);
    assert_eq!(body.local_refinement().map(|r| r.h_ratio.len()), Some(200));
}

#[test]
fn jitter_is_deterministic() {
    let params = SimulationParams::default();
    let mut scene = single_block_scene(1.);
    scene.jitter = Some(SceneJitter {
        amplitude: 0.1,
        seed: 42,
    });

    let a = build_fluid_body(&params, &scene).unwrap();
    let b = build_fluid_body(&params, &scene).unwrap();
    let lattice = build_fluid_body(&params, &single_block_scene(1.)).unwrap();
    assert_eq!(a.particles.position, b.particles.position);
    assert_ne!(a.particles.position, lattice.particles.position);
    for (p, q) in a.particles.position.iter().zip(lattice.particles.position.iter()) {
        assert!((p - q).amax() <= 0.1 * params.particle_spacing);
    }
}

#[test]
fn taylor_green_velocity_replaces_block_velocity() {
    let params = SimulationParams::default();
    let mut scene = single_block_scene(1.);
    scene.taylor_green_amplitude = Some(1.);
    let body = build_fluid_body(&params, &scene).unwrap();

    // the lower left corner sits at the origin of the vortex
    let v = body.particles.velocity[0];
    assert_eq!(v, vec2f(0., 0.));
    assert!(body.particles.velocity.iter().any(|v| v.norm() > 0.5));
}

#[test]
fn scene_parses_from_yaml() {
    let yaml = r#"
blocks:
  - pos: [0.0, 0.0]
    size: [1.0, 0.5]
    velocity: [0.0, 0.0]
  - pos: [1.0, 0.0]
    size: [0.2, 0.2]
    velocity: [0.0, 0.0]
    h_ratio: 2.0
jitter:
  amplitude: 0.05
  seed: 7
"#;
    let scene: SceneConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(scene.blocks.len(), 2);
    assert_eq!(scene.blocks[0].h_ratio, 1.);
    assert_eq!(scene.blocks[1].h_ratio, 2.);
    assert!(scene.taylor_green_amplitude.is_none());
    assert_eq!(scene.jitter.map(|j| j.seed), Some(7));

    assert!(vec2_from_config(&[1.], "pos").is_err());
}
