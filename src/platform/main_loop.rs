use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{info, warn};

use crate::{
    floating_type_mod::FT, init_fluid_sim, scene::SceneConfig, simulation_parameters::SimulationParams,
    sph_kernels::DimensionUtils2d, write_statistics, FluidSimulation,
};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn app() -> App<'static, 'static> {
    App::new("SPH Fluid Dynamics")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite config"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
}

fn init_logger(verbosity: u64) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // a second initialization only happens in tests
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Replaces top level keys of `params` by the keys of `overwrite`. Unknown keys are an error.
pub fn merge_config_overwrite(params: &mut serde_yaml::Value, overwrite: serde_yaml::Value) -> anyhow::Result<()> {
    let mapping = params
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("simulation parameters are not a mapping"))?;
    let overwrite = match overwrite {
        serde_yaml::Value::Mapping(overwrite) => overwrite,
        serde_yaml::Value::Null => return Ok(()),
        _ => return Err(anyhow!("overwrite config is not a mapping")),
    };
    for (k, v) in overwrite {
        let entry = mapping
            .get_mut(&k)
            .ok_or_else(|| anyhow!("not able to find attribute {:?}", k))?;
        *entry = v;
    }
    Ok(())
}

fn load_simulation_params(path: &str, overwrite_path: Option<&str>) -> anyhow::Result<SimulationParams> {
    let params_yaml = std::fs::read_to_string(path).with_context(|| format!("failed reading parameter file {}", path))?;
    let mut simulation_params_serde: serde_yaml::Value =
        serde_yaml::from_str(&params_yaml).context("failed parsing simulation config file")?;

    if let Some(overwrite_path) = overwrite_path {
        let overwrite_yaml = std::fs::read_to_string(overwrite_path)
            .with_context(|| format!("failed reading overwrite file {}", overwrite_path))?;
        let overwrite: serde_yaml::Value =
            serde_yaml::from_str(&overwrite_yaml).context("failed parsing overwrite config file")?;
        merge_config_overwrite(&mut simulation_params_serde, overwrite)?;
    }

    let simulation_params: SimulationParams =
        serde_yaml::from_value(simulation_params_serde).context("failed to unpack SimulationParams")?;
    simulation_params.validate()?;
    Ok(simulation_params)
}

fn load_scene_config(path: &str) -> anyhow::Result<SceneConfig> {
    let scene_yaml = std::fs::read_to_string(path).with_context(|| format!("failed reading scene file {}", path))?;
    Ok(serde_yaml::from_str(&scene_yaml).context("failed parsing scene config file")?)
}

fn fluid_main(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    max_seconds: Option<FT>,
    counters_enabled: bool,
) -> anyhow::Result<FluidSimulation<DimensionUtils2d, 2>> {
    let mut fluid_simulation = init_fluid_sim(simulation_params, scene_config, counters_enabled)?;

    let end_time = match max_seconds {
        Some(max_seconds) => FT::min(max_seconds, simulation_params.end_time),
        None => simulation_params.end_time,
    };

    let mut total_duration = Duration::from_nanos(0);
    let mut total_number_of_steps = 0;

    while fluid_simulation.time() < end_time {
        let a = Instant::now();
        let dt = fluid_simulation
            .single_step()
            .with_context(|| format!("simulation failed at time {}", fluid_simulation.time()))?;
        let b = Instant::now();

        total_duration += b - a;
        total_number_of_steps += 1;

        info!(
            "{:05}: {} fluid particles dt {} time {} {}msec ({}msec AVG)",
            fluid_simulation.step_number(),
            fluid_simulation.num_fluid_particles(),
            dt,
            fluid_simulation.time(),
            (b - a).as_secs_f32() * 1000.,
            (total_duration / total_number_of_steps).as_secs_f32() * 1000.
        );
    }

    Ok(fluid_simulation)
}

fn run(run_matches: &ArgMatches) -> anyhow::Result<()> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or_else(|| anyhow!("missing simulation config"))?;
    let simulation_params = load_simulation_params(parameter_file, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    info!("{:?}", simulation_params);

    let scene_file_path = run_matches
        .value_of("SCENE_CONFIG")
        .ok_or_else(|| anyhow!("missing scene config"))?;
    let scene_config = load_scene_config(scene_file_path)?;
    info!("{:?}", scene_config);

    let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
    let max_seconds = run_matches
        .value_of("MAX_SECONDS")
        .map(|x| x.parse::<FT>())
        .transpose()
        .context("max-seconds is not a number")?;
    let statistics_path_opt = run_matches.value_of("STATISTICS_PATH");
    if statistics_path_opt.is_some() && !counters_enabled {
        warn!("statistics path given without --statistics-enabled");
    }

    let fluid_simulation = fluid_main(simulation_params, &scene_config, max_seconds, counters_enabled)?;

    if counters_enabled {
        let s = write_statistics(&fluid_simulation)?;
        print!("{}", s);
        if let Some(statistics_path) = statistics_path_opt {
            std::fs::write(statistics_path, s)
                .with_context(|| format!("failed writing statistics to {}", statistics_path))?;
        }
    }
    Ok(())
}

pub fn start() -> anyhow::Result<()> {
    let matches = app().get_matches();
    init_logger(matches.occurrences_of("v"));

    match matches.subcommand() {
        ("run", Some(run_matches)) => run(run_matches),
        _ => unreachable!(),
    }
}

#[test]
fn overwrite_config_replaces_known_keys() {
    let mut params = serde_yaml::to_value(SimulationParams::default()).unwrap();
    let overwrite: serde_yaml::Value = serde_yaml::from_str("viscosity: 0.5\nend_time: 2.0\n").unwrap();
    merge_config_overwrite(&mut params, overwrite).unwrap();

    let params: SimulationParams = serde_yaml::from_value(params).unwrap();
    assert_eq!(params.viscosity, 0.5);
    assert_eq!(params.end_time, 2.);
    assert_eq!(params.rest_density, SimulationParams::default().rest_density);
}

#[test]
fn overwrite_config_rejects_unknown_keys() {
    let mut params = serde_yaml::to_value(SimulationParams::default()).unwrap();
    let overwrite: serde_yaml::Value = serde_yaml::from_str("viscousity: 0.5\n").unwrap();
    assert!(merge_config_overwrite(&mut params, overwrite).is_err());
}

#[test]
fn run_subcommand_parses_arguments() {
    let matches = app()
        .get_matches_from_safe(vec![
            "sph",
            "-vv",
            "run",
            "simulation.yaml",
            "scene.yaml",
            "--max-seconds",
            "0.5",
            "-p",
        ])
        .unwrap();
    assert_eq!(matches.occurrences_of("v"), 2);
    let run_matches = matches.subcommand_matches("run").unwrap();
    assert_eq!(run_matches.value_of("SCENE_CONFIG"), Some("scene.yaml"));
    assert_eq!(run_matches.value_of("MAX_SECONDS"), Some("0.5"));
    assert!(run_matches.is_present("STATISTICS_ENABLED"));
}

#[test]
fn bundled_configs_load() {
    let params = load_simulation_params("configs/simulation.yaml", None).unwrap();
    let scene = load_scene_config("configs/scene.yaml").unwrap();
    let body = crate::scene::build_fluid_body(&params, &scene).unwrap();
    assert!(body.num_particles() > 0);

    let params = load_simulation_params("configs/simulation.yaml", Some("configs/oldroyd_b_overwrite.yaml")).unwrap();
    assert!(crate::materials::Fluid::as_oldroyd_b(&params.material()).is_some());
    let params = load_simulation_params("configs/simulation.yaml", Some("configs/dam_break_overwrite.yaml")).unwrap();
    assert_eq!(params.transport_velocity_coefficient, None);
}
