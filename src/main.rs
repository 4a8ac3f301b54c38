use std::path::PathBuf;
use std::process::exit;

use log::{error, info, warn};
use structopt::StructOpt;

use tomasulo_sim::cpu::{load_cpu_config, CPUConfig};
use tomasulo_sim::driver::Driver;
use tomasulo_sim::error::SimError;
use tomasulo_sim::loader::loader::{load, LoadError};

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the program (a YAML list of instructions) to issue
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "cpu.yaml")]
    config: PathBuf,

    /// Drain the pipeline with the auto-run clock instead of stepping
    #[structopt(short, long)]
    auto: bool,

    /// Print the final state as YAML
    #[structopt(long)]
    dump: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let cpu_config_path = opt.config.to_string_lossy().to_string();
    let cpu_config = if opt.config.exists() {
        match load_cpu_config(&cpu_config_path) {
            Ok(config) => config,
            Err(err) => {
                error!("Failed to load {}. Cause: {}", cpu_config_path, err);
                exit(1);
            }
        }
    } else {
        warn!("Config {} not found, using defaults", cpu_config_path);
        CPUConfig::default()
    };

    let path = opt.file.to_string_lossy().to_string();
    info!("Loading {}", path);
    let requests = match load(&path) {
        Ok(requests) => requests,
        Err(err) => {
            error!("Loading program '{}' failed.", path);
            match err {
                LoadError::AnalysisError(msg_vec) => {
                    for msg in msg_vec {
                        error!("{}", msg);
                    }
                }
                other => error!("{}", other),
            }
            exit(1);
        }
    };

    let mut driver = match Driver::new(&cpu_config) {
        Ok(driver) => driver,
        Err(err) => {
            error!("Invalid configuration {}. Cause: {}", cpu_config_path, err);
            exit(1);
        }
    };

    for request in requests {
        // The engine never queues a request that hits a structural hazard;
        // step until a station frees up and resubmit.
        loop {
            match driver.issue(request) {
                Ok(_) => break,
                Err(SimError::StructuralHazard(kind)) => {
                    info!("No free {} station, stepping before retrying", kind);
                    driver.step();
                }
                Err(err) => {
                    error!("Rejected {:?}: {}", request, err);
                    exit(1);
                }
            }
        }
    }

    let snapshot = if opt.auto {
        driver.run_to_completion()
    } else {
        let mut snapshot = driver.snapshot();
        while !driver.is_drained() {
            snapshot = driver.step();
        }
        snapshot
    };

    if opt.dump {
        match serde_yaml::to_string(&snapshot) {
            Ok(yaml) => println!("{}", yaml),
            Err(err) => {
                error!("Failed to serialize the final state: {}", err);
                exit(1);
            }
        }
    } else {
        println!("{}", snapshot);
    }

    info!("Program complete!");
}
