use std::collections::BTreeMap;
use std::process;

use spinalnet::config::{BodyDescription, SpinalConfig};
use spinalnet::controller::ControlNetwork;
use spinalnet::delay::TimeInSeconds;
use spinalnet::observer::NetworkAdapter;
use spinalnet::params::ParamSet;
use spinalnet::sensors::SensorSource;
use spinalnet::trial::{run_trial, BodySim};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("spinalnet (time-delayed spinal control network)");
    eprintln!("Usage: spinalnet <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  describe <config> <body> [params]   Print the built network as JSON");
    eprintln!("  params <config> <body>              List the free parameters");
    eprintln!("  run <config> <body> [--params f] [--duration s] [--step s] [--sensors f]");
    eprintln!("                                      Drive a static body, print CSV frames");
    eprintln!("\nLogging is controlled with RUST_LOG (e.g. RUST_LOG=spinalnet=debug).");
    process::exit(1);
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    process::exit(1);
}

/// Body whose sensors hold constant values and whose muscles only record excitation.
struct StaticBody {
    readings: BTreeMap<String, f64>,
    excitation: Vec<f64>,
}

impl BodySim for StaticBody {
    fn sensor_value(&self, sensor: &SensorSource) -> f64 {
        self.readings.get(&sensor.name).copied().unwrap_or(0.0)
    }

    fn set_excitation(&mut self, body_muscle: usize, value: f64) {
        self.excitation[body_muscle] = value;
    }

    fn advance(&mut self, _dt: TimeInSeconds) {}
}

fn load(args: &[String]) -> (SpinalConfig, BodyDescription) {
    if args.len() < 2 {
        usage();
    }
    let cfg = SpinalConfig::from_path(&args[0]).unwrap_or_else(|e| fail(format!("{}: {e}", args[0])));
    let body = BodyDescription::from_path(&args[1]).unwrap_or_else(|e| fail(format!("{}: {e}", args[1])));
    (cfg, body)
}

fn load_params(path: Option<&String>) -> ParamSet {
    match path {
        Some(p) => ParamSet::from_path(p).unwrap_or_else(|e| fail(format!("{p}: {e}"))),
        None => ParamSet::new(),
    }
}

fn build(cfg: &SpinalConfig, params: &mut ParamSet, body: &BodyDescription) -> ControlNetwork {
    let net = ControlNetwork::build(cfg, params, body).unwrap_or_else(|e| fail(e));
    for w in net.warnings() {
        warn!("{w}");
    }
    net
}

fn cmd_describe(args: &[String]) {
    let (cfg, body) = load(args);
    let mut params = load_params(args.get(2));
    let net = build(&cfg, &mut params, &body);
    let report = NetworkAdapter::new(&net).describe();
    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{s}"),
        Err(e) => fail(e),
    }
}

fn cmd_params(args: &[String]) {
    let (cfg, body) = load(args);
    let mut params = ParamSet::new();
    build(&cfg, &mut params, &body);
    for p in params.infos() {
        match &p.spec {
            Some(s) => println!("{}\t{}\t{}~{}", p.name, p.value, s.mean, s.std),
            None => println!("{}\t{}", p.name, p.value),
        }
    }
}

fn cmd_run(args: &[String]) {
    let (cfg, body) = load(args);

    let mut params_path = None;
    let mut sensors_path = None;
    let mut duration: f64 = 1.0;
    let mut step: f64 = 0.005;

    let mut i = 2;
    while i < args.len() {
        let value = args.get(i + 1).unwrap_or_else(|| usage());
        match args[i].as_str() {
            "--params" => params_path = Some(value),
            "--sensors" => sensors_path = Some(value),
            "--duration" => {
                duration = value
                    .parse()
                    .unwrap_or_else(|_| fail("duration must be a number of seconds"))
            }
            "--step" => {
                step = value
                    .parse()
                    .unwrap_or_else(|_| fail("step must be a number of seconds"))
            }
            other => fail(format!("Unknown option: {other}")),
        }
        i += 2;
    }
    if step <= 0.0 {
        fail("step must be positive");
    }

    let readings: BTreeMap<String, f64> = match sensors_path {
        Some(p) => std::fs::read_to_string(p)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
            .unwrap_or_else(|e| fail(format!("{p}: {e}"))),
        None => BTreeMap::new(),
    };

    let mut params = load_params(params_path);
    let mut net = build(&cfg, &mut params, &body);
    let mut sim = StaticBody {
        readings,
        excitation: vec![0.0; body.muscles.len()],
    };

    let result = run_trial(&mut net, &mut sim, step, duration, true);
    info!(steps = result.steps, end_time = result.end_time, "trial finished");

    if let Some((_, first)) = result.frames.first() {
        let header: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
        println!("time,{}", header.join(","));
    }
    for (t, frame) in &result.frames {
        let row: Vec<String> = frame.iter().map(|(_, v)| v.to_string()).collect();
        println!("{t},{}", row.join(","));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    match args[0].as_str() {
        "describe" => cmd_describe(&args[1..]),
        "params" => cmd_params(&args[1..]),
        "run" => cmd_run(&args[1..]),
        "--help" | "-h" | "help" => usage(),
        other => {
            eprintln!("Unknown command: {other}");
            usage();
        }
    }
}
