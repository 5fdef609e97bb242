use nalgebra::DMatrix;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nefsim::prelude::*;

const DT: f32 = 0.001;

type DemoResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }

    let result = match args.get(1).map(String::as_str) {
        None => run_channel_demo(NefConfig::default()),
        Some("bias-demo") => run_bias_demo(),
        Some(path) => load_config(path).and_then(run_channel_demo),
    };
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("nefsim (decodable ensemble simulator)");
    println!("usage:");
    println!("  cargo run                        communication channel with default config");
    println!("  cargo run -- <config.json>       same, with a JSON ensemble config");
    println!("  cargo run -- bias-demo           bias origin with interneurons");
    println!("  cargo run -- --help");
    println!("set RUST_LOG=debug for construction details");
}

#[cfg(feature = "serde")]
fn load_config(path: &str) -> DemoResult<NefConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(NefConfig::from_json_str(&text)?)
}

#[cfg(not(feature = "serde"))]
fn load_config(_path: &str) -> DemoResult<NefConfig> {
    Err("config files need the serde feature".into())
}

/// Two ensembles in series: `a` represents a step input and `b` reads
/// `a`'s identity decoding through a 5 ms synapse.
fn run_channel_demo(config: NefConfig) -> DemoResult<()> {
    let dim = config.population.dimension;
    let mut a = DecodableEnsemble::from_config("a", &config)?;
    let mut b = DecodableEnsemble::from_config("b", &config)?;

    let identity = |d: usize| -> Vec<Box<dyn Function>> {
        (0..d)
            .map(|i| Box::new(IdentityFunction::new(d, i)) as Box<dyn Function>)
            .collect()
    };
    a.add_decoded_origin("X", identity(dim), AXON)?;
    b.add_decoded_origin("X", identity(dim), AXON)?;
    a.add_decoded_termination("in", DMatrix::identity(dim, dim), 0.005, false)?;
    b.add_decoded_termination("from_a", DMatrix::identity(dim, dim), 0.005, false)?;
    a.done_origins();
    b.done_origins();

    let drive = vec![0.5; dim];
    a.set_input("in", &drive)?;
    for k in 0..300 {
        let (start, end) = (k as f32 * DT, (k + 1) as f32 * DT);
        a.run(start, end)?;
        let relay: Vec<f32> = a.origin_values("X")?;
        b.set_input("from_a", &relay)?;
        b.run(start, end)?;

        if (k + 1) % 50 == 0 {
            let (xa, xb) = (a.origin_values("X")?, b.origin_values("X")?);
            info!(t = end, a = ?xa, b = ?xb, "channel");
        }
    }

    print_snapshot(&b);
    Ok(())
}

fn run_bias_demo() -> DemoResult<()> {
    let config = NefConfig {
        population: PopulationConfig {
            mode: SimulationMode::Rate,
            ..PopulationConfig::with_size(50, 1).with_seed(3)
        },
        eval_point_count: 200,
        ..NefConfig::default()
    };
    let mut pre = DecodableEnsemble::from_config("pre", &config)?;
    pre.add_bias_origin("bias", AXON, 20, true)?;
    pre.add_decoded_termination("in", DMatrix::identity(1, 1), 0.005, false)?;
    pre.done_origins();

    for (k, x) in [-0.8f32, -0.2, 0.4, 0.9].iter().enumerate() {
        pre.set_input("in", &[*x])?;
        for j in 0..50 {
            let t = (k * 50 + j) as f32 * DT;
            pre.run(t, t + DT)?;
        }
        let bias = pre.origin_values("bias")?;
        info!(input = *x, bias = ?bias, "bias signal");
    }

    print_snapshot(&pre);
    Ok(())
}

#[cfg(feature = "serde")]
fn print_snapshot<P: Population>(ensemble: &DecodableEnsemble<P>) {
    match serde_json::to_string_pretty(&EnsembleAdapter::new(ensemble).snapshot()) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("snapshot: {e}"),
    }
}

#[cfg(not(feature = "serde"))]
fn print_snapshot<P: Population>(ensemble: &DecodableEnsemble<P>) {
    println!("{:#?}", EnsembleAdapter::new(ensemble).snapshot());
}
