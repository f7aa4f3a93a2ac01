use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use banksim::model::{BankSim, SimConfig};
use banksim::output::{self, CsvSink};
use banksim::sweep::{self, SweepEngine};

#[derive(Parser)]
#[command(name = "banksim", about = "Agent-based banking network balance-sheet simulator")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single simulation and write per-step snapshots
    Run {
        /// TOML config file; defaults are used for missing fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of steps (overrides the config)
        #[arg(long)]
        steps: Option<usize>,

        /// Random seed (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory for CSV, summary and config files
        #[arg(long, default_value = "output/run")]
        output_dir: PathBuf,
    },

    /// Run the CAR x minimum reserve ratio grid
    Sweep {
        /// Number of steps per run
        #[arg(long, default_value = "240")]
        steps: usize,

        /// Random seed shared by every run
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory for sweep results
        #[arg(long, default_value = "output/sweep")]
        output_dir: PathBuf,

        /// Comma-separated capital adequacy ratios
        #[arg(long, value_delimiter = ',')]
        cars: Option<Vec<f64>>,

        /// Comma-separated minimum reserve ratios
        #[arg(long, value_delimiter = ',')]
        reserve_ratios: Option<Vec<f64>>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn progress_bar(len: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!("{{bar:40}} {{pos}}/{{len}} {} [{{elapsed_precise}}]", unit);
    if let Ok(style) = ProgressStyle::with_template(&template) {
        pb.set_style(style);
    }
    pb
}

fn run(
    config: Option<PathBuf>,
    steps: Option<usize>,
    seed: Option<u64>,
    output_dir: PathBuf,
) -> banksim::Result<()> {
    let mut config = match config {
        Some(path) => SimConfig::from_toml_file(&path)?,
        None => SimConfig::default(),
    };
    if let Some(steps) = steps {
        config.max_steps = steps;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }

    println!(
        "Running {} steps: {} banks, {} savers, {} loans (seed {})",
        config.max_steps, config.initial_bank, config.initial_saver, config.initial_loan, config.seed
    );

    let mut sim = BankSim::from_config(config.clone())?;
    let mut sink = CsvSink::create(&output_dir)?;
    let summary = sim.run(&mut sink)?;

    output::save_summary_json(&summary, &config, &output_dir.join("summary.json"))?;
    output::save_config_toml(&config, &output_dir.join("config.toml"))?;

    println!(
        "Finished after {} steps: {} of {} banks solvent, {} credit / {} liquidity / {} contagion failures",
        summary.steps,
        summary.surviving_banks,
        config.initial_bank,
        summary.credit_failures,
        summary.liquidity_failures,
        summary.contagion_failures
    );
    println!("Output written to {}", output_dir.display());
    Ok(())
}

fn run_sweep(
    steps: usize,
    seed: u64,
    output_dir: PathBuf,
    cars: Option<Vec<f64>>,
    reserve_ratios: Option<Vec<f64>>,
) -> banksim::Result<()> {
    let base = SimConfig {
        max_steps: steps,
        seed,
        ..SimConfig::default()
    };
    let mut engine = SweepEngine::new(base);
    if let Some(cars) = cars {
        engine.cars = cars;
    }
    if let Some(ratios) = reserve_ratios {
        engine.reserve_ratios = ratios;
    }

    let combos = engine.combinations().len();
    println!("Sweeping {} combinations ({} steps each)", combos, steps);
    let pb = progress_bar(combos as u64, "runs");
    let results = engine.run_grid_with(|| pb.inc(1))?;
    pb.finish();

    for r in &results {
        println!(
            "  car={:.3} min_rr={:.3}: {} banks solvent after {} steps",
            r.car, r.min_reserves_ratio, r.summary.surviving_banks, r.summary.steps
        );
    }

    let path = output_dir.join("sweep_results.csv");
    sweep::save_sweep_results(&results, &path)?;
    println!("Sweep results: {}", path.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            config,
            steps,
            seed,
            output_dir,
        } => run(config, steps, seed, output_dir),
        Commands::Sweep {
            steps,
            seed,
            output_dir,
            cars,
            reserve_ratios,
        } => run_sweep(steps, seed, output_dir, cars, reserve_ratios),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
