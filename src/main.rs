//! Nodal - SPICE netlist circuit simulator
//!
//! Runs every analysis in a netlist and writes one result file per
//! analysis into the output directory.
//!
//! # Usage
//!
//! ```bash
//! nodal -i amp.cir -o out -f csv
//! RUST_LOG=debug nodal -i amp.cir --iteration newton
//! ```

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use nodal_core::{
    circuit::{Circuit, IterationStrategy},
    error::Result,
    netlist,
    output::{self, OutputFormat},
    Simulator, SimulatorConfig,
};
use tracing::info;

/// Modified Nodal Analysis circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input netlist
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Directory result files are written to
    #[arg(short, long, value_name = "DIR", default_value = "out")]
    output_dir: PathBuf,

    /// Output format: csv or space
    #[arg(short, long, default_value = "csv")]
    format: OutputFormat,

    /// Nonlinear iteration strategy: newton or levenberg
    #[arg(long)]
    iteration: Option<IterationStrategy>,

    /// Newton iteration budget per timestep
    #[arg(long)]
    newton_iterations: Option<usize>,

    /// Print the result column names
    #[arg(short, long)]
    columns: bool,

    /// Show a progress bar for linear transient runs
    #[arg(long)]
    progress: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    // Parse the netlist and build the circuit
    let netlist = netlist::parse_file(&args.input)?;
    let mut circuit = Circuit::from_netlist(netlist)?;
    if let Some(strategy) = args.iteration {
        circuit.iteration = strategy;
    }

    let mut config = SimulatorConfig::default().with_progress(args.progress);
    if let Some(iterations) = args.newton_iterations {
        config = config.with_newton_iterations(iterations);
    }

    let analyses = circuit.analyses.clone();
    let title = file_stem(&circuit.title);
    let mut simulator = Simulator::with_config(circuit, config);

    if args.columns {
        println!("{}", simulator.columns().join(" "));
    }

    let results = simulator.run()?;
    fs::create_dir_all(&args.output_dir)?;

    for (analysis, result) in analyses.iter().zip(&results) {
        let path = args.output_dir.join(format!(
            "{}{}.{}",
            title,
            analysis.label(),
            args.format.extension_for(result)
        ));
        let mut writer = BufWriter::new(File::create(&path)?);
        output::write_result(result, args.format, &mut writer)?;
        info!(path = %path.display(), runs = result.num_runs(), "wrote results");
    }

    Ok(())
}

/// Title with comment markers and path separators removed.
fn file_stem(title: &str) -> String {
    let stem = title.trim_start_matches('*').trim();
    let stem: String = stem
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if stem.is_empty() || Path::new(&stem).file_name().is_none() {
        "circuit".to_string()
    } else {
        stem
    }
}
