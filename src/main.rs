use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rvs_assoc::{csv_reader, orchestrator, output, RunConfig, VarianceModel};
use std::path::Path;

#[derive(Parser)]
#[command(name = "rvs-assoc")]
#[command(version)]
#[command(about = "Rare-variant association tests on genotype dosages (RVS)", long_about = None)]
struct Args {
    /// Dosage table CSV: chrom,pos,p_aa,p_ab,p_bb,<sample ids...>
    #[arg(short, long)]
    dosages: String,

    /// Sample sheet CSV: sample_id,phenotype[,group][,high_depth]
    #[arg(short, long)]
    samples: String,

    /// Output CSV file path
    #[arg(short, long)]
    output: String,

    /// Resampling iterations per variant (0 = asymptotic test only)
    #[arg(long, default_value_t = 0)]
    nboot: usize,

    /// Variance of the score: "rvs" or "naive"
    #[arg(long, default_value = "rvs")]
    variance_model: VarianceModel,

    /// Stop resampling early when a variant is clearly not significant
    #[arg(long)]
    stop_early: bool,

    /// Number of worker threads
    #[arg(long, default_value_t = num_cpus())]
    threads: usize,

    /// Seed for the resampling random streams
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Abort the whole run if any variant cannot be tested
    #[arg(long)]
    fail_fast: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn make_progress_bar(quiet: bool, len: u64) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  [{elapsed_precise}/{eta_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    for path in [&args.dosages, &args.samples] {
        if !Path::new(path).exists() {
            anyhow::bail!("Input file not found: {}", path);
        }
    }

    let config = RunConfig {
        nboot: args.nboot,
        variance_model: args.variance_model,
        stop_early: args.stop_early,
        nthreads: args.threads,
        seed: args.seed,
        fail_fast: args.fail_fast,
    };
    config.validate()?;

    progress!(args.quiet, "RVS Association Test");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Dosage table: {}", args.dosages);
    progress!(args.quiet, "Sample sheet: {}", args.samples);
    progress!(args.quiet, "Output CSV: {}", args.output);
    progress!(args.quiet, "Variance model: {:?}", config.variance_model);
    if config.uses_bootstrap() {
        progress!(args.quiet, "Resampling: {} iterations (seed {})", config.nboot, config.seed);
        progress!(args.quiet, "  Early stopping: {}", config.stop_early);
    } else {
        progress!(args.quiet, "Resampling: disabled (asymptotic test)");
    }
    progress!(args.quiet, "Threads: {}", config.nthreads);
    progress!(args.quiet);

    // Step 1: Samples
    progress!(args.quiet, "Step 1: Reading sample sheet...");
    let samples = csv_reader::load_samples(Path::new(&args.samples))?;
    let (phenotypes, groups) = csv_reader::build_design(&samples);
    let n_cases = phenotypes.iter().filter(|&&y| y).count();
    progress!(args.quiet, "  {} samples ({} cases, {} controls)", samples.len(), n_cases, samples.len() - n_cases);
    for g in &groups {
        progress!(
            args.quiet,
            "  Group {}: {} samples, {} read depth",
            g.id,
            g.samples.len(),
            if g.high_read_depth { "high" } else { "low" }
        );
    }

    // Step 2: Dosages
    progress!(args.quiet, "Step 2: Reading dosage table...");
    let variants = csv_reader::load_dosages(Path::new(&args.dosages), &samples)?;
    if variants.is_empty() {
        anyhow::bail!("No variants in dosage table!");
    }
    progress!(args.quiet, "  {} variants", variants.len());

    // Step 3: Tests
    progress!(args.quiet);
    progress!(args.quiet, "Step 3: Running association tests...");
    let pb = make_progress_bar(args.quiet, variants.len() as u64)?;
    let outcomes = orchestrator::run_tests(&variants, &phenotypes, &groups, &config, Some(&pb))?;
    pb.finish_and_clear();

    let n_failed = outcomes.iter().filter(|o| o.is_err()).count();
    let min_p = outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok())
        .fold(f64::INFINITY, |a, &b| a.min(b));
    progress!(args.quiet, "  Tested: {} / {}", variants.len() - n_failed, variants.len());
    if n_failed > 0 {
        progress!(args.quiet, "  Could not be tested: {}", n_failed);
    }
    if min_p.is_finite() {
        progress!(args.quiet, "  Smallest p-value: {:.3e}", min_p);
    }

    // Step 4: Output
    progress!(args.quiet);
    progress!(args.quiet, "Step 4: Writing results to CSV...");
    let results = output::pair_results(&variants, &outcomes);
    output::write_results(&results, Path::new(&args.output))?;

    progress!(args.quiet);
    progress!(args.quiet, "Done! Results written to: {}", args.output);

    Ok(())
}
