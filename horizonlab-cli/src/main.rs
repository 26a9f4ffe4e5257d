//! HorizonLab CLI — simulate, validate, optimize and certify horizon weights.
//!
//! Commands:
//! - `simulate` — one walk-forward run with the configured weights
//! - `validate` — simulate, then Monte Carlo block-bootstrap the ledger
//! - `optimize` — coarse grid + refine search over horizon weights
//! - `certify` — rolling walk-forward AND Monte Carlo certification
//! - `ab` — A/B certification of the configured toggle
//!
//! Every command reads one TOML run config and writes its artifacts to
//! `{output_dir}/{run_id}/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use horizonlab_core::engine::{simulate, SimResult};
use horizonlab_runner::ab_certify::{ab_certify, AbResult};
use horizonlab_runner::certify::{CertificationService, CertifyResult, Period};
use horizonlab_runner::config::RunConfig;
use horizonlab_runner::data_loader::{load_bars, LoadedData};
use horizonlab_runner::evaluator::Evaluator;
use horizonlab_runner::export::{save_json, save_simulation, Artifact};
use horizonlab_runner::monte_carlo::{self, MonteCarloResult};
use horizonlab_runner::optimizer::{optimize, OptimizeReport};
use horizonlab_runner::rolling::WalkForwardSplits;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "horizonlab",
    about = "HorizonLab CLI — walk-forward simulation and statistical certification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Path to a TOML run config. Missing sections use defaults.
    #[arg(long)]
    config: PathBuf,

    /// Output directory for result artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulator once with the configured weights.
    Simulate(CommonArgs),
    /// Simulate, then Monte Carlo validate the trade ledger.
    Validate(CommonArgs),
    /// Search horizon weights (coarse grid, then refine).
    Optimize(CommonArgs),
    /// Certify the configured weights over the configured period.
    Certify(CommonArgs),
    /// Compare the configured toggle's two arms.
    Ab(CommonArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Validate(args) => run_validate(&args),
        Commands::Optimize(args) => run_optimize(&args),
        Commands::Certify(args) => run_certify(&args),
        Commands::Ab(args) => run_ab(&args),
    }
}

/// Config, bars and run id shared by every command.
struct Session {
    config: RunConfig,
    data: LoadedData,
    run_id: String,
}

fn open(args: &CommonArgs) -> Result<Session> {
    let config = RunConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    let data = load_bars(&config.data).context("failed to load price data")?;
    let run_id = config.run_id()?;
    info!(
        symbol = %data.symbol,
        bars = data.bars.len(),
        dataset_hash = %data.dataset_hash,
        run_id = %run_id,
        "session ready"
    );
    Ok(Session { config, data, run_id })
}

fn run_simulate(args: &CommonArgs) -> Result<()> {
    let s = open(args)?;
    let result = simulate(&s.data.bars, &s.config.sim, &s.config.forecaster).context("simulation failed")?;
    print_simulation(&result, s.data.synthetic);
    let dir = save_simulation(&result, &s.run_id, &args.output_dir)?;
    println!("Artifacts saved to: {}", dir.display());
    Ok(())
}

fn run_validate(args: &CommonArgs) -> Result<()> {
    let s = open(args)?;
    let result = simulate(&s.data.bars, &s.config.sim, &s.config.forecaster).context("simulation failed")?;
    let mc = monte_carlo::validate(&result.trades, &s.config.monte_carlo);
    print_simulation(&result, s.data.synthetic);
    print_monte_carlo(&mc);
    save_simulation(&result, &s.run_id, &args.output_dir)?;
    let path = save(&Artifact::new("monte_carlo", &s.run_id, &mc), &args.output_dir)?;
    println!("Artifacts saved to: {}", dir_of(&path).display());
    Ok(())
}

fn run_optimize(args: &CommonArgs) -> Result<()> {
    let s = open(args)?;
    let evaluator = Evaluator::new(&s.data.bars, &s.config.forecaster, &s.config.sim, &s.config.monte_carlo);
    let report = optimize(&evaluator, &s.config.optimize, &s.config.budget)?;
    print_optimize(&report);
    let path = save(&Artifact::new("optimize", &s.run_id, &report), &args.output_dir)?;
    println!("Report saved to: {}", path.display());
    Ok(())
}

fn run_certify(args: &CommonArgs) -> Result<()> {
    let s = open(args)?;
    let rolling = WalkForwardSplits::new(s.config.rolling.clone());
    let service = CertificationService::new(
        &s.data.bars,
        &s.config.forecaster,
        &s.config.sim,
        &s.config.monte_carlo,
        &rolling,
    );
    let period = Period {
        start: s.config.sim.start,
        end: s.config.sim.end,
    };
    let result = service.certify(s.config.sim.horizon.weights, period)?;
    print_certify(&result);
    let path = save(&Artifact::new("certification", &s.run_id, &result), &args.output_dir)?;
    println!("Certificate saved to: {}", path.display());
    Ok(())
}

fn run_ab(args: &CommonArgs) -> Result<()> {
    let s = open(args)?;
    let result = ab_certify(
        &s.data.bars,
        &s.config.forecaster,
        &s.config.sim,
        &s.config.monte_carlo,
        s.config.ab.toggle,
        &s.config.ab.thresholds,
    )?;
    print_ab(&result);
    let path = save(&Artifact::new("ab_certification", &s.run_id, &result), &args.output_dir)?;
    println!("Result saved to: {}", path.display());
    Ok(())
}

fn save<T: serde::Serialize>(artifact: &Artifact<T>, output_dir: &Path) -> Result<PathBuf> {
    save_json(artifact, output_dir).with_context(|| format!("failed to save {} artifact", artifact.kind))
}

fn dir_of(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

// ─── Summaries ───────────────────────────────────────────────────────

fn print_simulation(result: &SimResult, synthetic: bool) {
    let m = &result.metrics;
    println!();
    println!("=== Simulation ===");
    println!("Forecaster:     {}", result.forecaster);
    println!("Steps:          {}", m.steps);
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Exposure:       {:.1}%", m.exposure * 100.0);
    println!("Avg Hold:       {:.1} days", m.avg_hold_days);
    println!("Oracle Fails:   {}", result.oracle_failures);
    if synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_monte_carlo(mc: &MonteCarloResult) {
    let a = &mc.aggregated;
    println!("=== Monte Carlo ({} iterations, seed {}) ===", mc.iterations, mc.seed);
    println!("p95 Max DD:     {:.2}%", a.p95_max_dd * 100.0);
    println!("Worst Max DD:   {:.2}%", a.worst_max_dd * 100.0);
    println!("Worst Sharpe:   {:.3}", a.worst_sharpe);
    println!("p10 Sharpe:     {:.3}", a.p10_sharpe);
    println!("p05 CAGR:       {:.2}%", a.p05_cagr * 100.0);
    for check in &mc.acceptance.checks {
        let mark = if check.passed { "PASS" } else { "FAIL" };
        println!("  [{mark}] {} = {:.4} (limit {:.4})", check.name, check.value, check.limit);
    }
    println!("Accepted:       {}", mc.passed());
    println!();
}

fn print_optimize(report: &OptimizeReport) {
    println!();
    println!("=== Optimization ===");
    println!("Grid:           {} candidates", report.grid_size);
    println!("Evaluated:      {}", report.evaluated);
    println!("Rejected:       {}", report.rejected);
    println!("Failed:         {}", report.failed);
    println!("Refine seed:    {}", report.refine_seed);
    if report.budget_exhausted {
        println!("WARNING: search budget exhausted, results are partial");
    }
    println!();
    println!("{:<4} {:<40} {:>8} {:>8} {:>7} {:>5}", "#", "Weights", "Score", "Sharpe", "Trades", "MC");
    println!("{}", "-".repeat(77));
    for (i, c) in report.coarse.iter().take(10).enumerate() {
        println!(
            "{:<4} {:<40} {:>8.4} {:>8.3} {:>7} {:>5}",
            i + 1,
            c.weights.to_string(),
            c.score,
            c.sim_sharpe,
            c.trade_count,
            if c.mc_pass { "pass" } else { "fail" }
        );
    }
    match &report.best {
        Some(best) => println!("\nBest: {} (score {:.4}, {:?})", best.weights, best.score, best.stage),
        None => println!("\nNo candidate scored."),
    }
    println!();
}

fn print_certify(result: &CertifyResult) {
    let r = &result.rolling;
    println!();
    println!("=== Certification ===");
    println!("Weights:        {}", result.weights);
    println!("Splits:         {} (pass rate {:.0}%)", r.splits.len(), r.pass_rate * 100.0);
    println!("Mean OOS Sharpe:{:.3}", r.mean_sharpe);
    println!("Worst OOS Sharpe:{:.3}", r.worst_sharpe);
    println!("Mean OOS DD:    {:.2}%", r.mean_drawdown * 100.0);
    if !r.failed_gates.is_empty() {
        println!("Failed gates:   {}", r.failed_gates.join(", "));
    }
    println!("Rolling:        {}", if r.passed { "PASS" } else { "FAIL" });
    println!("Monte Carlo:    {}", if result.monte_carlo.passed() { "PASS" } else { "FAIL" });
    println!("Verdict:        {:?}", result.verdict);
    println!();
}

fn print_ab(result: &AbResult) {
    println!();
    println!("=== A/B Certification ({:?}) ===", result.toggle);
    println!("{:<4} {:>8} {:>9} {:>11} {:>7}", "Arm", "Sharpe", "CAGR", "p95 MaxDD", "Trades");
    for arm in [&result.a, &result.b] {
        println!(
            "{:<4} {:>8.3} {:>8.2}% {:>10.2}% {:>7}",
            arm.label,
            arm.sharpe,
            arm.cagr * 100.0,
            arm.p95_max_dd * 100.0,
            arm.trade_count
        );
    }
    let d = &result.deltas;
    println!(
        "B-A  {:>8.3} {:>8.2}% {:>10.2}%",
        d.sharpe,
        d.cagr * 100.0,
        d.p95_max_dd * 100.0
    );
    println!("Recommendation: {:?}", result.recommendation);
    println!();
}
