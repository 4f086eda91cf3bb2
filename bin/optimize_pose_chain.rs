use std::f64::consts::FRAC_PI_2;

use clap::Parser;
use factor_gn::core::{graph::NonlinearFactorGraph, values::Values};
use factor_gn::factors::{BetweenFactor, PriorFactor};
use factor_gn::init_logger;
use factor_gn::linalg::{EliminationAlgorithm, FactorizationMethod};
use factor_gn::manifold::{ManifoldType, se2::SE2};
use factor_gn::optimizer::{
    GaussNewtonConfig, GaussNewtonOptimizer, NonlinearOptimizer, Verbosity, optimize,
};
use nalgebra::dvector;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "optimize_pose_chain")]
#[command(about = "Optimize a noisy square SE(2) pose chain with a loop closure")]
struct Args {
    /// Poses per side of the square trajectory
    #[arg(short, long, default_value = "10")]
    side: usize,

    /// Half-width of the uniform noise added to the initial guess
    #[arg(short, long, default_value = "0.2")]
    noise: f64,

    /// Seed of the noise generator
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Maximum number of optimization iterations
    #[arg(short, long, default_value = "100")]
    max_iterations: usize,

    /// Elimination algorithm: "multifrontal" or "sequential"
    #[arg(short, long, default_value = "multifrontal")]
    elimination: EliminationAlgorithm,

    /// Factorization method: "ldl", "qr" or "cholesky"
    #[arg(short, long, default_value = "ldl")]
    factorization: FactorizationMethod,

    /// Optimizer verbosity: "silent", "error", "values", "delta" or "linear"
    #[arg(short, long, default_value = "silent")]
    verbosity: Verbosity,
}

fn pose_key(i: usize) -> String {
    format!("x{i}")
}

/// Ground-truth poses walking a square, turning left at each corner.
fn square_trajectory(side: usize) -> Vec<SE2> {
    let count = 4 * side;
    let mut poses = Vec::with_capacity(count);
    poses.push(SE2::identity());
    for k in 1..count {
        let turn = if k % side == 0 { FRAC_PI_2 } else { 0.0 };
        let step = SE2::from_xy_angle(1.0, 0.0, turn);
        let next = poses[k - 1].compose(&step);
        poses.push(next);
    }
    poses
}

fn build_problem(
    truth: &[SE2],
    noise: f64,
    rng: &mut StdRng,
) -> Result<(NonlinearFactorGraph, Values), Box<dyn std::error::Error>> {
    let mut graph = NonlinearFactorGraph::new();
    graph.add_factor(&["x0"], PriorFactor::new(dvector![0.0, 0.0, 0.0]));

    for i in 1..truth.len() {
        let measured = truth[i - 1].inverse().compose(&truth[i]);
        let (a, b) = (pose_key(i - 1), pose_key(i));
        graph.add_factor(&[a.as_str(), b.as_str()], BetweenFactor::new(measured));
    }

    // loop closure back to the start
    if let Some(last) = truth.last() {
        let closure = last.inverse().compose(&truth[0]);
        let key = pose_key(truth.len() - 1);
        graph.add_factor(&[key.as_str(), "x0"], BetweenFactor::new(closure));
    }

    let mut values = Values::new();
    for (i, pose) in truth.iter().enumerate() {
        let mut perturb = || {
            if noise > 0.0 {
                rng.random_range(-noise..noise)
            } else {
                0.0
            }
        };
        values.insert(
            pose_key(i),
            ManifoldType::SE2,
            dvector![
                pose.x() + perturb(),
                pose.y() + perturb(),
                pose.angle() + perturb()
            ],
        )?;
    }

    Ok((graph, values))
}

/// Reject arguments the problem builder cannot use.
fn validate_args(args: &Args) -> Result<(), String> {
    if args.side == 0 {
        return Err("--side must be at least 1".to_string());
    }
    if !args.noise.is_finite() || args.noise < 0.0 {
        return Err(format!(
            "--noise must be a finite, non-negative number, got {}",
            args.noise
        ));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger()?;
    let args = Args::parse();

    if let Err(msg) = validate_args(&args) {
        error!("{}", msg);
        return Err(msg.into());
    }

    let truth = square_trajectory(args.side);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (graph, values) = build_problem(&truth, args.noise, &mut rng)?;
    info!(
        "Pose chain: {} poses, {} factors",
        values.len(),
        graph.len()
    );

    let config = GaussNewtonConfig::new()
        .with_elimination(args.elimination)
        .with_factorization(args.factorization)
        .with_max_iterations(args.max_iterations)
        .with_verbosity(args.verbosity);
    info!("\n{}", config);

    let optimizer = GaussNewtonOptimizer::new(graph, values, config)?;
    let outcome = optimize(&optimizer);
    info!("{}", outcome);

    if let Some(err) = &outcome.error {
        warn!("Optimization stopped early: {}", err.chain_compact());
    }

    let mut truth_values = Values::new();
    for (i, pose) in truth.iter().enumerate() {
        truth_values.insert_variable(pose_key(i), pose.clone());
    }
    let residual = truth_values.local(outcome.optimizer.values())?;
    let max_pose_error = residual.iter().map(|(_, step)| step.norm()).fold(0.0, f64::max);
    info!("Largest pose error against ground truth: {:.3e}", max_pose_error);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("optimize_pose_chain").chain(extra.iter().copied()))
    }

    #[test]
    fn test_default_arguments_are_valid() -> TestResult {
        validate_args(&parse(&[])?)?;
        Ok(())
    }

    #[test]
    fn test_non_finite_noise_is_rejected() -> TestResult {
        for noise in ["--noise=inf", "--noise=-inf", "--noise=NaN", "--noise=-0.5"] {
            let args = parse(&[noise])?;
            assert!(validate_args(&args).is_err(), "{noise} accepted");
        }
        Ok(())
    }

    #[test]
    fn test_zero_side_is_rejected() -> TestResult {
        assert!(validate_args(&parse(&["--side", "0"])?).is_err());
        Ok(())
    }

    #[test]
    fn test_noiseless_chain_matches_truth() -> TestResult {
        let truth = square_trajectory(2);
        let mut rng = StdRng::seed_from_u64(7);
        let (graph, values) = build_problem(&truth, 0.0, &mut rng)?;
        assert_eq!(values.len(), 8);
        assert_eq!(graph.len(), 9);
        assert!(graph.error(&values)? < 1e-20);
        Ok(())
    }
}
