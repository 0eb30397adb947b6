use std::path::PathBuf;

use octaflip_evaluator::policy::BaselineKind;
use octaflip_training::{config::MatchConfig, evaluation, match_runner::PolicySpec};

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct EvaluateArg {
    /// Model file written by `train`
    #[arg(long)]
    checkpoint: PathBuf,
    /// Games against each baseline
    #[arg(long, default_value_t = 20)]
    games: usize,
    /// Seed for the game seeds
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

pub(crate) fn run(arg: &EvaluateArg) -> anyhow::Result<()> {
    let EvaluateArg {
        checkpoint,
        games,
        seed,
    } = arg;

    let model = util::read_model_file(checkpoint)?;
    model.to_network()?;
    eprintln!(
        "Evaluating {} (generation {}, trained at {}):",
        model.name, model.generation, model.trained_at
    );

    let candidate = PolicySpec::Network(model.checkpoint);
    let report = evaluation::run_arena(
        &candidate,
        &BaselineKind::ALL,
        *games,
        &MatchConfig::default(),
        *seed,
    );

    for record in &report.records {
        eprintln!(
            "  vs {:<10} {:3}/{} wins, {} draws, {} losses ({:.1}%)",
            record.baseline.to_string(),
            record.wins,
            record.games(),
            record.draws,
            record.losses,
            record.win_rate().unwrap_or(0.0) * 100.0,
        );
    }
    if report.failed > 0 {
        eprintln!("warning: {} games failed", report.failed);
    }
    eprintln!(
        "  Overall:      {}/{} wins ({:.1}%)",
        report.wins(),
        report.games(),
        report.overall_win_rate().unwrap_or(0.0) * 100.0
    );
    Ok(())
}
