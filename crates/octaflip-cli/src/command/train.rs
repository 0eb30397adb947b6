use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Context as _;
use octaflip_evaluator::network::QUANTIZATION_SCALE;
use octaflip_training::{
    config::TrainingConfig,
    evaluation::ArenaReport,
    genetic::PopulationSnapshot,
    manager::{GenerationReport, PopulationManager, StabilityEvent},
    opening_book::{self, OpeningBook},
    replay_buffer::ReplayBuffer,
    run_stats::RunStatistics,
    trainer::LrCut,
};

use crate::{schema::model_file::ModelFile, util};

const POPULATION_FILE: &str = "population.json";
const BUFFER_FILE: &str = "replay_buffer.json";
const BOOK_FILE: &str = "opening_book.json";
const COMPRESSED_BOOK_FILE: &str = "opening_book_compressed.json";
const STATS_FILE: &str = "training_stats.json";
const CONFIG_FILE: &str = "training_config.json";
const MODEL_FILE: &str = "best_model.json";
const WEIGHTS_HEADER_FILE: &str = "nnue_weights.h";
const BOOK_HEADER_FILE: &str = "opening_book.h";

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Training time budget in hours
    #[arg(long, default_value_t = 10.0)]
    hours: f64,
    /// Directory for checkpoints and exports; a run saved there is resumed
    #[arg(long, default_value = "training")]
    out_dir: PathBuf,
    /// Seed for every random choice of this session
    #[arg(long)]
    seed: Option<u64>,
    /// Training config JSON file (missing fields take their defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop once the run reaches this many generations
    #[arg(long)]
    max_generations: Option<u32>,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg {
        hours,
        out_dir,
        seed,
        config,
        max_generations,
    } = arg;

    let config: TrainingConfig = match config {
        Some(path) => util::read_json_file("training config", path)?,
        None => TrainingConfig::default(),
    };
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
    let seed = seed.unwrap_or_else(rand::random);

    let mut manager = PopulationManager::new(config, seed)?;
    resume(&mut manager, out_dir);
    util::replace_json(manager.config(), &out_dir.join(CONFIG_FILE))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("Failed to install interrupt handler")?;
    }

    let budget = Duration::from_secs_f64(hours.max(0.0) * 3600.0);
    let start = Instant::now();
    let mut last_save = Instant::now();
    eprintln!("Training for {hours:.2} hours:");
    eprintln!("  Output:     {}", out_dir.display());
    eprintln!("  Seed:       {seed}");
    eprintln!("  Workers:    {}", manager.worker_count());
    eprintln!("  Population: {}", manager.population().len());
    eprintln!("  Generation: {}", manager.population().generation());

    loop {
        if interrupted.load(Ordering::SeqCst) {
            eprintln!("Interrupted, saving progress...");
            break;
        }
        if start.elapsed() >= budget {
            eprintln!("Time budget reached.");
            break;
        }
        if max_generations.is_some_and(|max| manager.population().generation() >= max) {
            eprintln!("Generation limit reached.");
            break;
        }

        let generation_start = Instant::now();
        let report = manager.run_generation();
        print_report(&report, &manager, generation_start.elapsed());

        let save_interval = manager.config().save_interval;
        if save_interval > 0 && manager.population().generation() % save_interval == 0 {
            match checkpoint(&mut manager, out_dir, &mut last_save) {
                Ok(_) => eprintln!("  Saved:      {}", out_dir.display()),
                Err(e) => eprintln!("warning: {e:#}; training continues"),
            }
        }
    }

    let book_records = checkpoint(&mut manager, out_dir, &mut last_save)?;
    eprintln!();
    eprintln!("Exported:");
    eprintln!("  Weights: {}", out_dir.join(WEIGHTS_HEADER_FILE).display());
    eprintln!(
        "  Book:    {} ({} of {} positions)",
        out_dir.join(BOOK_HEADER_FILE).display(),
        book_records,
        manager.book().len()
    );
    print_summary(manager.statistics(), out_dir);
    Ok(())
}

fn resume(manager: &mut PopulationManager, out_dir: &Path) {
    if let Some(snapshot) =
        util::load_optional::<PopulationSnapshot, _>("population", out_dir.join(POPULATION_FILE))
    {
        match manager.restore_population(&snapshot) {
            Ok(()) => eprintln!("Resumed population at generation {}", snapshot.generation),
            Err(e) => eprintln!("warning: {e}; starting with a fresh population"),
        }
    }
    if let Some(buffer) =
        util::load_optional::<ReplayBuffer, _>("replay buffer", out_dir.join(BUFFER_FILE))
    {
        manager.set_buffer(buffer);
    }
    manager.set_book(util::load_or_default::<OpeningBook, _>(
        "opening book",
        out_dir.join(BOOK_FILE),
    ));
    let stats: RunStatistics = util::load_or_default("training stats", out_dir.join(STATS_FILE));
    if stats.explosions > 0 {
        eprintln!("warning: previous loss explosions: {}", stats.explosions);
    }
    if stats.games_played > 0 {
        eprintln!("Previous games: {}", stats.games_played);
    }
    manager.set_statistics(stats);
}

/// Saves the run state and rewrites both headers. Returns the number of book records
/// exported.
fn checkpoint(
    manager: &mut PopulationManager,
    out_dir: &Path,
    last_save: &mut Instant,
) -> anyhow::Result<usize> {
    save(manager, out_dir, last_save)?;
    export(manager, out_dir)
}

fn save(
    manager: &mut PopulationManager,
    out_dir: &Path,
    last_save: &mut Instant,
) -> anyhow::Result<()> {
    manager.statistics_mut().elapsed_secs += last_save.elapsed().as_secs_f64();
    *last_save = Instant::now();

    util::replace_json(&manager.snapshot(), &out_dir.join(POPULATION_FILE))?;
    util::replace_json(manager.buffer(), &out_dir.join(BUFFER_FILE))?;
    util::replace_json(manager.book(), &out_dir.join(BOOK_FILE))?;
    util::replace_json(manager.statistics(), &out_dir.join(STATS_FILE))?;
    if let Some(best) = manager.population().best() {
        let generation = manager.population().generation();
        let model = ModelFile::new(
            format!("octaflip-gen{generation}"),
            generation,
            best.network().to_checkpoint(),
        );
        util::replace_json(&model, &out_dir.join(MODEL_FILE))?;
    }
    Ok(())
}

fn export(manager: &PopulationManager, out_dir: &Path) -> anyhow::Result<usize> {
    if let Some(best) = manager.population().best() {
        let network = best.network();
        if network.max_abs_parameter() * QUANTIZATION_SCALE > f32::from(i16::MAX) {
            eprintln!("warning: some parameters exceed the fixed-point range and will be clipped");
        }
        let quantized = network.quantized();
        util::replace_file(&out_dir.join(WEIGHTS_HEADER_FILE), |output| {
            output.write_header(|w| quantized.write_c_header(w))
        })?;
    }

    let book_config = &manager.config().book;
    let compressed = manager.compressed_book();
    util::replace_json(&compressed, &out_dir.join(COMPRESSED_BOOK_FILE))?;
    let records =
        compressed.export_table(book_config.export_min_occurrences, book_config.export_max_entries);
    util::replace_file(&out_dir.join(BOOK_HEADER_FILE), |output| {
        output.write_header(|w| opening_book::write_c_header(&records, w))
    })?;
    Ok(records.len())
}

fn print_report(report: &GenerationReport, manager: &PopulationManager, elapsed: Duration) {
    eprintln!(
        "Generation #{} ({:.1}s):",
        report.generation,
        elapsed.as_secs_f64()
    );
    eprintln!(
        "  Tasks:      {} ({} failed)",
        report.tasks,
        report.failures.len()
    );
    for reason in &report.failures {
        eprintln!("warning: task failed: {reason}");
    }
    eprintln!("  Scores:     {:?}", report.scores);
    eprintln!("  Ranking:    {:?}", report.ranking);
    eprintln!("  Baselines:  {}", format_arena(&report.baselines));
    eprintln!(
        "  Samples:    +{} (evicted {}), buffer {}",
        report.samples_added,
        report.samples_evicted,
        manager.buffer().len()
    );
    eprintln!(
        "  Book:       +{} games, {} positions",
        report.book_games,
        manager.book().len()
    );

    eprintln!("  Training:");
    for training in &report.training {
        let r = &training.report;
        match (r.skipped, r.mean_loss) {
            (Some(reason), _) => eprintln!("    #{:2}: skipped ({reason})", training.index),
            (None, Some(loss)) => eprintln!(
                "    #{:2}: {} batches ({} skipped), loss {loss:.3}, lr {:.6}{}",
                training.index,
                r.batches,
                r.skipped_batches,
                r.learning_rate,
                format_cuts(&r.lr_cuts),
            ),
            (None, None) => eprintln!(
                "    #{:2}: no valid batches ({} skipped)",
                training.index, r.skipped_batches
            ),
        }
    }

    match report.stability {
        Some(StabilityEvent::Explosion {
            mean_loss,
            restored,
        }) => eprintln!(
            "warning: loss explosion (recent mean {mean_loss:.0}); restored {restored} backups, pruned {} samples",
            report.samples_pruned
        ),
        Some(StabilityEvent::Divergence) => eprintln!(
            "warning: loss diverging; learning rates reduced, pruned {} samples",
            report.samples_pruned
        ),
        None => {}
    }

    let evolution = &report.evolution;
    eprintln!(
        "  Evolution:  {} elites, {} offspring ({} exploring)",
        evolution.elites, evolution.offspring, evolution.explorations
    );
    let adaptation = &report.adaptation;
    let trend = adaptation
        .trend
        .map_or_else(|| "n/a".to_owned(), |t| format!("{t:?}").to_lowercase());
    eprintln!(
        "  Adaptation: trend {trend}, exploration {:.3}, mutation {:.5}",
        adaptation.exploration_rate, adaptation.mutation_strength
    );
    if report.hall_of_fame {
        eprintln!(
            "  Hall of fame: {} entries",
            manager.population().hall_of_fame().len()
        );
    }
    if let Some(evaluation) = &report.evaluation {
        eprintln!("  Evaluation: {}", format_arena(evaluation));
    }
}

fn format_arena(report: &ArenaReport) -> String {
    let mut parts: Vec<String> = report
        .records
        .iter()
        .map(|r| format!("{} {}/{}", r.baseline, r.wins, r.games()))
        .collect();
    if let Some(rate) = report.overall_win_rate() {
        parts.push(format!("=> {rate:.3}"));
    }
    if report.failed > 0 {
        parts.push(format!("({} failed)", report.failed));
    }
    parts.join(", ")
}

fn format_cuts(cuts: &[LrCut]) -> String {
    if cuts.is_empty() {
        return String::new();
    }
    let names: Vec<String> = cuts.iter().map(ToString::to_string).collect();
    format!(" [{}]", names.join(", "))
}

fn print_summary(stats: &RunStatistics, out_dir: &Path) {
    eprintln!();
    eprintln!("Training stopped");
    eprintln!("  Path:              {}", out_dir.display());
    eprintln!("  Generation:        {}", stats.generation);
    eprintln!("  Games played:      {}", stats.games_played);
    eprintln!("  Positions trained: {}", stats.positions_trained);
    eprintln!("  Failed tasks:      {}", stats.failed_tasks);
    eprintln!("  Loss explosions:   {}", stats.explosions);
    eprintln!("  Divergences:       {}", stats.divergences);
    eprintln!("  Hours trained:     {:.2}", stats.elapsed_secs / 3600.0);
    if let Some(loss) = stats.mean_loss() {
        eprintln!("  Average loss:      {loss:.2}");
    }
    if let Some(evaluation) = &stats.last_evaluation {
        eprintln!("  Last evaluation:   {}", format_arena(evaluation));
    }
}
