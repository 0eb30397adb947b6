//! Population-based self-play training of OctaFlip value networks.
//!
//! A roster of networks plays itself and a set of scripted baselines. The games feed a
//! replay buffer of labelled positions and an opening book; the best half of the roster
//! is trained on the buffer, and the next roster is bred from the winners.
//!
//! # How Training Works
//!
//! 1. **Schedule** - every roster pair meets in both colours, and the top members
//!    challenge every baseline ([`manager::schedule`])
//! 2. **Play** - matches run in parallel as isolated tasks ([`match_runner`])
//! 3. **Collect** - samples go to the [`replay_buffer`], decisive games to the
//!    [`opening_book`]
//! 4. **Score** - tournament points rank the roster
//! 5. **Train** - the top half trains on recency-weighted samples ([`trainer`])
//! 6. **Guard** - loss explosions roll networks back, divergence cuts learning rates
//! 7. **Evolve** - elites survive, the rest are mutated tournament winners ([`genetic`])
//! 8. **Adapt** - exploration and mutation strength follow the baseline win-rate trend
//!
//! # Architecture
//!
//! ```text
//! PopulationManager
//!     ↓ schedules
//! MatchTask (PolicySpec + seed)
//!     ↓ played on the worker pool
//! MatchOutcome (samples, history, result)
//!     ↓ merged into
//! ReplayBuffer / OpeningBook / tournament scores
//!     ↓ used by
//! trainer + genetic
//!     ↓ produce
//! next Population
//! ```
//!
//! # Example
//!
//! ```no_run
//! use octaflip_training::{config::TrainingConfig, manager::PopulationManager};
//!
//! let mut manager = PopulationManager::new(TrainingConfig::default(), 42)?;
//! for _ in 0..10 {
//!     let report = manager.run_generation();
//!     println!("generation {}: scores {:?}", report.generation, report.scores);
//! }
//! let snapshot = manager.snapshot();
//! # let _ = snapshot;
//! # Ok::<(), octaflip_training::manager::ManagerError>(())
//! ```
//!
//! # Determinism
//!
//! Every random choice of a run flows from the seed given to the manager: match seeds are
//! drawn before dispatch and results are consumed in schedule order, so the worker count
//! does not change the outcome.
//!
//! # Current Limitations
//!
//! - **No head-to-head against external engines**: strength is only measured against the
//!   built-in baselines
//! - **Sequential training**: networks train one after another on the orchestrator thread
//! - **Backups are in memory only**: a restarted run cannot roll back past its last save

pub mod config;
pub mod evaluation;
pub mod genetic;
pub mod manager;
pub mod match_runner;
pub mod opening_book;
pub mod replay_buffer;
pub mod run_stats;
pub mod trainer;
pub mod weights;
