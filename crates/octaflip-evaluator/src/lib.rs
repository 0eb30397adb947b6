//! Position evaluation and move selection for OctaFlip.
//!
//! This crate turns a board into numbers and numbers into moves:
//!
//! 1. **Position Encoding** ([`position_encoder`]) - Maps a board to a 192-element feature
//!    vector seen from one player's perspective.
//!
//! 2. **Value Network** ([`network`]) - Scores an encoded position with a small
//!    feed-forward network, trained by manual backpropagation with Adam.
//!
//! 3. **Policies** ([`policy`]) - Choose a move for the side to move, either with a fixed
//!    heuristic (the baselines) or by scoring every reachable position with a network.
//!
//! # Architecture
//!
//! ```text
//! Policy (choose a move)
//!     ↓ uses
//! Value Network (score a position)
//!     ↓ uses
//! Position Encoder (board → features)
//! ```
//!
//! # Example: Picking a Move
//!
//! ```rust
//! use octaflip_engine::GameState;
//! use octaflip_evaluator::policy::BaselineKind;
//! use rand::SeedableRng as _;
//!
//! let state = GameState::new();
//! let policy = BaselineKind::Greedy.policy();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let mv = policy.choose_move(&state, &mut rng);
//! assert!(mv.is_some());
//! ```
//!
//! # Design Principles
//!
//! ## Shared, Immutable Inference
//!
//! Inference never mutates the network, so one network can be shared by every worker
//! thread that plays with it. Training-mode passes take `&mut self` and return the
//! intermediate activations to the caller.
//!
//! ## Perspective-Relative Features
//!
//! Features are always "mine / theirs / empty", never "red / blue". One network therefore
//! plays both colours, and every training label is expressed from the mover's side.

pub mod network;
pub mod policy;
pub mod position_encoder;
