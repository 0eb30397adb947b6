use anyhow::Context as _;
use chrono::{DateTime, Utc};
use octaflip_evaluator::network::{Checkpoint, Network};
use serde::{Deserialize, Serialize};

/// A trained network as saved by `train` and read by the other commands.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelFile {
    pub name: String,
    pub trained_at: DateTime<Utc>,
    /// Generation the network was taken from
    pub generation: u32,
    pub checkpoint: Checkpoint,
}

impl ModelFile {
    pub(crate) fn new(name: String, generation: u32, checkpoint: Checkpoint) -> Self {
        Self {
            name,
            trained_at: Utc::now(),
            generation,
            checkpoint,
        }
    }

    pub(crate) fn to_network(&self) -> anyhow::Result<Network> {
        Network::from_checkpoint(&self.checkpoint)
            .with_context(|| format!("Invalid checkpoint in model {}", self.name))
    }
}
