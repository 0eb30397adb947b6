use std::path::PathBuf;

use octaflip_training::config::TrainingConfig;

use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ShowConfigArg {
    /// Config file to merge over the defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

pub(crate) fn run(arg: &ShowConfigArg) -> anyhow::Result<()> {
    let config: TrainingConfig = match &arg.config {
        Some(path) => util::read_json_file("training config", path)?,
        None => TrainingConfig::default(),
    };
    if let Err(e) = config.validate() {
        eprintln!("warning: {e}");
    }
    Output::stdout().write_json(&config)
}
