use std::path::PathBuf;

use octaflip_evaluator::network::QUANTIZATION_SCALE;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ExportWeightsArg {
    /// Model file written by `train`
    #[arg(long)]
    checkpoint: PathBuf,
    /// Output header path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &ExportWeightsArg) -> anyhow::Result<()> {
    let ExportWeightsArg { checkpoint, output } = arg;

    let model = util::read_model_file(checkpoint)?;
    let network = model.to_network()?;
    let max_abs = network.max_abs_parameter();
    if max_abs * QUANTIZATION_SCALE > f32::from(i16::MAX) {
        eprintln!("warning: largest parameter {max_abs:.3} will be clipped in fixed point");
    }

    let quantized = network.quantized();
    let mut output = Output::from_output_path(output.clone())?;
    output.write_header(|w| quantized.write_c_header(w))?;

    eprintln!("Weights exported successfully");
    eprintln!("  Path:       {}", output.display_path());
    eprintln!("  Model:      {}", model.name);
    eprintln!("  Layers:     {}", quantized.layers.len());
    eprintln!("  Parameters: {}", network.parameter_count());
    Ok(())
}
