use clap::{Parser, Subcommand};

use self::{
    evaluate::EvaluateArg, export_book::ExportBookArg, export_weights::ExportWeightsArg,
    show_config::ShowConfigArg, train::TrainArg,
};

mod evaluate;
mod export_book;
mod export_weights;
mod show_config;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train value networks by population-based self-play
    Train(#[clap(flatten)] TrainArg),
    /// Play a trained model against every baseline
    Evaluate(#[clap(flatten)] EvaluateArg),
    /// Write the quantized C header of a trained model
    ExportWeights(#[clap(flatten)] ExportWeightsArg),
    /// Write the C header of an opening book
    ExportBook(#[clap(flatten)] ExportBookArg),
    /// Print the effective training config as JSON
    ShowConfig(#[clap(flatten)] ShowConfigArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Evaluate(arg) => evaluate::run(&arg)?,
        Mode::ExportWeights(arg) => export_weights::run(&arg)?,
        Mode::ExportBook(arg) => export_book::run(&arg)?,
        Mode::ShowConfig(arg) => show_config::run(&arg)?,
    }
    Ok(())
}
