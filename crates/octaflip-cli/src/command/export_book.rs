use std::path::PathBuf;

use octaflip_training::opening_book::{self, OpeningBook};

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ExportBookArg {
    /// Opening book JSON file written by `train`
    #[arg(long)]
    book: PathBuf,
    /// Output header path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Maximum number of positions in the table
    #[arg(long, default_value_t = 2000)]
    max_entries: usize,
    /// Positions seen fewer times are left out
    #[arg(long, default_value_t = 3)]
    min_occurrences: u32,
}

pub(crate) fn run(arg: &ExportBookArg) -> anyhow::Result<()> {
    let ExportBookArg {
        book,
        output,
        max_entries,
        min_occurrences,
    } = arg;

    let book: OpeningBook = util::read_json_file("opening book", book)?;
    let records = book.export_table(*min_occurrences, *max_entries);
    let mut output = Output::from_output_path(output.clone())?;
    output.write_header(|w| opening_book::write_c_header(&records, w))?;

    eprintln!("Opening book exported successfully");
    eprintln!("  Path:      {}", output.display_path());
    eprintln!("  Positions: {} of {}", records.len(), book.len());
    Ok(())
}
