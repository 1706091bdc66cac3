pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "unirep",
    version,
    about = "Protein representations, babbling and evotuning with UniRep",
    long_about = "UniRep turns sequences, FASTA files, text files and directories into a batch of \
                  named sequences and runs them through the legacy UniRep babblers to extract \
                  representations, generate continuations or evotune the model."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (default: $UNIREP_HOME/config.toml)
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract UniRep and UniRep Fusion representations
    Represent(commands::represent::RepresentArgs),

    /// Generate continuations of seed sequences
    Babble(commands::babble::BabbleArgs),

    /// Fine-tune the model on a set of sequences
    Evotune(commands::evotune::EvotuneArgs),

    /// Print the normalized batch as `sequence,name` lines
    Inputs(commands::inputs::InputsArgs),

    /// Convert a legacy weight bundle into a weight directory
    ConvertWeights(commands::convert::ConvertArgs),

    /// Show paths or write the default configuration
    Config(commands::config::ConfigArgs),
}
