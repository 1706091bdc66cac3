use clap::Args;
use std::io::Write;

use super::classify_all;
use crate::core::normalizer::SequenceNormalizer;

#[derive(Args, Debug)]
pub struct InputsArgs {
    /// Sequences, FASTA or .txt files, or directories of FASTA files
    #[arg(value_name = "INPUT", num_args = 0..)]
    pub inputs: Vec<String>,
}

/// Print the normalized batch exactly as the runtime would receive it
pub fn run(args: InputsArgs) -> anyhow::Result<()> {
    let sequences = SequenceNormalizer::new().normalize(&classify_all(&args.inputs))?;

    let stdout = std::io::stdout();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(stdout.lock());
    for entry in &sequences {
        writer.write_record([entry.sequence.as_str(), entry.name.as_str()])?;
    }
    writer.flush()?;
    drop(writer);

    let invalid = sequences.iter().filter(|s| !s.is_valid()).count();
    if invalid > 0 {
        let mut stderr = std::io::stderr();
        writeln!(
            stderr,
            "{} of {} sequences have residues outside the alphabet",
            invalid,
            sequences.len()
        )?;
    }
    Ok(())
}
