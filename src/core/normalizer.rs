//! Turns heterogeneous user input into an ordered list of named sequences
//!
//! Inputs are resolved in two passes. Bare strings are validated and named as
//! they are met, while file and directory inputs are only collected; the
//! collected files are unrolled afterwards. String-derived entries therefore
//! always come first in the output, whatever their position in the input.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bio::fasta::{file_stem, is_fasta_path, parse_fasta};
use crate::bio::sequence::{content_name, sanitize_name, NamedSequence};
use crate::Result;

/// One element of the user's input list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputElement {
    /// A sequence typed directly by the user
    Raw(String),
    /// A FASTA file or a text file with one sequence per line
    File(PathBuf),
    /// A directory whose FASTA files are read (not recursively)
    Directory(PathBuf),
}

impl InputElement {
    /// Classify a command-line argument: an existing directory or file is
    /// taken as such, anything else is a raw sequence.
    pub fn classify(arg: &str) -> Self {
        let path = Path::new(arg);
        if path.is_dir() {
            InputElement::Directory(path.to_path_buf())
        } else if path.is_file() {
            InputElement::File(path.to_path_buf())
        } else {
            InputElement::Raw(arg.to_string())
        }
    }
}

impl From<&str> for InputElement {
    fn from(arg: &str) -> Self {
        InputElement::classify(arg)
    }
}

/// Kind of sequence file, decided by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Fasta,
    Text,
    Unsupported,
}

fn file_kind(path: &Path) -> FileKind {
    if is_fasta_path(path) {
        return FileKind::Fasta;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => FileKind::Text,
        _ => FileKind::Unsupported,
    }
}

#[derive(Debug, Default, Clone)]
pub struct SequenceNormalizer;

impl SequenceNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produce the canonical `(sequence, name)` list for a batch.
    ///
    /// A bare string outside the alphabet aborts with `InvalidSequence`.
    /// Sequences read from files are kept even if invalid; later stages flag them.
    pub fn normalize(&self, inputs: &[InputElement]) -> Result<Vec<NamedSequence>> {
        let mut sequences = Vec::new();
        let mut files = Vec::new();

        for input in inputs {
            match input {
                InputElement::Raw(seq) => {
                    debug!("Found a string input");
                    sequences.push(NamedSequence::from_raw(seq)?);
                }
                InputElement::File(path) => {
                    debug!("Found a file input: {}", path.display());
                    files.push(path.clone());
                }
                InputElement::Directory(dir) => {
                    debug!("Found a directory input: {}", dir.display());
                    files.extend(fasta_files_in(dir)?);
                }
            }
        }

        if !files.is_empty() {
            info!("Unrolling {} sequence files", files.len());
        }
        for path in &files {
            sequences.extend(read_sequence_file(path)?);
        }

        Ok(sequences)
    }

    /// Holdout sequences for evotuning. Absent or empty input yields `None`.
    pub fn holdouts(&self, inputs: Option<&[InputElement]>) -> Result<Option<Vec<NamedSequence>>> {
        match inputs {
            Some(inputs) => {
                let sequences = self.normalize(inputs)?;
                Ok(if sequences.is_empty() {
                    None
                } else {
                    Some(sequences)
                })
            }
            None => Ok(None),
        }
    }
}

/// FASTA files directly inside `dir`, sorted by file name
fn fasta_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_fasta_path(path))
        .collect();
    files.sort();
    Ok(files)
}

fn read_sequence_file(path: &Path) -> Result<Vec<NamedSequence>> {
    match file_kind(path) {
        FileKind::Fasta => read_fasta_file(path),
        FileKind::Text => read_text_file(path),
        FileKind::Unsupported => {
            warn!(
                "Skipping {}: not a FASTA (.fasta, .fa, .faa, .fas) or .txt file",
                path.display()
            );
            Ok(Vec::new())
        }
    }
}

/// `{stem}_{suffix}`, with characters the batch CSV would quote replaced
fn file_entry_name(stem: &str, suffix: &str) -> String {
    let name = format!("{}_{}", stem, suffix);
    let sanitized = sanitize_name(&name);
    if sanitized != name {
        warn!("Renaming {} to {}", name, sanitized);
    }
    sanitized
}

/// Records in file order, named `{stem}_{record id}`
fn read_fasta_file(path: &Path) -> Result<Vec<NamedSequence>> {
    let stem = file_stem(path);
    let records = parse_fasta(path)?;
    debug!("Read {} records from {}", records.len(), path.display());

    Ok(records
        .into_iter()
        .map(|record| NamedSequence::new(record.residues_str(), file_entry_name(&stem, &record.id)))
        .collect())
}

/// Non-empty stripped lines in file order, named `{stem}_{content hash}`
fn read_text_file(path: &Path) -> Result<Vec<NamedSequence>> {
    let stem = file_stem(path);
    let contents = fs::read_to_string(path)?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| NamedSequence::new(line, file_entry_name(&stem, &content_name(line))))
        .collect())
}
