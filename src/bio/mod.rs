pub mod fasta;
pub mod sequence;

pub use fasta::FastaRecord;
pub use sequence::{content_name, is_valid_sequence, NamedSequence, ALPHABET};
