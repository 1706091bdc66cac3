use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, UniRepError};

/// Residues accepted by the model: the 20 standard amino acids, the extended
/// and ambiguous codes, the terminator and the gap symbol.
/// See <https://en.wikipedia.org/wiki/FASTA_format#Sequence_representation>
pub const ALPHABET: [u8; 28] = [
    b'A', b'B', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'J', b'K', b'L', b'M', b'N', b'O',
    b'P', b'Q', b'R', b'S', b'T', b'U', b'V', b'W', b'X', b'Y', b'Z', b'*', b'-',
];

/// Length of the truncated hex digest used as a name for unnamed sequences
pub const CONTENT_NAME_LEN: usize = 10;

/// Check every residue against the alphabet, ignoring case
pub fn is_valid_sequence(sequence: &str) -> bool {
    sequence
        .bytes()
        .all(|c| ALPHABET.contains(&c.to_ascii_uppercase()))
}

/// Characters that would make the batch CSV quote a name. The runtime
/// splits rows on commas and does not unquote.
const NAME_RESERVED: [char; 2] = [',', '"'];

/// Replace characters the runtime cannot read back in a name with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if NAME_RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

/// First ten hex characters of the SHA-256 of the text, exactly as given
pub fn content_name(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut name = hex::encode(digest);
    name.truncate(CONTENT_NAME_LEN);
    name
}

/// A sequence paired with the name its outputs are stored under.
///
/// Names double as output directory names. Two entries sharing a name in one
/// batch write to the same directory and the later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedSequence {
    pub sequence: String,
    pub name: String,
}

impl NamedSequence {
    pub fn new(sequence: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            name: name.into(),
        }
    }

    /// Build an entry from a bare string given by the user.
    ///
    /// Bare strings are checked eagerly: an alphabet violation is fatal here,
    /// unlike sequences read from files which are only flagged.
    pub fn from_raw(sequence: &str) -> Result<Self> {
        if !is_valid_sequence(sequence) {
            return Err(UniRepError::InvalidSequence(sequence.to_string()));
        }
        Ok(Self::new(sequence, content_name(sequence)))
    }

    pub fn is_valid(&self) -> bool {
        is_valid_sequence(&self.sequence)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}
