use crate::UniRepError;
use flate2::read::GzDecoder;
use memmap2::Mmap;
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{line_ending, not_line_ending, space1},
    combinator::{map_res, opt},
    sequence::preceded,
    IResult,
};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Suffixes recognised as FASTA, optionally followed by `.gz`
pub const FASTA_EXTENSIONS: [&str; 4] = ["fasta", "fa", "faa", "fas"];

/// One record of a FASTA file, residues kept exactly as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub description: Option<String>,
    pub residues: Vec<u8>,
}

impl FastaRecord {
    pub fn new(id: String, residues: Vec<u8>) -> Self {
        Self {
            id,
            description: None,
            residues,
        }
    }

    pub fn residues_str(&self) -> String {
        String::from_utf8_lossy(&self.residues).to_string()
    }
}

/// Parse a FASTA header line
fn parse_header(input: &[u8]) -> IResult<&[u8], (&str, Option<&str>)> {
    let (input, _) = tag(b">")(input)?;
    let (input, id) = map_res(
        take_till(|c: u8| c.is_ascii_whitespace()),
        std::str::from_utf8,
    )(input)?;
    let (input, description) = opt(preceded(
        space1,
        map_res(not_line_ending, std::str::from_utf8),
    ))(input)?;
    // A header on the last line may have no line ending
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, (id, description)))
}

/// Parse sequence lines until next header or EOF
fn parse_residues(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let mut residues = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() && remaining[0] != b'>' {
        let (rest, line) =
            take_till::<_, _, nom::error::Error<_>>(|c: u8| c == b'\n' || c == b'\r')(remaining)?;
        let (rest, _) = opt(line_ending)(rest)?;

        residues.extend(line.iter().copied().filter(|c| !c.is_ascii_whitespace()));

        // Stray carriage return without a newline
        remaining = match rest.first() {
            Some(b'\r') => &rest[1..],
            _ => rest,
        };
    }

    Ok((remaining, residues))
}

/// Parse a single FASTA record
fn parse_record(input: &[u8]) -> IResult<&[u8], FastaRecord> {
    let (input, (id, description)) = parse_header(input)?;
    let (input, residues) = parse_residues(input)?;

    let mut record = FastaRecord::new(id.to_string(), residues);
    record.description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok((input, record))
}

/// Parse FASTA records from a byte buffer, in file order
pub fn parse_fasta_from_bytes(data: &[u8]) -> Result<Vec<FastaRecord>, UniRepError> {
    let mut input = data;
    let mut records = Vec::new();

    loop {
        while !input.is_empty() && input[0].is_ascii_whitespace() {
            input = &input[1..];
        }

        if input.is_empty() {
            break;
        }

        if input[0] != b'>' {
            return Err(UniRepError::Parse(
                "Failed to parse FASTA: expected '>' at start of record".to_string(),
            ));
        }

        match parse_record(input) {
            Ok((remaining, record)) => {
                records.push(record);
                input = remaining;
            }
            Err(e) => {
                return Err(UniRepError::Parse(format!("Failed to parse FASTA: {:?}", e)));
            }
        }
    }

    Ok(records)
}

/// Parse a FASTA file into records (supports .gz compression)
pub fn parse_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<FastaRecord>, UniRepError> {
    let path = path.as_ref();

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        parse_fasta_gzip(path)
    } else {
        parse_fasta_uncompressed(path)
    }
}

fn parse_fasta_uncompressed(path: &Path) -> Result<Vec<FastaRecord>, UniRepError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    let mmap = unsafe { Mmap::map(&file)? };

    parse_fasta_from_bytes(&mmap[..])
}

fn parse_fasta_gzip(path: &Path) -> Result<Vec<FastaRecord>, UniRepError> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;

    parse_fasta_from_bytes(&buffer)
}

/// File name with the compression suffix removed, lowercased
fn uncompressed_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    Some(match name.strip_suffix(".gz") {
        Some(stripped) => stripped.to_string(),
        None => name,
    })
}

/// Whether the path carries one of the FASTA suffixes
pub fn is_fasta_path(path: &Path) -> bool {
    uncompressed_name(path)
        .and_then(|name| {
            name.rsplit_once('.')
                .map(|(_, ext)| FASTA_EXTENSIONS.contains(&ext))
        })
        .unwrap_or(false)
}

/// File stem used to prefix record names: `seqs.fasta` and `seqs.fasta.gz` both give `seqs`
pub fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_header() {
        let input = b">sp|P12345|PROTEIN_HUMAN Description here\nMKV";
        let (remaining, (id, desc)) = parse_header(input).unwrap();
        assert_eq!(id, "sp|P12345|PROTEIN_HUMAN");
        assert_eq!(desc, Some("Description here"));
        assert_eq!(remaining, b"MKV");
    }

    #[test]
    fn test_parse_header_at_eof() {
        let (remaining, (id, desc)) = parse_header(b">protein1").unwrap();
        assert_eq!(id, "protein1");
        assert_eq!(desc, None);
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_records_keep_order_and_case() {
        let data = b">protein1\nLAT\nch\n>protein2 second one\r\nBIO\r\n";
        let records = parse_fasta_from_bytes(data).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "protein1");
        assert_eq!(records[0].residues, b"LATch");
        assert_eq!(records[1].id, "protein2");
        assert_eq!(records[1].description.as_deref(), Some("second one"));
        assert_eq!(records[1].residues_str(), "BIO");
    }

    #[test]
    fn test_empty_record_is_kept() {
        let records = parse_fasta_from_bytes(b">empty\n>full\nMKV\n").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].residues.is_empty());
    }

    #[test]
    fn test_missing_header_is_an_error() {
        assert!(matches!(
            parse_fasta_from_bytes(b"MKV\n>p\nMKV\n"),
            Err(UniRepError::Parse(_))
        ));
    }

    #[test]
    fn test_fasta_suffixes() {
        assert!(is_fasta_path(&PathBuf::from("dir/seqs.fasta")));
        assert!(is_fasta_path(&PathBuf::from("seqs.FA")));
        assert!(is_fasta_path(&PathBuf::from("seqs.faa.gz")));
        assert!(!is_fasta_path(&PathBuf::from("seqs.txt")));
        assert!(!is_fasta_path(&PathBuf::from("fasta")));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(&PathBuf::from("/data/seqs.fasta")), "seqs");
        assert_eq!(file_stem(&PathBuf::from("seqs.fasta.gz")), "seqs");
        assert_eq!(file_stem(&PathBuf::from("my.seqs.txt")), "my.seqs");
    }
}
