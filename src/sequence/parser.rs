use crate::api::{ApiResult, SkewError};
use niffler::get_reader;
use std::io::{self, BufRead, BufReader, Cursor, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extracts the sequence from a FASTA-like stream, plain or gzip-compressed.
#[derive(Debug, Clone, Copy)]
pub struct SequenceParser {
    max_lines: usize,
}

impl SequenceParser {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Concatenates trimmed non-header lines until `max_lines` lines have
    /// contributed. Blank lines contribute nothing and are not counted.
    pub fn parse<R: Read + Send>(&self, mut stream: R) -> ApiResult<String> {
        let (magic, filled) = peek_magic(&mut stream)
            .map_err(|e| SkewError::DecodeError(format!("Failed to read stream: {}", e)))?;
        let rejoined = Cursor::new(magic[..filled].to_vec()).chain(stream);

        let reader: Box<dyn Read + '_> = if magic[..filled] == GZIP_MAGIC {
            let (inner, _format) = get_reader(Box::new(rejoined))
                .map_err(|e| SkewError::DecodeError(format!("Failed to decompress: {}", e)))?;
            inner
        } else {
            Box::new(rejoined)
        };

        let mut sequence = String::new();
        let mut contributing = 0;
        let mut lines = BufReader::with_capacity(1024 * 1024, reader).lines();

        while contributing < self.max_lines {
            let line = match lines.next() {
                Some(line) => line.map_err(|e| SkewError::DecodeError(e.to_string()))?,
                None => break,
            };
            if line.is_empty() || line.starts_with('>') {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            sequence.push_str(trimmed);
            contributing += 1;
        }

        if contributing == 0 {
            return Err(SkewError::DecodeError("no sequence data".to_string()));
        }
        Ok(sequence)
    }
}

// A short first read must not hide the magic number, so keep reading until
// two bytes are in hand or the stream ends.
fn peek_magic<R: Read>(stream: &mut R) -> io::Result<([u8; 2], usize)> {
    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        match stream.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok((magic, filled))
}
