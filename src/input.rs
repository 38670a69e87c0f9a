use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    len: Option<u64>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let is_pipe = is_pipe(&input_path);

        let (reader, len): (Box<dyn Read + Send>, _) = if is_pipe {
            (Box::new(BufReader::new(io::stdin())), None)
        } else {
            let file = File::open(input_path)?;
            let len = file.metadata().ok().map(|m| m.len());
            (Box::new(BufReader::new(file)), len)
        };

        Ok(Self { reader, len })
    }

    /// Reader over bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = Some(data.len() as u64);
        Self {
            reader: Box::new(io::Cursor::new(data)),
            len,
        }
    }

    /// Fill `buffer` as far as the input allows. Short only at EOF.
    pub fn read_full(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Discard `count` bytes.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        Ok(io::copy(&mut self.reader.by_ref().take(count), &mut io::sink())?)
    }

    /// Total input size when reading from a file.
    pub fn size(&self) -> Option<u64> {
        self.len
    }

    /// Read all remaining data for non-streaming use cases
    /// Note: This should only be used for small files or when you need all data at once
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

pub fn is_pipe<P: AsRef<Path>>(input_path: P) -> bool {
    input_path.as_ref().to_string_lossy() == "-"
}

#[test]
fn read_full_spans_short_reads() -> Result<()> {
    let mut reader = InputReader::from_bytes((0u8..10).collect());
    reader.skip(3)?;

    let mut buffer = [0u8; 4];
    assert_eq!(reader.read_full(&mut buffer)?, 4);
    assert_eq!(buffer, [3, 4, 5, 6]);
    assert_eq!(reader.read_full(&mut buffer)?, 3);
    assert_eq!(reader.read_full(&mut buffer)?, 0);
    Ok(())
}
