//! Line Source Abstraction
//!
//! Every input, plain or compressed, is consumed through [`LineSource`]:
//! a cursor over newline-delimited lines that only ever moves forward.
//! Decompression is a decorator applied when the file is opened, so the
//! merge engine never knows which kind of file it is reading.
//!
//! ## Implementations
//!
//! - `TextLineSource<R>`: any `BufRead` (files, gzip decoders, byte slices)
//! - `FileLineSource`: a file on disk, gzip/BGZF detected by magic bytes

use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Gzip member magic (also the first bytes of every BGZF block)
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Buffer over the raw file. Thousands of sources stay open at once; a
/// compressed source also holds a 32 KiB inflate window.
pub const FILE_BUFFER_SIZE: usize = 16 * 1024;

/// Buffer over decompressed bytes, in front of line splitting
pub const LINE_BUFFER_SIZE: usize = 8 * 1024;

/// Forward-only cursor over the lines of one input
pub trait LineSource {
    /// The current unread line without its terminator, or `None` once
    /// the input is exhausted.
    fn current(&self) -> Option<&[u8]>;

    /// Move to the next line
    fn advance(&mut self) -> io::Result<()>;

    /// Whether the input is exhausted
    fn at_end(&self) -> bool {
        self.current().is_none()
    }

    /// 1-based number of the current line (0 before the first line)
    fn line_number(&self) -> u64;
}

/// Line source over any buffered reader.
///
/// The first line is read on construction. `\n` terminators and one
/// trailing `\r` are stripped.
pub struct TextLineSource<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    exhausted: bool,
    line_number: u64,
}

impl<R: BufRead> TextLineSource<R> {
    pub fn new(reader: R) -> io::Result<Self> {
        let mut source = TextLineSource {
            reader,
            line: Vec::new(),
            exhausted: false,
            line_number: 0,
        };
        source.advance()?;
        Ok(source)
    }
}

impl<R: BufRead> LineSource for TextLineSource<R> {
    fn current(&self) -> Option<&[u8]> {
        if self.exhausted {
            None
        } else {
            Some(&self.line)
        }
    }

    fn advance(&mut self) -> io::Result<()> {
        if self.exhausted {
            return Ok(());
        }

        self.line.clear();
        let read = self.reader.read_until(b'\n', &mut self.line)?;
        if read == 0 {
            self.exhausted = true;
            return Ok(());
        }

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        self.line_number += 1;
        Ok(())
    }

    fn line_number(&self) -> u64 {
        self.line_number
    }
}

/// Line source over a file on disk
pub type FileLineSource = TextLineSource<Box<dyn BufRead + Send>>;

/// Open a file as a line source, decompressing transparently when it
/// starts with the gzip magic.
pub fn open_path(path: &Path) -> io::Result<FileLineSource> {
    let mut reader = BufReader::with_capacity(FILE_BUFFER_SIZE, File::open(path)?);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    // The bufread decoder reads straight from `reader`, adding no buffer of its own
    let reader: Box<dyn BufRead + Send> = if compressed {
        Box::new(BufReader::with_capacity(
            LINE_BUFFER_SIZE,
            MultiGzDecoder::new(reader),
        ))
    } else {
        Box::new(reader)
    };

    TextLineSource::new(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfWriter;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn lines<S: LineSource>(mut source: S) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(line) = source.current() {
            out.push(line.to_vec());
            source.advance().unwrap();
        }
        out
    }

    #[test]
    fn test_reads_lines_and_strips_terminators() {
        let source = TextLineSource::new(&b"a\tb\r\nc\td\n\ne"[..]).unwrap();
        assert_eq!(
            lines(source),
            vec![b"a\tb".to_vec(), b"c\td".to_vec(), b"".to_vec(), b"e".to_vec()]
        );
    }

    #[test]
    fn test_empty_input_is_exhausted_immediately() {
        let source = TextLineSource::new(&b""[..]).unwrap();
        assert!(source.at_end());
        assert_eq!(source.line_number(), 0);
    }

    #[test]
    fn test_line_numbers_and_advance_past_end() {
        let mut source = TextLineSource::new(&b"x\ny\n"[..]).unwrap();
        assert_eq!(source.line_number(), 1);
        source.advance().unwrap();
        assert_eq!(source.line_number(), 2);
        source.advance().unwrap();
        assert!(source.at_end());
        source.advance().unwrap();
        assert!(source.at_end());
    }

    #[test]
    fn test_open_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"chrom\tpos\n1\t100\n").unwrap();

        let source = open_path(file.path()).unwrap();
        assert_eq!(lines(source), vec![b"chrom\tpos".to_vec(), b"1\t100".to_vec()]);
    }

    #[test]
    fn test_open_gzip_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"chrom\tpos\n1\t100\n").unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();

        let source = open_path(file.path()).unwrap();
        assert_eq!(lines(source), vec![b"chrom\tpos".to_vec(), b"1\t100".to_vec()]);
    }

    #[test]
    fn test_gzip_line_longer_than_buffers() {
        let long_value = "x".repeat(FILE_BUFFER_SIZE + LINE_BUFFER_SIZE + 17);
        let text = format!("chrom\tpos\tref\talt\tnote\n1\t100\tA\tT\t{}\n", long_value);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();

        let read = lines(open_path(file.path()).unwrap());
        assert_eq!(read.len(), 2);
        assert!(read[1].ends_with(long_value.as_bytes()));
    }

    #[test]
    fn test_open_bgzf_file_spanning_blocks() {
        let mut body = b"chrom\tpos\n".to_vec();
        for i in 0..20_000 {
            body.extend_from_slice(format!("1\t{}\n", i).as_bytes());
        }
        let mut writer = BgzfWriter::new(Vec::new(), 6);
        writer.write(&body).unwrap();
        let (container, stats) = writer.close().unwrap();
        assert!(stats.blocks > 2);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&container).unwrap();

        let read = lines(open_path(file.path()).unwrap());
        assert_eq!(read.len(), 20_001);
        assert_eq!(read[20_000], b"1\t19999".to_vec());
    }
}
