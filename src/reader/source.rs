//! Streaming Text Source
//!
//! Reads XML from any source implementing `Read` in fixed-size chunks and
//! decodes it into a growable text buffer. Productions run against the
//! unconsumed part of that buffer; when one cannot decide, another chunk is
//! read and the production runs again.
//!
//! Encoding follows the first bytes (BOM, or the pattern of `<` next to a
//! NUL byte) and otherwise defaults to UTF-8. That default is only an
//! assumption: until the first construct is parsed the raw bytes are kept,
//! so an `encoding` named by the XML declaration re-decodes everything not
//! yet consumed.

use crate::core::encoding::{for_label, XmlEncoding};
use crate::core::scanner::Scan;
use crate::error::{Position, SourceError};
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use log::{debug, warn};
use memchr::{memchr_iter, memrchr};
use std::io::{self, Read};

/// Chunk size for reads
const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Where the current encoding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodingRef {
    /// Assumed from the first bytes; the XML declaration may still change it
    Implicit(&'static Encoding),
    /// Input was handed over as text and needs no decoding
    Explicit(&'static Encoding),
    /// Fixed by a byte order mark or a UTF-16 byte pattern
    BomDetected(&'static Encoding),
    /// Named by the XML declaration
    XmlDetected(&'static Encoding),
}

impl EncodingRef {
    fn encoding(self) -> &'static Encoding {
        match self {
            EncodingRef::Implicit(e)
            | EncodingRef::Explicit(e)
            | EncodingRef::BomDetected(e)
            | EncodingRef::XmlDetected(e) => e,
        }
    }
}

/// Decoded, incrementally filled input buffer
pub struct Source<R> {
    reader: R,
    chunk: Vec<u8>,
    text: String,
    /// Consumed prefix of `text`, dropped on the next read
    pos: usize,
    eof: bool,
    /// Bytes held back until enough have arrived to sniff the encoding
    head: Vec<u8>,
    decoder: Option<Decoder>,
    encoding: EncodingRef,
    /// Every raw byte decoded so far, kept while the encoding is implicit
    /// and the first construct has not been parsed
    raw_log: Option<Vec<u8>>,
    /// Bytes of decoded text consumed since the start
    consumed_bytes: usize,
    position: Position,
}

impl<R: Read> Source<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Create a source that reads `chunk_size` bytes at a time
    pub fn with_capacity(reader: R, chunk_size: usize) -> Self {
        Source {
            reader,
            chunk: vec![0u8; chunk_size.max(1)],
            text: String::new(),
            pos: 0,
            eof: false,
            head: Vec::new(),
            decoder: None,
            encoding: EncodingRef::Implicit(UTF_8),
            raw_log: None,
            consumed_bytes: 0,
            position: Position::start(),
        }
    }

    /// Append more decoded input, returning whether any was obtained
    pub fn read(&mut self) -> Result<bool, SourceError> {
        if self.eof {
            return Ok(false);
        }

        // Compact: drop consumed text
        if self.pos > 0 {
            self.text.drain(..self.pos);
            self.pos = 0;
        }

        let before = self.text.len();
        let mut chunk = std::mem::take(&mut self.chunk);
        let result = loop {
            let read = match self.reader.read(&mut chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(SourceError::from(e)),
            };
            if read == 0 {
                self.eof = true;
                self.feed(&[], true);
                break Ok(());
            }
            self.feed(&chunk[..read], false);
            // A chunk may end inside a character or the sniffed head
            if self.text.len() > before {
                break Ok(());
            }
        };
        self.chunk = chunk;
        result?;
        Ok(self.text.len() > before)
    }

    /// Run `production` over the buffer, reading more while it needs more
    ///
    /// The production is told whether the input is exhausted. `None` means
    /// it did not match, including when the input ended before it could
    /// decide. The matched length is consumed when `consume` is set.
    ///
    /// Each retry at least doubles the buffer, so a construct spanning many
    /// chunks is rescanned a logarithmic number of times.
    pub fn scan<T>(
        &mut self,
        mut production: impl FnMut(&str, bool) -> Scan<T>,
        consume: bool,
    ) -> Result<Option<T>, SourceError> {
        loop {
            match production(self.buffer(), self.eof) {
                Scan::Match(value, len) => {
                    if consume {
                        self.consume(len);
                    }
                    return Ok(Some(value));
                }
                Scan::Mismatch => return Ok(None),
                Scan::NeedMore if self.eof => return Ok(None),
                Scan::NeedMore => {
                    let target = self.buffer().len().saturating_mul(2);
                    self.fill_to(target)?;
                }
            }
        }
    }

    /// Read at least once, then until the buffer holds `target` bytes or
    /// the input ends
    fn fill_to(&mut self, target: usize) -> Result<(), SourceError> {
        while self.read()? {
            if self.buffer().len() >= target {
                break;
            }
        }
        Ok(())
    }

    /// Read until the buffer holds something other than whitespace
    pub fn fill_nonblank(&mut self) -> Result<bool, SourceError> {
        // Compaction keeps the unconsumed text, so offsets into the buffer
        // stay valid across reads
        let mut checked = 0;
        loop {
            let rest = &self.buffer().as_bytes()[checked..];
            if rest.iter().any(|&b| !crate::core::scanner::is_whitespace(b)) {
                return Ok(true);
            }
            checked = self.buffer().len();
            if !self.read()? {
                return Ok(false);
            }
        }
    }

    /// Switch to the encoding named by `label`
    ///
    /// While the raw bytes are still kept, the unconsumed input is decoded
    /// again; afterwards only bytes not yet read are affected. A detected
    /// or previously declared encoding is not overridden.
    pub fn set_encoding(&mut self, label: &str) -> Result<(), SourceError> {
        let encoding = for_label(label).ok_or_else(|| SourceError::UnknownEncoding(label.to_string()))?;

        match self.encoding {
            EncodingRef::Implicit(current) => {
                if !encoding.is_ascii_compatible() {
                    warn!(
                        "Ignoring declared encoding '{}': the declaration was read as {}",
                        label,
                        current.name()
                    );
                    return Ok(());
                }
                self.encoding = EncodingRef::XmlDetected(encoding);
                if encoding == current {
                    return Ok(());
                }
                debug!("Switching input encoding from {} to {}", current.name(), encoding.name());
                match self.raw_log.take() {
                    Some(raw) => self.redecode(encoding, &raw),
                    None => self.decoder = Some(encoding.new_decoder_without_bom_handling()),
                }
            }
            EncodingRef::Explicit(_) => {
                debug!("Ignoring declared encoding '{}' for text input", label);
            }
            EncodingRef::BomDetected(current) | EncodingRef::XmlDetected(current) => {
                if encoding != current {
                    warn!(
                        "Ignoring declared encoding '{}', input is already decoded as {}",
                        label,
                        current.name()
                    );
                }
            }
        }
        Ok(())
    }

    /// Encoding used for bytes read from now on
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding.encoding()
    }

    /// End of the window in which the declared encoding re-decodes input
    pub(crate) fn lock_encoding(&mut self) {
        self.raw_log = None;
    }

    fn redecode(&mut self, encoding: &'static Encoding, raw: &[u8]) {
        let start = self.consumed_bytes.min(raw.len());
        self.text.clear();
        self.pos = 0;
        self.decoder = Some(encoding.new_decoder_without_bom_handling());
        self.decode(&raw[start..], self.eof);
    }

    fn feed(&mut self, bytes: &[u8], last: bool) {
        if self.decoder.is_some() {
            self.decode(bytes, last);
            return;
        }
        self.head.extend_from_slice(bytes);
        if self.head.len() < XmlEncoding::SNIFF_LEN && !last {
            return;
        }

        let head = std::mem::take(&mut self.head);
        let detected = XmlEncoding::detect(&head);
        let encoding = detected.encoding();
        if detected.is_authoritative() {
            self.encoding = EncodingRef::BomDetected(encoding);
        } else {
            self.encoding = EncodingRef::Implicit(encoding);
            self.raw_log = Some(Vec::new());
        }
        debug!("Input encoding detected as {}", encoding.name());
        self.decoder = Some(encoding.new_decoder_without_bom_handling());
        self.decode(&head[detected.bom_len(&head)..], last);
    }

    fn decode(&mut self, mut bytes: &[u8], last: bool) {
        if let Some(raw) = self.raw_log.as_mut() {
            raw.extend_from_slice(bytes);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        loop {
            let needed = decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 3 + 4);
            self.text.reserve(needed);
            let (result, read, _) = decoder.decode_to_string(bytes, &mut self.text, last);
            bytes = &bytes[read..];
            if matches!(result, CoderResult::InputEmpty) {
                break;
            }
        }
    }
}

impl Source<io::Empty> {
    /// Source over text that is already decoded
    pub fn from_text(text: &str) -> Self {
        let mut source = Source::with_capacity(io::empty(), 1);
        source.text = text.to_string();
        source.eof = true;
        source.encoding = EncodingRef::Explicit(UTF_8);
        source
    }
}

impl<R> Source<R> {
    /// Unconsumed decoded text
    #[inline]
    pub fn buffer(&self) -> &str {
        &self.text[self.pos..]
    }

    /// Consume `n` bytes of the buffer
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.text.len() - self.pos);
        let consumed = &self.text[self.pos..self.pos + n];

        let chars = consumed.chars().count();
        let newlines = memchr_iter(b'\n', consumed.as_bytes()).count();
        self.position.offset += chars;
        match memrchr(b'\n', consumed.as_bytes()) {
            Some(last) => {
                self.position.line += newlines;
                self.position.column = consumed[last + 1..].chars().count() + 1;
            }
            None => self.position.column += chars,
        }

        self.pos += n;
        self.consumed_bytes += n;
    }

    /// No more input can be obtained and the buffer is drained
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.eof && self.pos >= self.text.len()
    }

    /// Location of the next unconsumed character
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }
}
