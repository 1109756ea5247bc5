//! Cursor over decoded text using memchr for delimiter search
//!
//! Positions are byte offsets into the `&str`. All delimiters the grammar
//! searches for are ASCII, so every position handed out lands on a char
//! boundary.

use memchr::{memchr, memmem};

/// Outcome of running a production over a possibly incomplete buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan<T> {
    /// Matched, consuming this many bytes from the start of the buffer
    Match(T, usize),
    /// The buffer cannot start this production
    Mismatch,
    /// The buffer ended before the production could decide
    NeedMore,
}

impl<T> Scan<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scan<U> {
        match self {
            Scan::Match(value, len) => Scan::Match(f(value), len),
            Scan::Mismatch => Scan::Mismatch,
            Scan::NeedMore => Scan::NeedMore,
        }
    }
}

/// Scanner for XML delimiter detection
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    #[inline]
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    /// Peek at current byte without advancing
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Skip whitespace, returning how many bytes were skipped
    #[inline]
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && is_whitespace(bytes[self.pos]) {
            self.pos += 1;
        }
        self.pos - start
    }

    #[inline]
    pub fn starts_with(&self, needle: &str) -> bool {
        self.remaining().starts_with(needle)
    }

    /// True when the remaining input is a proper prefix of `needle`,
    /// i.e. more input could still complete it
    #[inline]
    pub fn is_prefix_of(&self, needle: &str) -> bool {
        let rest = self.remaining();
        rest.len() < needle.len() && needle.starts_with(rest)
    }

    /// Consume `keyword` followed by at least one whitespace character
    pub fn keyword_ws(&mut self, keyword: &str) -> Scan<()> {
        if self.is_prefix_of(keyword) {
            return Scan::NeedMore;
        }
        if !self.starts_with(keyword) {
            return Scan::Mismatch;
        }
        match self.input.as_bytes().get(self.pos + keyword.len()) {
            None => Scan::NeedMore,
            Some(&b) if is_whitespace(b) => {
                self.pos += keyword.len();
                self.skip_whitespace();
                Scan::Match((), 0)
            }
            Some(_) => Scan::Mismatch,
        }
    }

    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.remaining().as_bytes()).map(|i| self.pos + i)
    }

    /// Find the next occurrence of a delimiter string
    #[inline]
    pub fn find_str(&self, needle: &str) -> Option<usize> {
        memmem::find(self.remaining().as_bytes(), needle.as_bytes()).map(|i| self.pos + i)
    }

    /// Find `>` while skipping quoted sections
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut pos = self.pos;
        let mut quote: Option<u8> = None;

        while pos < bytes.len() {
            match (bytes[pos], quote) {
                (b'"' | b'\'', None) => quote = Some(bytes[pos]),
                (b, Some(q)) if b == q => quote = None,
                (b'>', None) => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Find the first of `[` or `>` outside quotes
    pub fn find_subset_or_end(&self) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut pos = self.pos;
        let mut quote: Option<u8> = None;

        while pos < bytes.len() {
            match (bytes[pos], quote) {
                (b'"' | b'\'', None) => quote = Some(bytes[pos]),
                (b, Some(q)) if b == q => quote = None,
                (b'[' | b'>', None) => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Read an XML name, returning None if the cursor is not at a name start
    pub fn read_name(&mut self) -> Option<&'a str> {
        let rest = self.remaining();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return None,
        }
        let end = chars
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        Some(&rest[..end])
    }

    /// Read a run of chars matching `pred`, None if empty
    pub fn read_while(&mut self, pred: impl Fn(char) -> bool) -> Option<&'a str> {
        let rest = self.remaining();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(rest.len(), |(i, _)| i);
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    /// Read a `"..."` or `'...'` literal, returning its content
    pub fn read_quoted(&mut self) -> Scan<&'a str> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            Some(_) => return Scan::Mismatch,
            None => return Scan::NeedMore,
        };
        let start = self.pos + 1;
        match memchr(quote, &self.input.as_bytes()[start..]) {
            Some(len) => {
                self.pos = start + len + 1;
                Scan::Match(&self.input[start..start + len], 0)
            }
            None => Scan::NeedMore,
        }
    }
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Name start: letters, underscore, colon
#[inline]
pub fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

/// Name char: letters, digits, and `-` `.` `_` `:`
#[inline]
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':')
}
